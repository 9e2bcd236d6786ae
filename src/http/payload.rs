//! Decoded request bodies.
//!
//! Structured bodies are decoded into a [`Payload`] tree in which every
//! string that looks like an ISO-8601 date-time (`YYYY-MM-DDThh:mm:ss...`)
//! and parses as one has been revived into a native timestamp.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Number, Value};

const TIMESTAMP_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}";

fn timestamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(TIMESTAMP_PATTERN).expect("timestamp pattern is valid"))
}

/// A structured request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<Payload>),
    Object(BTreeMap<String, Payload>),
}

impl Payload {
    pub fn get(&self, key: &str) -> Option<&Payload> {
        match self {
            Payload::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Payload::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert back to plain JSON; timestamps become RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        match self {
            Payload::Null => Value::Null,
            Payload::Bool(b) => Value::Bool(*b),
            Payload::Number(n) => Value::Number(n.clone()),
            Payload::String(s) => Value::String(s.clone()),
            Payload::Timestamp(ts) => Value::String(format_timestamp(ts)),
            Payload::Array(items) => Value::Array(items.iter().map(Payload::to_json).collect()),
            Payload::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Decode a JSON value, reviving timestamp strings at any depth.
pub fn revive(value: Value) -> Payload {
    match value {
        Value::Null => Payload::Null,
        Value::Bool(b) => Payload::Bool(b),
        Value::Number(n) => Payload::Number(n),
        Value::String(s) => revive_string(s),
        Value::Array(items) => Payload::Array(items.into_iter().map(revive).collect()),
        Value::Object(map) => {
            Payload::Object(map.into_iter().map(|(k, v)| (k, revive(v))).collect())
        }
    }
}

/// Revive a single string; non-matching or unparseable strings are kept.
pub fn revive_string(s: String) -> Payload {
    if !timestamp_pattern().is_match(&s) {
        return Payload::String(s);
    }
    match parse_timestamp(&s) {
        Some(ts) => Payload::Timestamp(ts),
        None => Payload::String(s),
    }
}

/// Zone-less date-times are read as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Decode an `application/x-www-form-urlencoded` body.
///
/// Values are strings (with timestamp revival); repeated keys collect into
/// an array in order of appearance.
pub fn decode_form(bytes: &[u8]) -> Payload {
    let mut fields: BTreeMap<String, Payload> = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(bytes) {
        let value = revive_string(value.into_owned());
        match fields.remove(key.as_ref()) {
            None => {
                fields.insert(key.into_owned(), value);
            }
            Some(Payload::Array(mut items)) => {
                items.push(value);
                fields.insert(key.into_owned(), Payload::Array(items));
            }
            Some(previous) => {
                fields.insert(key.into_owned(), Payload::Array(vec![previous, value]));
            }
        }
    }
    Payload::Object(fields)
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Payload::Null => serializer.serialize_unit(),
            Payload::Bool(b) => serializer.serialize_bool(*b),
            Payload::Number(n) => n.serialize(serializer),
            Payload::String(s) => serializer.serialize_str(s),
            Payload::Timestamp(ts) => serializer.serialize_str(&format_timestamp(ts)),
            Payload::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Payload::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

/// How a request body was decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
}

/// A decoded body, placed in request extensions by the body decoding stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody {
    pub kind: BodyKind,
    pub payload: Payload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn revives_nested_timestamps() {
        let payload = revive(json!({
            "createdAt": "2024-01-01T00:00:00Z",
            "meta": { "items": [ { "at": "2024-03-05T10:20:30.500+02:00" } ] },
            "name": "plain"
        }));

        assert_eq!(
            payload.get("createdAt").and_then(Payload::as_timestamp),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );

        let Some(Payload::Array(items)) = payload.get("meta").and_then(|m| m.get("items")) else {
            panic!("items should be an array");
        };
        let at = items[0].get("at").and_then(Payload::as_timestamp).unwrap();
        assert_eq!(at.to_rfc3339(), "2024-03-05T08:20:30.500+00:00");

        assert_eq!(payload.get("name").and_then(Payload::as_str), Some("plain"));
    }

    #[test]
    fn zoneless_timestamps_are_utc() {
        let payload = revive_string("2024-06-01T12:00:00".to_string());
        assert_eq!(
            payload.as_timestamp(),
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn impossible_dates_stay_strings() {
        let payload = revive_string("2024-13-45T99:00:00Z".to_string());
        assert_eq!(payload, Payload::String("2024-13-45T99:00:00Z".into()));

        let payload = revive_string("version 2024-01-01T00:00:00Z".to_string());
        assert!(payload.as_str().is_some());
    }

    #[test]
    fn serializes_timestamps_as_rfc3339() {
        let payload = revive(json!({ "at": "2024-01-01T00:00:00Z", "n": 3 }));
        let out = serde_json::to_value(&payload).unwrap();
        assert_eq!(out, json!({ "at": "2024-01-01T00:00:00.000Z", "n": 3 }));
        assert_eq!(payload.to_json(), out);
    }

    #[test]
    fn decodes_form_bodies() {
        let payload = decode_form(b"name=gateway&tag=a&tag=b&since=2024-01-01T00%3A00%3A00Z");
        assert_eq!(payload.get("name").and_then(Payload::as_str), Some("gateway"));
        assert_eq!(
            payload.get("tag"),
            Some(&Payload::Array(vec![
                Payload::String("a".into()),
                Payload::String("b".into())
            ]))
        );
        assert!(payload.get("since").and_then(Payload::as_timestamp).is_some());
    }
}
