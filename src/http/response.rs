//! Success envelope helpers.
//!
//! Every JSON response carries at least `{ success, message? }`. Error
//! envelopes are produced by [`crate::error::ErrorRecord`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Map, Value};

/// Builder for a `{ success: true, message, ... }` body.
#[derive(Debug, Clone)]
pub struct Envelope {
    status: StatusCode,
    body: Map<String, Value>,
}

impl Envelope {
    pub fn ok(message: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(true));
        body.insert("message".into(), Value::String(message.into()));
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.insert(key.to_string(), value.into());
        self
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status, Json(Value::Object(self.body))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_has_success_and_message() {
        let value = Envelope::ok("saved").field("id", 7).into_value();
        assert_eq!(value["success"], true);
        assert_eq!(value["message"], "saved");
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn envelope_status_is_applied() {
        let response = Envelope::ok("created")
            .status(StatusCode::CREATED)
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
