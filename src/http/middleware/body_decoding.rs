//! Request body decoding.
//!
//! # Responsibilities
//! - Enforce the JSON and form size limits before any handler runs
//! - Decode JSON bodies, reviving ISO-8601 strings into timestamps
//! - Decode urlencoded bodies with extended (repeated key) semantics
//! - Classify truncated reads as connection errors
//!
//! The decoded [`ParsedBody`] is placed in request extensions together with
//! the [`BodyLimit`] that was enforced. The raw bytes are re-attached as the
//! request body so handlers may read either.

use std::io;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::header;
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::config::{ByteSize, LimitsConfig};
use crate::error::{BoxError, GatewayError};
use crate::http::payload::{decode_form, revive, BodyKind, ParsedBody};
use crate::http::pipeline::{Stage, StageOutcome};
use crate::http::request::RequestContext;

/// The size limit enforced on a decoded request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyLimit(pub ByteSize);

/// Body decoding stage.
#[derive(Debug, Clone)]
pub struct BodyDecoding {
    json_limit: ByteSize,
    url_limit: ByteSize,
}

impl BodyDecoding {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            json_limit: limits.json.clone(),
            url_limit: limits.url.clone(),
        }
    }

    fn limit_for(&self, kind: BodyKind) -> &ByteSize {
        match kind {
            BodyKind::Json => &self.json_limit,
            BodyKind::Form => &self.url_limit,
        }
    }
}

/// Which decoder applies to a `Content-Type`, if any.
pub fn body_kind(content_type: &str) -> Option<BodyKind> {
    let base = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if base == "application/json" || base.ends_with("+json") {
        Some(BodyKind::Json)
    } else if base == "application/x-www-form-urlencoded" {
        Some(BodyKind::Form)
    } else {
        None
    }
}

fn decode(kind: BodyKind, bytes: &Bytes) -> Result<Option<ParsedBody>, GatewayError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let payload = match kind {
        BodyKind::Json => {
            let value: serde_json::Value = serde_json::from_slice(bytes)
                .map_err(|e| GatewayError::MalformedBody(e.to_string()))?;
            revive(value)
        }
        BodyKind::Form => decode_form(bytes),
    };
    Ok(Some(ParsedBody { kind, payload }))
}

/// Map a body read failure onto the gateway taxonomy.
pub(crate) fn read_error(error: BoxError, limit: &ByteSize) -> GatewayError {
    if error.downcast_ref::<LengthLimitError>().is_some() {
        return GatewayError::PayloadTooLarge {
            limit: limit.to_string(),
        };
    }

    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error.as_ref());
    while let Some(current) = source {
        if let Some(io_error) = current.downcast_ref::<io::Error>() {
            return GatewayError::Connection(io::Error::new(io_error.kind(), io_error.to_string()));
        }
        source = current.source();
    }

    GatewayError::from_source("failed to read request body", error)
}

#[async_trait]
impl Stage for BodyDecoding {
    fn name(&self) -> &'static str {
        "body-decoding"
    }

    async fn on_request(&self, ctx: &mut RequestContext, request: Request<Body>) -> StageOutcome {
        let kind = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(body_kind);
        let Some(kind) = kind else {
            return StageOutcome::Continue(request);
        };

        let limit = self.limit_for(kind);
        if ctx.content_length.is_some_and(|len| len > limit.as_u64()) {
            return StageOutcome::Fail(GatewayError::PayloadTooLarge {
                limit: limit.to_string(),
            });
        }

        let (mut parts, body) = request.into_parts();
        let bytes = match Limited::new(body, limit.as_usize()).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(error) => return StageOutcome::Fail(read_error(error, limit)),
        };

        match decode(kind, &bytes) {
            Ok(Some(parsed)) => {
                tracing::trace!(request_id = %ctx.id, bytes = bytes.len(), ?kind, "Decoded request body");
                parts.extensions.insert(parsed);
            }
            Ok(None) => {}
            Err(error) => return StageOutcome::Fail(error),
        }
        parts.extensions.insert(BodyLimit(limit.clone()));

        StageOutcome::Continue(Request::from_parts(parts, Body::from(bytes)))
    }
}
