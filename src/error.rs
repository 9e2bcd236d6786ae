//! Request failure taxonomy and classification.
//!
//! Every failure raised inside the pipeline (by a stage, by the timeout
//! supervisor or by a downstream handler) ends up here and is turned into an
//! [`ErrorRecord`], which renders the JSON error envelope.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http_body_util::LengthLimitError;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::GatewayConfig;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Enumerated error kinds, serialized as the `code` field of the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    PayloadTooLarge,
    RequestTimeout,
    ConnectionError,
    NotFound,
    BadRequest,
    InternalError,
    UncaughtFatal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::ConnectionError => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::InternalError | ErrorKind::UncaughtFatal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::PayloadTooLarge => "payload-too-large",
            ErrorKind::RequestTimeout => "request-timeout",
            ErrorKind::ConnectionError => "connection-error",
            ErrorKind::NotFound => "not-found",
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::InternalError => "internal-error",
            ErrorKind::UncaughtFatal => "uncaught-fatal",
        }
    }

    fn message(self) -> &'static str {
        match self {
            ErrorKind::PayloadTooLarge => "Request payload too large",
            ErrorKind::RequestTimeout => "Request timeout",
            ErrorKind::ConnectionError => "Connection error",
            ErrorKind::NotFound => "API endpoint not found",
            ErrorKind::BadRequest => "Malformed request body",
            ErrorKind::InternalError | ErrorKind::UncaughtFatal => "Internal server error",
        }
    }
}

/// A failure raised while handling a request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request body exceeds the {limit} limit")]
    PayloadTooLarge { limit: String },

    #[error("{method} {path} exceeded the {timeout_ms} ms deadline")]
    RequestTimeout {
        timeout_ms: u64,
        method: String,
        path: String,
    },

    #[error("connection error: {0}")]
    Connection(#[source] io::Error),

    #[error("no route for {method} {path}")]
    NotFound { method: String, path: String },

    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("uncaught failure: {0}")]
    Uncaught(String),
}

impl GatewayError {
    pub fn internal(message: impl Into<String>) -> Self {
        GatewayError::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn from_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        GatewayError::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            GatewayError::RequestTimeout { .. } => ErrorKind::RequestTimeout,
            GatewayError::Connection(_) => ErrorKind::ConnectionError,
            GatewayError::NotFound { .. } => ErrorKind::NotFound,
            GatewayError::MalformedBody(_) => ErrorKind::BadRequest,
            GatewayError::Internal { .. } => ErrorKind::InternalError,
            GatewayError::Uncaught(_) => ErrorKind::UncaughtFatal,
        }
    }
}

/// A `GatewayError` waiting in response extensions to be rendered by the
/// pipeline boundary.
#[derive(Debug, Clone)]
pub struct PendingError(pub Arc<GatewayError>);

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = self.kind().status().into_response();
        response
            .extensions_mut()
            .insert(PendingError(Arc::new(self)));
        response
    }
}

/// The structured form of a failure, consumed once to render a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub status: StatusCode,
    pub message: String,
    /// Internal detail, present only outside production.
    pub detail: Option<String>,
    /// Status-specific envelope fields such as `limit` or `timeout`.
    pub fields: Map<String, Value>,
}

impl ErrorRecord {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            status: kind.status(),
            message: kind.message().to_string(),
            detail: None,
            fields: Map::new(),
        }
    }

    fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// The JSON envelope: `{ success: false, code, message, ...fields }`.
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(false));
        body.insert("code".into(), json!(self.kind));
        body.insert("message".into(), Value::String(self.message.clone()));
        for (key, value) in &self.fields {
            body.insert(key.clone(), value.clone());
        }
        if let Some(detail) = &self.detail {
            body.insert("error".into(), Value::String(detail.clone()));
        }
        Value::Object(body)
    }
}

impl IntoResponse for ErrorRecord {
    fn into_response(self) -> Response {
        (self.status, Json(self.body())).into_response()
    }
}

/// Maps failures to error records.
///
/// Rules, first match wins: an oversized-body indicator anywhere in the
/// error chain is `payload-too-large`; a peer reset or broken pipe is
/// `connection-error`; anything else is `internal-error`.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    production: bool,
    json_limit: String,
}

impl ErrorClassifier {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            production: config.is_production(),
            json_limit: config.limits.json.to_string(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.production
    }

    pub fn classify(&self, error: &GatewayError) -> ErrorRecord {
        let record = ErrorRecord::new(error.kind());
        match error {
            GatewayError::PayloadTooLarge { limit } => record.field("limit", limit.as_str()),
            GatewayError::RequestTimeout {
                timeout_ms,
                method,
                path,
            } => record
                .field("timeout", *timeout_ms)
                .field("path", path.as_str())
                .field("method", method.as_str()),
            GatewayError::NotFound { method, path } => record
                .field("path", path.as_str())
                .field("method", method.as_str()),
            GatewayError::Internal { .. } => match self.match_chain(error) {
                Some(record) => record,
                None => self.with_detail(record, error),
            },
            GatewayError::Connection(_)
            | GatewayError::MalformedBody(_)
            | GatewayError::Uncaught(_) => self.with_detail(record, error),
        }
    }

    /// Classify a failure of unknown type by walking its source chain.
    pub fn classify_any(&self, error: &(dyn StdError + 'static)) -> ErrorRecord {
        if let Some(gateway) = chain(error).find_map(|e| e.downcast_ref::<GatewayError>()) {
            return self.classify(gateway);
        }
        match self.match_chain(error) {
            Some(record) => record,
            None => self.with_detail(ErrorRecord::new(ErrorKind::InternalError), error),
        }
    }

    fn match_chain(&self, error: &(dyn StdError + 'static)) -> Option<ErrorRecord> {
        let skip_self = error.is::<GatewayError>();
        let mut causes = chain(error).skip(usize::from(skip_self));

        if causes.clone().any(|e| e.is::<LengthLimitError>()) {
            return Some(
                ErrorRecord::new(ErrorKind::PayloadTooLarge).field("limit", self.json_limit.as_str()),
            );
        }
        if let Some(io_error) = causes.find_map(|e| e.downcast_ref::<io::Error>()) {
            if is_connection_error(io_error) {
                return Some(self.with_detail(ErrorRecord::new(ErrorKind::ConnectionError), error));
            }
        }
        None
    }

    fn with_detail(&self, mut record: ErrorRecord, error: &(dyn StdError + 'static)) -> ErrorRecord {
        if !self.production {
            record.detail = Some(describe(error));
        }
        record
    }
}

/// Peer-reset style I/O failures.
pub fn is_connection_error(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
    )
}

fn chain<'a>(
    error: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> + Clone {
    std::iter::successors(Some(error), |e| (*e).source())
}

fn describe(error: &(dyn StdError + 'static)) -> String {
    chain(error)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}
