//! Per-request state carried through the pipeline.
//!
//! # Responsibilities
//! - Assign a request ID (propagated from `x-request-id` or UUID v4)
//! - Capture method, path and declared content length at pipeline entry
//! - Hold the deadline handle armed by the timeout stage
//! - Hold the completion flag shared with the timeout supervisor

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Extensions, HeaderMap, HeaderName, HeaderValue, Method, Request, Version};
use tokio::time::Instant;
use uuid::Uuid;

/// Header used to propagate the request ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 128;

/// Request ID made available to downstream handlers via request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Set once when a response is committed for the request.
///
/// Exactly one of the handler and the timeout supervisor wins the flag.
#[derive(Debug, Clone, Default)]
pub struct CompletionFlag(Arc<AtomicBool>);

impl CompletionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition false → true. Returns `true` only for the caller that
    /// performed the transition.
    pub fn try_complete(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_complete(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Per-request deadline used by the timeout supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineHandle {
    timeout: Duration,
    deadline: Instant,
}

impl DeadlineHandle {
    pub fn arm(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// State for one request, owned by the pipeline invocation handling it.
#[derive(Debug)]
pub struct RequestContext {
    pub id: String,
    pub method: Method,
    pub path: String,
    pub version: Version,
    pub content_length: Option<u64>,
    /// Request headers as received, before any stage touched them.
    pub headers: HeaderMap,
    pub started: Instant,
    pub deadline: Option<DeadlineHandle>,
    pub completion: CompletionFlag,
    /// Stage-private state written during the request phase.
    pub extensions: Extensions,
}

impl RequestContext {
    pub fn from_request(request: &Request<Body>) -> Self {
        let headers = request.headers();
        let content_length = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());

        Self {
            id: request_id(headers),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            version: request.version(),
            content_length,
            headers: headers.clone(),
            started: Instant::now(),
            deadline: None,
            completion: CompletionFlag::new(),
            extensions: Extensions::new(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
