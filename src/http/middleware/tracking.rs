//! Request accounting.
//!
//! # Responsibilities
//! - Count every response exactly once, whatever produced it
//! - Echo the request ID on the response
//! - Flag large payloads (declared length over 1 MiB)
//! - Flag slow requests (over one second from pipeline entry until the
//!   response body has been fully produced)

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes, HttpBody};
use axum::extract::Request;
use axum::http::{HeaderValue, Method};
use axum::response::Response;
use hyper::body::{Frame, SizeHint};
use tokio::time::Instant;

use crate::http::pipeline::{Stage, StageOutcome};
use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::observability::MetricsRegistry;

const LARGE_PAYLOAD_BYTES: u64 = 1024 * 1024;
const SLOW_REQUEST: Duration = Duration::from_millis(1000);

/// Whether a declared content length counts as a large payload.
pub fn is_large_payload(content_length: Option<u64>) -> bool {
    content_length.is_some_and(|len| len > LARGE_PAYLOAD_BYTES)
}

pub fn is_slow(elapsed: Duration) -> bool {
    elapsed > SLOW_REQUEST
}

#[derive(Debug, Clone)]
pub struct RequestTracking {
    metrics: MetricsRegistry,
}

impl RequestTracking {
    pub fn new(metrics: MetricsRegistry) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl Stage for RequestTracking {
    fn name(&self) -> &'static str {
        "request-tracking"
    }

    async fn on_request(&self, ctx: &mut RequestContext, request: Request<Body>) -> StageOutcome {
        if is_large_payload(ctx.content_length) {
            self.metrics.record_large_payload();
            tracing::info!(
                request_id = %ctx.id,
                method = %ctx.method,
                path = %ctx.path,
                size_mb = format!("{:.2}", ctx.content_length.unwrap_or_default() as f64 / LARGE_PAYLOAD_BYTES as f64),
                "Large payload request"
            );
        }
        StageOutcome::Continue(request)
    }

    async fn on_response(&self, ctx: &RequestContext, mut response: Response) -> Response {
        let elapsed = ctx.elapsed();
        let status = response.status();
        let total = self.metrics.record_request(&ctx.method, status, elapsed);

        response.extensions_mut().insert(SlowRequestCheck {
            metrics: self.metrics.clone(),
            request_id: ctx.id.clone(),
            method: ctx.method.clone(),
            path: ctx.path.clone(),
            started: ctx.started,
        });

        tracing::debug!(
            request_id = %ctx.id,
            method = %ctx.method,
            path = %ctx.path,
            status = status.as_u16(),
            duration_ms = elapsed.as_millis() as u64,
            total,
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&ctx.id) {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }
        response
    }
}

/// Deferred slow-request check, run when the response body ends.
#[derive(Clone)]
struct SlowRequestCheck {
    metrics: MetricsRegistry,
    request_id: String,
    method: Method,
    path: String,
    started: Instant,
}

impl SlowRequestCheck {
    fn run(self) {
        let elapsed = self.started.elapsed();
        if !is_slow(elapsed) {
            return;
        }
        self.metrics.record_slow_request();
        tracing::warn!(
            request_id = %self.request_id,
            method = %self.method,
            path = %self.path,
            duration_ms = elapsed.as_millis() as u64,
            "Slow request"
        );
    }
}

/// Arm the slow-request check left by [`RequestTracking`] on the final
/// response body. Runs after every stage has shaped the response.
pub(crate) fn time_body(mut response: Response) -> Response {
    let check = response.extensions_mut().remove::<SlowRequestCheck>();
    match check {
        Some(check) => response.map(|inner| {
            Body::new(TimedBody {
                inner,
                check: Some(check),
            })
        }),
        None => response,
    }
}

/// Response body that runs its check at end of stream, or when dropped
/// early by a closed connection.
struct TimedBody {
    inner: Body,
    check: Option<SlowRequestCheck>,
}

impl TimedBody {
    fn finish(&mut self) {
        if let Some(check) = self.check.take() {
            check.run();
        }
    }
}

impl HttpBody for TimedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let poll = Pin::new(&mut self.inner).poll_frame(cx);
        if matches!(poll, Poll::Ready(None)) || self.inner.is_end_stream() {
            self.finish();
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for TimedBody {
    fn drop(&mut self) {
        self.finish();
    }
}
