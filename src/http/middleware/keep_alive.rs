//! Connection reuse headers for HTTP/1.x responses.
//!
//! While the server is running, responses advertise the keep-alive window.
//! Once draining starts they carry `Connection: close` so clients move off
//! the instance.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderValue, Version};
use axum::response::Response;

use crate::http::pipeline::Stage;
use crate::http::request::RequestContext;
use crate::lifecycle::{Shutdown, ShutdownState};

#[derive(Debug, Clone)]
pub struct KeepAlive {
    keep_alive: HeaderValue,
    shutdown: Shutdown,
}

impl KeepAlive {
    pub fn new(timeout: Duration, shutdown: Shutdown) -> Self {
        let keep_alive = HeaderValue::from_str(&format!("timeout={}", timeout.as_secs()))
            .unwrap_or_else(|_| HeaderValue::from_static("timeout=30"));
        Self {
            keep_alive,
            shutdown,
        }
    }
}

#[async_trait]
impl Stage for KeepAlive {
    fn name(&self) -> &'static str {
        "keep-alive"
    }

    async fn on_response(&self, ctx: &RequestContext, mut response: Response) -> Response {
        // Connection-specific headers are forbidden in HTTP/2 and later.
        if !matches!(ctx.version, Version::HTTP_10 | Version::HTTP_11) {
            return response;
        }

        let headers = response.headers_mut();
        if self.shutdown.state() == ShutdownState::Running {
            headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
            headers.insert("keep-alive", self.keep_alive.clone());
        } else {
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
            headers.remove("keep-alive");
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::response::IntoResponse;

    fn ctx(version: Version) -> RequestContext {
        let request = Request::get("/").version(version).body(Body::empty()).unwrap();
        RequestContext::from_request(&request)
    }

    #[tokio::test]
    async fn advertises_keep_alive_while_running() {
        let stage = KeepAlive::new(Duration::from_secs(30), Shutdown::new());
        let response = stage.on_response(&ctx(Version::HTTP_11), "ok".into_response()).await;

        assert_eq!(response.headers()[header::CONNECTION], "keep-alive");
        assert_eq!(response.headers()["keep-alive"], "timeout=30");
    }

    #[tokio::test]
    async fn closes_connections_while_draining() {
        let shutdown = Shutdown::new();
        let stage = KeepAlive::new(Duration::from_secs(30), shutdown.clone());
        shutdown.trigger("SIGTERM");

        let response = stage.on_response(&ctx(Version::HTTP_11), "ok".into_response()).await;
        assert_eq!(response.headers()[header::CONNECTION], "close");
        assert!(!response.headers().contains_key("keep-alive"));
    }

    #[tokio::test]
    async fn http2_is_left_alone() {
        let stage = KeepAlive::new(Duration::from_secs(30), Shutdown::new());
        let response = stage.on_response(&ctx(Version::HTTP_2), "ok".into_response()).await;
        assert!(!response.headers().contains_key(header::CONNECTION));
    }
}
