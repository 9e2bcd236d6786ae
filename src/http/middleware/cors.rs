//! Cross-origin resource sharing.
//!
//! All origins are allowed. The request `Origin` is reflected rather than
//! answered with `*` so credentialed requests keep working. Preflights are
//! answered directly with `204 No Content`.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::http::middleware::append_vary;
use crate::http::pipeline::{Stage, StageOutcome};
use crate::http::request::RequestContext;

const ALLOW_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

/// CORS stage.
#[derive(Debug, Clone)]
pub struct Cors {
    max_age: Duration,
    allow_credentials: bool,
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(86_400),
            allow_credentials: true,
        }
    }
}

impl Cors {
    fn preflight(&self, request: &Request<Body>) -> Response {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();

        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        if let Some(requested) = request.headers().get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
            append_vary(headers, "Access-Control-Request-Headers");
        }
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from(self.max_age.as_secs()),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        response
    }
}

fn is_preflight(request: &Request<Body>) -> bool {
    request.method() == Method::OPTIONS
        && request.headers().contains_key(header::ORIGIN)
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

#[async_trait]
impl Stage for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    async fn on_request(&self, _ctx: &mut RequestContext, request: Request<Body>) -> StageOutcome {
        if is_preflight(&request) {
            return StageOutcome::Respond(self.preflight(&request));
        }
        StageOutcome::Continue(request)
    }

    async fn on_response(&self, ctx: &RequestContext, mut response: Response) -> Response {
        let Some(origin) = ctx.headers.get(header::ORIGIN) else {
            return response;
        };

        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        append_vary(headers, "Origin");
        response
    }
}
