//! Route table and the downstream handler contract.
//!
//! Business endpoints are opaque to the gateway: every matched downstream
//! route is turned into a [`DownstreamRequest`] and handed to the configured
//! [`Downstream`]. Unmatched paths get a classified `404`.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::Router;
use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use serde_json::Value;

use crate::error::GatewayError;
use crate::http::middleware::body_decoding::{read_error, BodyLimit};
use crate::http::payload::ParsedBody;
use crate::http::request::RequestId;
use crate::http::response::Envelope;
use crate::http::server::AppState;

/// A request as seen by business logic.
#[derive(Debug, Clone)]
pub struct DownstreamRequest {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: Option<String>,
    pub headers: HeaderMap,
    /// Decoded JSON or form body, timestamps already revived.
    pub body: Option<ParsedBody>,
    pub raw_body: Bytes,
}

/// Business logic behind the downstream route groups.
///
/// Implementations may take arbitrarily long; the gateway enforces the
/// request deadline around them.
#[async_trait]
pub trait Downstream: Send + Sync + 'static {
    async fn handle(&self, request: DownstreamRequest) -> Result<Response, GatewayError>;
}

/// Answers every downstream request with a summary of what it received.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackHandler;

#[async_trait]
impl Downstream for LoopbackHandler {
    async fn handle(&self, request: DownstreamRequest) -> Result<Response, GatewayError> {
        let params: serde_json::Map<String, Value> = request
            .params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();

        Ok(Envelope::ok("Request accepted")
            .field("requestId", request.request_id)
            .field("method", request.method.as_str())
            .field("path", request.path)
            .field("params", params)
            .field("body", request.body.map(|b| b.payload.to_json()).unwrap_or(Value::Null))
            .into_response())
    }
}

/// Downstream route groups.
pub fn downstream_routes() -> Router<AppState> {
    Router::new()
        .route("/api/memory", any(forward))
        .route("/api/memory/{*rest}", any(forward))
        .route("/api/projects/register", post(forward).fallback(not_found))
        .route("/api/projects/list", get(forward).fallback(not_found))
        .route("/api/projects/{id}", any(forward))
        .route("/api/projects/{id}/{*rest}", any(forward))
}

/// Fallback for unmatched paths and methods.
pub async fn not_found(method: Method, uri: Uri) -> GatewayError {
    GatewayError::NotFound {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}

async fn forward(
    State(state): State<AppState>,
    params: Option<Path<HashMap<String, String>>>,
    request: Request,
) -> Result<Response, GatewayError> {
    let (parts, body) = request.into_parts();
    let limit = match parts.extensions.get::<BodyLimit>() {
        Some(BodyLimit(limit)) => limit,
        None => &state.config.limits.json,
    };
    let raw_body = Limited::new(body, limit.as_usize())
        .collect()
        .await
        .map_err(|error| read_error(error, limit))?
        .to_bytes();

    let request = DownstreamRequest {
        request_id: parts
            .extensions
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_default(),
        method: parts.method,
        path: parts.uri.path().to_string(),
        params: params.map(|Path(p)| p).unwrap_or_default(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body: parts.extensions.get::<ParsedBody>().cloned(),
        raw_body,
    };

    state.downstream.handle(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::payload::{BodyKind, Payload};

    fn request(body: Option<ParsedBody>) -> DownstreamRequest {
        DownstreamRequest {
            request_id: "req-1".into(),
            method: Method::DELETE,
            path: "/api/projects/p1".into(),
            params: HashMap::from([("id".to_string(), "p1".to_string())]),
            query: None,
            headers: HeaderMap::new(),
            body,
            raw_body: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn loopback_echoes_request() {
        let response = LoopbackHandler.handle(request(None)).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["method"], "DELETE");
        assert_eq!(json["params"]["id"], "p1");
        assert_eq!(json["body"], Value::Null);
    }

    #[tokio::test]
    async fn loopback_includes_decoded_body() {
        let body = ParsedBody {
            kind: BodyKind::Json,
            payload: Payload::String("hello".into()),
        };
        let response = LoopbackHandler.handle(request(Some(body))).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["body"], "hello");
    }

    #[tokio::test]
    async fn not_found_carries_method_and_path() {
        let error = not_found(Method::GET, Uri::from_static("/api/unknown/route?x=1")).await;
        match error {
            GatewayError::NotFound { method, path } => {
                assert_eq!(method, "GET");
                assert_eq!(path, "/api/unknown/route");
            }
            other => panic!("expected not found, got {other:?}"),
        }
    }
}
