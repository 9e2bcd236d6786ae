//! Response compression.
//!
//! The encoding is negotiated from `Accept-Encoding` during the request
//! phase and applied to the final response during the response phase.
//!
//! ## Rules
//!
//! - Bodies smaller than the threshold (default 1024 bytes) are left alone
//! - Level is fixed at maximum
//! - JSON content is always eligible; other types go through a generic
//!   compressible-type filter
//! - A request carrying `x-no-compression` opts out
//! - `Cache-Control: no-transform` and already-encoded responses are skipped

use std::io::{self, Write};

use async_trait::async_trait;
use axum::body::{Body, Bytes, HttpBody};
use axum::extract::Request;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::Response;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression as Level;
use http_body_util::BodyExt;

use crate::http::middleware::append_vary;
use crate::http::pipeline::{Stage, StageOutcome};
use crate::http::request::RequestContext;

/// Request header that disables compression for a single request.
pub const X_NO_COMPRESSION: &str = "x-no-compression";

/// Bodies at least this large are compressed on the blocking pool.
const BLOCKING_THRESHOLD: usize = 64 * 1024;

/// Supported content codings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Gzip,
    Deflate,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
        }
    }

    fn encode(self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Encoding::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Level::best());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Encoding::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Level::best());
                encoder.write_all(data)?;
                encoder.finish()
            }
        }
    }
}

/// Outcome of negotiation, kept in the request context.
#[derive(Debug, Clone, Copy)]
struct Negotiated(Encoding);

/// Pick the best supported encoding from an `Accept-Encoding` value.
///
/// Quality values are honoured; `q=0` excludes a coding and `identity`
/// preferred above every supported coding disables compression.
pub fn negotiate(accept_encoding: &str) -> Option<Encoding> {
    let mut candidates: Vec<(Option<Encoding>, f32)> = Vec::new();

    for part in accept_encoding.split(',') {
        let mut pieces = part.split(';');
        let coding = pieces.next().unwrap_or_default().trim().to_ascii_lowercase();
        if coding.is_empty() {
            continue;
        }

        let quality = pieces
            .filter_map(|param| param.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .map(|q| q.clamp(0.0, 1.0))
            .unwrap_or(1.0);

        let encoding = match coding.as_str() {
            "gzip" | "x-gzip" | "*" => Some(Encoding::Gzip),
            "deflate" => Some(Encoding::Deflate),
            "identity" => None,
            _ => continue,
        };
        candidates.push((encoding, quality));
    }

    // Stable sort keeps header order among equal qualities.
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    candidates
        .into_iter()
        .find(|(_, quality)| *quality > 0.0)
        .and_then(|(encoding, _)| encoding)
}

/// Whether a `Content-Type` is worth compressing.
pub fn is_compressible(content_type: &str) -> bool {
    let base = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if base == "application/json" || base.ends_with("+json") {
        return true;
    }
    base.starts_with("text/")
        || base.ends_with("+xml")
        || matches!(
            base.as_str(),
            "application/javascript"
                | "application/xml"
                | "application/x-www-form-urlencoded"
                | "application/graphql"
                | "image/svg+xml"
        )
}

/// Compression stage.
#[derive(Debug, Clone)]
pub struct Compression {
    threshold: usize,
}

impl Compression {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    fn eligible(&self, ctx: &RequestContext, response: &Response) -> bool {
        if ctx.method == Method::HEAD
            || response.status() == StatusCode::NO_CONTENT
            || response.status() == StatusCode::NOT_MODIFIED
        {
            return false;
        }

        let headers = response.headers();
        if headers.contains_key(header::CONTENT_ENCODING) {
            return false;
        }
        let no_transform = headers
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains("no-transform"));

        !no_transform
    }
}

#[async_trait]
impl Stage for Compression {
    fn name(&self) -> &'static str {
        "compression"
    }

    async fn on_request(&self, ctx: &mut RequestContext, request: Request<Body>) -> StageOutcome {
        if request.headers().contains_key(X_NO_COMPRESSION) {
            return StageOutcome::Continue(request);
        }
        let negotiated = request
            .headers()
            .get(header::ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .and_then(negotiate);
        if let Some(encoding) = negotiated {
            ctx.extensions.insert(Negotiated(encoding));
        }
        StageOutcome::Continue(request)
    }

    async fn on_response(&self, ctx: &RequestContext, mut response: Response) -> Response {
        let compressible = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_compressible);
        if !compressible {
            return response;
        }
        append_vary(response.headers_mut(), "Accept-Encoding");

        let Some(Negotiated(encoding)) = ctx.extensions.get::<Negotiated>().copied() else {
            return response;
        };
        if !self.eligible(ctx, &response) {
            return response;
        }

        // Only bodies of known size are buffered.
        let size = HttpBody::size_hint(response.body()).exact();
        match size {
            Some(len) if len >= self.threshold as u64 => {}
            _ => return response,
        }

        let (mut parts, body) = response.into_parts();
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(error) => {
                tracing::warn!(request_id = %ctx.id, %error, "Failed to buffer response for compression");
                return Response::from_parts(parts, Body::empty());
            }
        };

        let original_len = bytes.len();
        let compressed = if original_len >= BLOCKING_THRESHOLD {
            let input = bytes.clone();
            match tokio::task::spawn_blocking(move || encoding.encode(&input)).await {
                Ok(result) => result,
                Err(join_error) => Err(io::Error::other(join_error)),
            }
        } else {
            encoding.encode(&bytes)
        };

        match compressed {
            Ok(compressed) if compressed.len() < original_len => {
                parts.headers.insert(
                    header::CONTENT_ENCODING,
                    HeaderValue::from_static(encoding.as_str()),
                );
                parts.headers.remove(header::CONTENT_LENGTH);
                tracing::trace!(
                    request_id = %ctx.id,
                    encoding = encoding.as_str(),
                    original_len,
                    compressed_len = compressed.len(),
                    "Compressed response"
                );
                Response::from_parts(parts, Body::from(Bytes::from(compressed)))
            }
            Ok(_) => Response::from_parts(parts, Body::from(bytes)),
            Err(error) => {
                tracing::warn!(request_id = %ctx.id, %error, "Compression failed, sending identity");
                Response::from_parts(parts, Body::from(bytes))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use axum::Json;
    use flate2::read::GzDecoder;
    use std::io::Read;

    async fn run(stage: &Compression, request: Request<Body>, response: Response) -> Response {
        let mut ctx = RequestContext::from_request(&request);
        let StageOutcome::Continue(_) = stage.on_request(&mut ctx, request).await else {
            panic!("compression never short-circuits");
        };
        stage.on_response(&ctx, response).await
    }

    fn large_json() -> Response {
        let items: Vec<_> = (0..500).map(|i| serde_json::json!({ "id": i, "name": "item" })).collect();
        Json(items).into_response()
    }

    fn request(accept: Option<&str>) -> Request<Body> {
        let mut builder = Request::get("/api/memory/list");
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT_ENCODING, accept);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn negotiates_by_quality() {
        assert_eq!(negotiate("gzip, deflate, br"), Some(Encoding::Gzip));
        assert_eq!(negotiate("deflate;q=1.0, gzip;q=0.5"), Some(Encoding::Deflate));
        assert_eq!(negotiate("gzip;q=0, deflate"), Some(Encoding::Deflate));
        assert_eq!(negotiate("br"), None);
        assert_eq!(negotiate("identity"), None);
        assert_eq!(negotiate("*"), Some(Encoding::Gzip));
        assert_eq!(negotiate(""), None);
    }

    #[test]
    fn json_is_always_compressible() {
        assert!(is_compressible("application/json"));
        assert!(is_compressible("application/vnd.api+json; charset=utf-8"));
        assert!(is_compressible("text/plain"));
        assert!(!is_compressible("image/png"));
        assert!(!is_compressible("application/octet-stream"));
    }

    #[tokio::test]
    async fn compresses_large_json() {
        let stage = Compression::new(1024);
        let response = run(&stage, request(Some("gzip")), large_json()).await;

        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(response.headers()[header::VARY], "Accept-Encoding");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let mut decoded = String::new();
        GzDecoder::new(&body[..]).read_to_string(&mut decoded).unwrap();
        let value: serde_json::Value = serde_json::from_str(&decoded).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 500);
    }

    #[tokio::test]
    async fn small_bodies_are_not_compressed() {
        let stage = Compression::new(1024);
        let response = run(
            &stage,
            request(Some("gzip")),
            Json(serde_json::json!({ "ok": true })).into_response(),
        )
        .await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn bypass_header_opts_out() {
        let stage = Compression::new(1024);
        let request = Request::get("/")
            .header(header::ACCEPT_ENCODING, "gzip")
            .header(X_NO_COMPRESSION, "1")
            .body(Body::empty())
            .unwrap();
        let response = run(&stage, request, large_json()).await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn no_accept_encoding_means_identity() {
        let stage = Compression::new(1024);
        let response = run(&stage, request(None), large_json()).await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn no_transform_is_respected() {
        let stage = Compression::new(1024);
        let mut response = large_json();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-transform"));
        let response = run(&stage, request(Some("gzip")), response).await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }
}
