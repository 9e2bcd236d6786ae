//! Pipeline stages, in pipeline order.

use axum::http::header::VARY;
use axum::http::{HeaderMap, HeaderValue};

pub mod body_decoding;
pub mod compression;
pub mod cors;
pub mod keep_alive;
pub mod security_headers;
pub mod timeout;
pub mod tracking;

pub use body_decoding::BodyDecoding;
pub use compression::Compression;
pub use cors::Cors;
pub use keep_alive::KeepAlive;
pub use security_headers::SecurityHeaders;
pub use timeout::TimeoutArming;
pub use tracking::RequestTracking;

/// Add `value` to the `Vary` header unless it is already listed.
pub(crate) fn append_vary(headers: &mut HeaderMap, value: &'static str) {
    let listed = headers
        .get_all(VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|v| {
            let v = v.trim();
            v == "*" || v.eq_ignore_ascii_case(value)
        });
    if !listed {
        headers.append(VARY, HeaderValue::from_static(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vary_is_not_duplicated() {
        let mut headers = HeaderMap::new();
        append_vary(&mut headers, "Origin");
        append_vary(&mut headers, "origin");
        append_vary(&mut headers, "Accept-Encoding");
        assert_eq!(headers.get_all(VARY).iter().count(), 2);
    }
}
