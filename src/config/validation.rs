//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and the relation
//! between connection-level timeouts. Every problem is reported, not just
//! the first one.

use crate::config::schema::GatewayConfig;

/// A semantic problem with an otherwise well-formed configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("headers timeout ({headers_ms} ms) must be greater than keep-alive timeout ({keep_alive_ms} ms)")]
    HeadersTimeout { headers_ms: u64, keep_alive_ms: u64 },

    #[error("listener host must not be empty")]
    EmptyHost,
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero { field: "max_connections" });
    }
    if config.limits.json.as_u64() == 0 {
        errors.push(ValidationError::Zero { field: "json limit" });
    }
    if config.limits.url.as_u64() == 0 {
        errors.push(ValidationError::Zero { field: "url limit" });
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("request timeout", timeouts.request_ms),
        ("keep-alive timeout", timeouts.keep_alive_ms),
        ("headers timeout", timeouts.headers_ms),
        ("shutdown grace period", timeouts.shutdown_grace_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if timeouts.headers_ms <= timeouts.keep_alive_ms {
        errors.push(ValidationError::HeadersTimeout {
            headers_ms: timeouts.headers_ms,
            keep_alive_ms: timeouts.keep_alive_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
