//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits so a TOML file can supply any subset of
//! fields; everything else falls back to the documented defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::size::ByteSize;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind host, port, connection cap).
    pub listener: ListenerConfig,

    /// Request body size limits.
    pub limits: LimitsConfig,

    /// Request deadline and connection-level timeouts.
    pub timeouts: TimeoutConfig,

    /// Response compression settings.
    pub compression: CompressionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Runtime mode. Only `"production"` changes behavior.
    pub environment: String,

    /// Exit the process on an uncaught failure. Defaults to production mode.
    pub exit_on_uncaught: Option<bool>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            limits: LimitsConfig::default(),
            timeouts: TimeoutConfig::default(),
            compression: CompressionConfig::default(),
            observability: ObservabilityConfig::default(),
            environment: "development".to_string(),
            exit_on_uncaught: None,
        }
    }
}

impl GatewayConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn exits_on_uncaught(&self) -> bool {
        self.exit_on_uncaught.unwrap_or_else(|| self.is_production())
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind.
    pub host: String,

    /// TCP port.
    pub port: u16,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            max_connections: 10_000,
        }
    }
}

impl ListenerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Body size limits for decoded request bodies.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Limit for `application/json` bodies.
    pub json: ByteSize,

    /// Limit for `application/x-www-form-urlencoded` bodies.
    pub url: ByteSize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            json: ByteSize::mib(50),
            url: ByteSize::mib(50),
        }
    }
}

/// Timeout configuration, all values in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-request deadline enforced by the timeout supervisor.
    pub request_ms: u64,

    /// Idle time before a kept-alive connection is closed.
    pub keep_alive_ms: u64,

    /// Time allowed for a client to send complete request headers.
    pub headers_ms: u64,

    /// Time allowed for in-flight requests to finish after a termination signal.
    pub shutdown_grace_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: 300_000,
            keep_alive_ms: 30_000,
            headers_ms: 31_000,
            shutdown_grace_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    pub fn headers(&self) -> Duration {
        Duration::from_millis(self.headers_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Response compression configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Responses smaller than this many bytes are sent uncompressed.
    pub threshold: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { threshold: 1024 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Prometheus exporter bind address; disabled when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}
