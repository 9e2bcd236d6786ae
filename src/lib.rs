//! Request-lifecycle layer for a JSON gateway.
//!
//! Accepts, size-limits, compresses, time-bounds and gracefully terminates
//! the handling of large JSON payloads. Business endpoints are supplied as a
//! [`Downstream`](http::Downstream) implementation.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::Listener ──▶ http::server (hyper) ──▶ http::pipeline
//!                                                              │
//!        compression → security headers → CORS → body decoding │
//!        → timeout arming → keep-alive → request tracking      │
//!                                                              ▼
//!                           resilience::TimeoutSupervisor ──▶ routes
//!                                                              │
//!     Client ◀──────────── response phase (reverse order) ◀────┘
//!
//!     Cross-cutting: config, error, observability, lifecycle, health
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;

pub use config::GatewayConfig;
pub use error::{ErrorClassifier, ErrorKind, GatewayError};
pub use http::{Downstream, DownstreamRequest, GatewayServer};
pub use lifecycle::Shutdown;
pub use observability::MetricsRegistry;
