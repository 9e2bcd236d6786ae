//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (registry counters, facade metrics)
//!
//! Consumers:
//!     → stdout (human format, or JSON in production)
//!     → health endpoints (MetricsRegistry snapshot)
//!     → Prometheus scrape (when METRICS_ADDR is set)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every request log event
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{init_metrics, MetricsRegistry, MetricsSnapshot, ProcessSample};
