//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! GET /api/health             → handlers.rs → MetricsRegistry + GatewayConfig
//! GET /api/health/performance → handlers.rs → MetricsRegistry process sample
//! ```
//!
//! # Design Decisions
//! - Read-only: the only side effect is the request counter the pipeline
//!   bumps for every request
//! - Memory figures come from the OS view of this process

pub mod handlers;

use axum::routing::get;
use axum::Router;

use crate::http::server::AppState;

pub use handlers::{HealthReport, PerformanceReport};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/health/performance", get(handlers::performance))
}
