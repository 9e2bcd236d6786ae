//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline dispatch:
//!     → timeouts.rs (race the handler against its deadline)
//!     → handler response, or a single 408, never both
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every dispatched request has a deadline
//! - Connection-level idleness is bounded separately by the server
//!   (keep-alive and header-read timeouts)

pub mod timeouts;

pub use timeouts::TimeoutSupervisor;
