//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Install panic hook → Bind listener → Serve
//!
//! Shutdown (shutdown.rs):
//!     Running → Draining → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Terminate event → Draining
//!     Second signal while draining → forced exit (code 1)
//!
//! Uncaught failures (fatal.rs):
//!     Panic → log (uncaught-fatal) → exit 1 in production, continue otherwise
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has a grace period: forced exit after it elapses

pub mod fatal;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use fatal::{install_panic_hook, UncaughtPolicy};
pub use shutdown::{LifecycleEvent, Shutdown, ShutdownError, ShutdownState};
pub use startup::{run, run_with, StartupError};
