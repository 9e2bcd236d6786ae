//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper connection, axum router)
//!     → pipeline.rs (fixed stage order, see middleware/)
//!     → routes.rs (health, downstream groups, 404 fallback)
//!     → timeout supervisor races the handler
//!     → response phase (stages in reverse order)
//!     → Send to client
//! ```

pub mod middleware;
pub mod payload;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod routes;
pub mod server;

pub use payload::{BodyKind, ParsedBody, Payload};
pub use pipeline::{Pipeline, Stage, StageOutcome};
pub use request::{RequestContext, RequestId, X_REQUEST_ID};
pub use response::Envelope;
pub use routes::{Downstream, DownstreamRequest, LoopbackHandler};
pub use server::{AppState, GatewayBuilder, GatewayServer};
