//! Arms the per-request deadline.
//!
//! The deadline itself is enforced by the
//! [`TimeoutSupervisor`](crate::resilience::TimeoutSupervisor) at dispatch.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;

use crate::http::pipeline::{Stage, StageOutcome};
use crate::http::request::{DeadlineHandle, RequestContext};

#[derive(Debug, Clone, Copy)]
pub struct TimeoutArming {
    timeout: Duration,
}

impl TimeoutArming {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Stage for TimeoutArming {
    fn name(&self) -> &'static str {
        "timeout"
    }

    async fn on_request(&self, ctx: &mut RequestContext, request: Request<Body>) -> StageOutcome {
        ctx.deadline = Some(DeadlineHandle::arm(self.timeout));
        StageOutcome::Continue(request)
    }
}
