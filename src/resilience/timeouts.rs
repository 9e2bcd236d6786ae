//! Per-request deadline enforcement.
//!
//! # Responsibilities
//! - Race a handler against its request deadline
//! - Guarantee exactly one response per request: the handler's or the 408
//! - Drop handler responses that arrive after the timeout committed
//!
//! # Design Decisions
//! - The handler runs in its own spawned task
//! - A fired deadline cancels only the response obligation; the handler task
//!   is left to finish its own work
//! - The completion flag is the single arbiter between the two sides

use std::future::Future;

use tokio::sync::oneshot;
use tokio::time::sleep_until;

use crate::error::GatewayError;
use crate::http::request::{DeadlineHandle, RequestContext};
use crate::observability::MetricsRegistry;

/// Races handlers against their deadlines.
#[derive(Debug, Clone)]
pub struct TimeoutSupervisor {
    metrics: MetricsRegistry,
}

impl TimeoutSupervisor {
    pub fn new(metrics: MetricsRegistry) -> Self {
        Self { metrics }
    }

    /// Run `handler` under `deadline`.
    ///
    /// Returns the handler's output if it committed first, or
    /// [`GatewayError::RequestTimeout`] if the deadline did. A handler that
    /// panics yields [`GatewayError::Internal`].
    pub async fn supervise<F, T>(
        &self,
        ctx: &RequestContext,
        deadline: DeadlineHandle,
        handler: F,
    ) -> Result<T, GatewayError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, mut rx) = oneshot::channel();
        let completion = ctx.completion.clone();
        let metrics = self.metrics.clone();
        let request_id = ctx.id.clone();

        tokio::spawn(async move {
            let output = handler.await;
            if completion.try_complete() {
                // Receiver is gone only if the connection was dropped.
                let _ = tx.send(output);
            } else {
                metrics.record_late_response();
                tracing::debug!(request_id = %request_id, "Dropping handler response after timeout");
            }
        });

        tokio::select! {
            biased;

            output = &mut rx => output.map_err(|_| self.handler_failed(ctx)),
            _ = sleep_until(deadline.deadline()) => {
                if ctx.completion.try_complete() {
                    tracing::warn!(
                        request_id = %ctx.id,
                        method = %ctx.method,
                        path = %ctx.path,
                        timeout_ms = deadline.timeout().as_millis() as u64,
                        "Request timed out"
                    );
                    Err(GatewayError::RequestTimeout {
                        timeout_ms: deadline.timeout().as_millis() as u64,
                        method: ctx.method.to_string(),
                        path: ctx.path.clone(),
                    })
                } else {
                    // The handler committed on the same tick; its output is
                    // already in the channel.
                    rx.await.map_err(|_| self.handler_failed(ctx))
                }
            }
        }
    }

    fn handler_failed(&self, ctx: &RequestContext) -> GatewayError {
        ctx.completion.try_complete();
        GatewayError::internal(format!("handler for {} {} panicked", ctx.method, ctx.path))
    }
}
