//! Fixed-order request pipeline.
//!
//! Every request flows through the same stages in the same order:
//!
//! 1. **Compression** - negotiate response encoding
//! 2. **Security headers** - hardening headers on every response
//! 3. **CORS** - preflight answers and origin reflection
//! 4. **Body decoding** - size limits, JSON/form decoding, timestamp revival
//! 5. **Timeout** - arm the per-request deadline
//! 6. **Keep-alive** - connection reuse headers
//! 7. **Tracking** - request counter, request ID, slow/large request logs
//!
//! followed by route dispatch under the timeout supervisor.
//!
//! The request phase runs each stage's [`Stage::on_request`] in order until
//! one short-circuits or fails. The response phase then runs every stage's
//! [`Stage::on_response`] exactly once in reverse order, whatever produced
//! the response. The request's completion flag is set before the response
//! phase on every path, and the final body is timed until it ends.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::GatewayConfig;
use crate::error::{ErrorClassifier, GatewayError, PendingError};
use crate::http::middleware::tracking::time_body;
use crate::http::middleware::{
    BodyDecoding, Compression, Cors, KeepAlive, RequestTracking, SecurityHeaders, TimeoutArming,
};
use crate::http::request::{RequestContext, RequestId};
use crate::lifecycle::Shutdown;
use crate::observability::MetricsRegistry;
use crate::resilience::TimeoutSupervisor;

/// Result of a stage's request phase.
#[derive(Debug)]
pub enum StageOutcome {
    /// Pass the (possibly transformed) request to the next stage.
    Continue(Request<Body>),
    /// Stop here and send this response.
    Respond(Response),
    /// Stop here and render this failure through the classifier.
    Fail(GatewayError),
}

/// One ordered unit of request processing.
///
/// Stages are built once at startup and shared read-only across requests.
/// Per-request state belongs in the [`RequestContext`].
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_request(&self, _ctx: &mut RequestContext, request: Request<Body>) -> StageOutcome {
        StageOutcome::Continue(request)
    }

    async fn on_response(&self, _ctx: &RequestContext, response: Response) -> Response {
        response
    }
}

/// The pipeline runner.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Stage>]>,
    classifier: ErrorClassifier,
    supervisor: TimeoutSupervisor,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Pipeline {
    pub fn builder(classifier: ErrorClassifier, supervisor: TimeoutSupervisor) -> PipelineBuilder {
        PipelineBuilder {
            stages: Vec::new(),
            classifier,
            supervisor,
        }
    }

    /// The gateway's standard stage order.
    pub fn standard(config: &GatewayConfig, metrics: MetricsRegistry, shutdown: Shutdown) -> Self {
        Self::builder(
            ErrorClassifier::new(config),
            TimeoutSupervisor::new(metrics.clone()),
        )
        .stage(Compression::new(config.compression.threshold))
        .stage(SecurityHeaders::default())
        .stage(Cors::default())
        .stage(BodyDecoding::new(&config.limits))
        .stage(TimeoutArming::new(config.timeouts.request()))
        .stage(KeepAlive::new(config.timeouts.keep_alive(), shutdown))
        .stage(RequestTracking::new(metrics))
        .build()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Run `request` through every stage, dispatching to `dispatch` if no
    /// stage short-circuits.
    pub async fn handle<D, F>(&self, request: Request<Body>, dispatch: D) -> Response
    where
        D: FnOnce(Request<Body>) -> F,
        F: Future<Output = Response> + Send + 'static,
    {
        let mut ctx = RequestContext::from_request(&request);

        let response = 'stages: {
            let mut request = request;
            for stage in self.stages.iter() {
                request = match stage.on_request(&mut ctx, request).await {
                    StageOutcome::Continue(next) => next,
                    StageOutcome::Respond(response) => {
                        tracing::debug!(request_id = %ctx.id, stage = stage.name(), "Stage responded");
                        break 'stages response;
                    }
                    StageOutcome::Fail(error) => {
                        tracing::debug!(request_id = %ctx.id, stage = stage.name(), %error, "Stage failed");
                        break 'stages self.render(&ctx, &error);
                    }
                };
            }
            request.extensions_mut().insert(RequestId(ctx.id.clone()));
            self.dispatch(&ctx, request, dispatch).await
        };

        // No-op when the timeout supervisor already committed.
        ctx.completion.try_complete();

        let mut response = self.render_pending(&ctx, response);
        for stage in self.stages.iter().rev() {
            response = stage.on_response(&ctx, response).await;
        }
        time_body(response)
    }

    async fn dispatch<D, F>(&self, ctx: &RequestContext, request: Request<Body>, dispatch: D) -> Response
    where
        D: FnOnce(Request<Body>) -> F,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = dispatch(request);
        match ctx.deadline {
            Some(deadline) => match self.supervisor.supervise(ctx, deadline, handler).await {
                Ok(response) => response,
                Err(error) => self.render(ctx, &error),
            },
            None => handler.await,
        }
    }

    fn render_pending(&self, ctx: &RequestContext, mut response: Response) -> Response {
        match response.extensions_mut().remove::<PendingError>() {
            Some(PendingError(error)) => self.render(ctx, &error),
            None => response,
        }
    }

    fn render(&self, ctx: &RequestContext, error: &GatewayError) -> Response {
        let record = self.classifier.classify(error);
        if record.status.is_server_error() {
            tracing::error!(
                request_id = %ctx.id,
                method = %ctx.method,
                path = %ctx.path,
                kind = record.kind.as_str(),
                status = record.status.as_u16(),
                %error,
                "Request failed"
            );
        } else {
            tracing::warn!(
                request_id = %ctx.id,
                method = %ctx.method,
                path = %ctx.path,
                kind = record.kind.as_str(),
                status = record.status.as_u16(),
                "Request rejected"
            );
        }
        record.into_response()
    }
}

/// Builder preserving insertion order.
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
    classifier: ErrorClassifier,
    supervisor: TimeoutSupervisor,
}

impl PipelineBuilder {
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages.into(),
            classifier: self.classifier,
            supervisor: self.supervisor,
        }
    }
}

/// axum middleware entry point wrapping the router.
pub async fn run_pipeline(State(pipeline): State<Pipeline>, request: Request, next: Next) -> impl IntoResponse {
    pipeline.handle(request, |request| next.run(request)).await
}
