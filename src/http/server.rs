//! HTTP server setup and the connection accept loop.
//!
//! # Responsibilities
//! - Build the axum `Router`: health routes, downstream groups, 404 fallback
//! - Wrap the router in the request pipeline and a tracing layer
//! - Serve HTTP/1.1 and HTTP/2 connections with hyper, applying the
//!   header-read timeout and keep-alive policy
//! - Stop accepting on drain, gracefully close live connections, and give
//!   up after the grace period

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware::from_fn_with_state;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::error::{BoxError, ErrorClassifier, ErrorKind};
use crate::health;
use crate::http::pipeline::{run_pipeline, Pipeline};
use crate::http::routes::{downstream_routes, not_found, Downstream, LoopbackHandler};
use crate::lifecycle::shutdown::wait_until_draining;
use crate::lifecycle::{LifecycleEvent, Shutdown, ShutdownError};
use crate::net::{ConnectionGuard, ConnectionPermit, ConnectionTracker, Listener, ListenerError};
use crate::observability::MetricsRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub metrics: MetricsRegistry,
    pub shutdown: Shutdown,
    pub downstream: Arc<dyn Downstream>,
}

/// Builder for [`GatewayServer`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    metrics: Option<MetricsRegistry>,
    shutdown: Option<Shutdown>,
    downstream: Option<Arc<dyn Downstream>>,
}

impl GatewayBuilder {
    pub fn metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Business logic for the downstream route groups. Defaults to
    /// [`LoopbackHandler`].
    pub fn downstream(mut self, downstream: impl Downstream) -> Self {
        let downstream: Arc<dyn Downstream> = Arc::new(downstream);
        self.downstream = Some(downstream);
        self
    }

    pub fn build(self) -> GatewayServer {
        let config = Arc::new(self.config);
        let metrics = self.metrics.unwrap_or_default();
        let shutdown = self.shutdown.unwrap_or_default();
        let downstream = match self.downstream {
            Some(downstream) => downstream,
            None => Arc::new(LoopbackHandler),
        };

        let pipeline = Pipeline::standard(&config, metrics.clone(), shutdown.clone());
        let classifier = pipeline.classifier().clone();
        let state = AppState {
            config: Arc::clone(&config),
            metrics: metrics.clone(),
            shutdown: shutdown.clone(),
            downstream,
        };

        GatewayServer {
            router: build_router(state, pipeline),
            classifier,
            config,
            metrics,
            shutdown,
            connections: ConnectionTracker::new(),
        }
    }
}

/// Assemble the full router. Every route and the fallback run inside the
/// pipeline.
pub fn build_router(state: AppState, pipeline: Pipeline) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(downstream_routes())
        .fallback(not_found)
        .with_state(state)
        .layer(from_fn_with_state(pipeline, run_pipeline))
        .layer(TraceLayer::new_for_http())
}

/// The gateway HTTP server.
pub struct GatewayServer {
    router: Router,
    classifier: ErrorClassifier,
    config: Arc<GatewayConfig>,
    metrics: MetricsRegistry,
    shutdown: Shutdown,
    connections: ConnectionTracker,
}

impl GatewayServer {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder {
            config,
            metrics: None,
            shutdown: None,
            downstream: None,
        }
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    /// Accept connections until shutdown starts, then drain.
    ///
    /// Returns `Ok` once every connection has closed, or
    /// [`ShutdownError::GraceExpired`] if the grace period ran out first.
    pub async fn serve(self, listener: Listener) -> Result<(), ShutdownError> {
        match listener.local_addr() {
            Ok(addr) => tracing::info!(address = %addr, "Gateway listening"),
            Err(error) => tracing::warn!(%error, "Gateway listening on unknown address"),
        }

        let mut draining = self.shutdown.subscribe();
        loop {
            let accepted = tokio::select! {
                biased;
                _ = wait_until_draining(&mut draining) => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer, permit)) => self.spawn_connection(stream, peer, permit),
                Err(ListenerError::Accept(error)) => {
                    tracing::warn!(%error, "Accept failed");
                }
                Err(error) => {
                    tracing::error!(%error, "Listener failed, shutting down");
                    self.shutdown.trigger("listener-failure");
                    break;
                }
            }
        }

        drop(listener);
        self.drain().await
    }

    async fn drain(&self) -> Result<(), ShutdownError> {
        let grace = self.config.timeouts.shutdown_grace();
        tracing::info!(
            open = self.connections.active_count(),
            grace_ms = grace.as_millis() as u64,
            "Listener closed, draining connections"
        );

        match tokio::time::timeout(grace, self.connections.wait_for_drain()).await {
            Ok(()) => {
                self.shutdown.apply(LifecycleEvent::Drained);
                tracing::info!("All connections drained");
                Ok(())
            }
            Err(_) => {
                let open = self.connections.active_count();
                self.shutdown.apply(LifecycleEvent::GraceExpired);
                tracing::error!(open, grace_ms = grace.as_millis() as u64, "Grace period expired");
                Err(ShutdownError::GraceExpired { grace, open })
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        let guard = self.connections.track();
        let service = TowerToHyperService::new(self.router.clone());
        let mut draining = self.shutdown.subscribe();
        let header_timeout = self.config.timeouts.headers();
        let classifier = self.classifier.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let builder = connection_builder(header_timeout);
            let connection = builder.serve_connection(TokioIo::new(stream), service);
            tokio::pin!(connection);

            let result = tokio::select! {
                result = connection.as_mut() => result,
                _ = wait_until_draining(&mut draining) => {
                    connection.as_mut().graceful_shutdown();
                    connection.as_mut().await
                }
            };

            log_connection_end(&guard, peer, &classifier, result);
        });
    }
}

fn connection_builder(header_timeout: Duration) -> auto::Builder<TokioExecutor> {
    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(header_timeout)
        .keep_alive(true);
    builder
}

fn log_connection_end(
    guard: &ConnectionGuard,
    peer: SocketAddr,
    classifier: &ErrorClassifier,
    result: Result<(), BoxError>,
) {
    let Err(error) = result else {
        tracing::trace!(connection_id = %guard.id(), %peer, "Connection finished");
        return;
    };

    match error.downcast_ref::<hyper::Error>() {
        Some(hyper_error) if hyper_error.is_timeout() => {
            tracing::debug!(connection_id = %guard.id(), %peer, "Header read timeout, connection closed")
        }
        Some(hyper_error) if hyper_error.is_incomplete_message() => {
            tracing::debug!(connection_id = %guard.id(), %peer, "Peer closed connection mid-request")
        }
        _ => {
            let kind = connection_error_kind(classifier, &error);
            tracing::debug!(connection_id = %guard.id(), %peer, kind = kind.as_str(), %error, "Connection ended with error")
        }
    }
}

fn connection_error_kind(classifier: &ErrorClassifier, error: &BoxError) -> ErrorKind {
    let error: &(dyn std::error::Error + 'static) = &**error;
    classifier.classify_any(error).kind
}
