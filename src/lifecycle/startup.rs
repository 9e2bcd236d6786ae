//! Startup orchestration.
//!
//! # Responsibilities
//! - Start the metrics exporter when configured
//! - Wire signals into the shutdown state machine
//! - Bind the listener and serve until drained
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last, so traffic arrives only when ready

use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

use crate::config::GatewayConfig;
use crate::http::routes::{Downstream, LoopbackHandler};
use crate::http::server::GatewayServer;
use crate::lifecycle::shutdown::{Shutdown, ShutdownError};
use crate::lifecycle::signals::spawn_signal_listener;
use crate::net::{Listener, ListenerError};
use crate::observability::{init_metrics, MetricsRegistry};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid metrics address `{0}`")]
    MetricsAddress(String),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

/// Run the gateway with the loopback downstream until a termination signal
/// has been handled.
pub async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    run_with(config, LoopbackHandler).await
}

/// Run the gateway with the given downstream business logic.
pub async fn run_with(config: GatewayConfig, downstream: impl Downstream) -> Result<(), StartupError> {
    if let Some(address) = &config.observability.metrics_address {
        let addr: SocketAddr = address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(address.clone()))?;
        init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    let signals = spawn_signal_listener(shutdown.clone());

    let listener = Listener::bind(&config.listener).await?;
    tracing::info!(
        port = config.listener.port,
        json_limit = %config.limits.json,
        request_timeout_ms = config.timeouts.request_ms,
        environment = %config.environment,
        "Gateway starting"
    );

    let server = GatewayServer::builder(config)
        .metrics(MetricsRegistry::new())
        .shutdown(shutdown)
        .downstream(downstream)
        .build();

    let result = server.serve(listener).await;
    signals.abort();
    result.map_err(StartupError::from)
}
