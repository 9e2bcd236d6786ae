//! OS signal handling.
//!
//! `SIGTERM` and `SIGINT` start a graceful drain. A second signal while the
//! gateway is already draining forces an immediate exit with code 1.

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;

/// Wait for the next termination signal and return its name.
pub async fn termination_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sigint.recv() => "SIGINT",
                }
            }
            (Err(error), _) | (_, Err(error)) => {
                tracing::error!(%error, "Failed to register signal handlers, falling back to Ctrl+C");
                ctrl_c().await
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await
    }
}

async fn ctrl_c() -> &'static str {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

/// Translate OS signals into lifecycle events for as long as the process
/// runs.
pub fn spawn_signal_listener(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let signal = termination_signal().await;
            if shutdown.trigger(signal) {
                tracing::info!(signal, "Termination signal received, draining connections");
            } else {
                tracing::error!(signal, state = shutdown.state().as_str(), "Second termination signal, forcing exit");
                std::process::exit(1);
            }
        }
    })
}
