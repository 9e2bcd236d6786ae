//! Shutdown coordination for the gateway.
//!
//! The process moves through `Running → Draining → Stopped` exactly once.
//! Transitions are driven by [`LifecycleEvent`] values so the state machine
//! can be exercised without sending real signals.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

/// Process-wide lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Input to the shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A termination signal (`SIGTERM`, `SIGINT`) was received.
    Terminate { signal: &'static str },
    /// Every admitted connection has finished.
    Drained,
    /// The grace period elapsed with connections still open.
    GraceExpired,
}

impl ShutdownState {
    /// The state reached by applying `event`, or `None` if the event is not
    /// valid in this state.
    pub fn next(self, event: LifecycleEvent) -> Option<ShutdownState> {
        match (self, event) {
            (ShutdownState::Running, LifecycleEvent::Terminate { .. }) => {
                Some(ShutdownState::Draining)
            }
            (ShutdownState::Draining, LifecycleEvent::Drained)
            | (ShutdownState::Draining, LifecycleEvent::GraceExpired) => {
                Some(ShutdownState::Stopped)
            }
            _ => None,
        }
    }

    pub fn accepts_connections(self) -> bool {
        self == ShutdownState::Running
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownState::Running => "running",
            ShutdownState::Draining => "draining",
            ShutdownState::Stopped => "stopped",
        }
    }
}

/// Error returned when shutdown did not complete cleanly.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("grace period of {grace:?} expired with {open} connection(s) still open")]
    GraceExpired { grace: Duration, open: usize },
}

/// Coordinator for graceful shutdown.
///
/// Holds the single process-wide [`ShutdownState`]. Clones share it; any
/// task can subscribe to changes.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<ShutdownState>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ShutdownState::Running);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> ShutdownState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.tx.subscribe()
    }

    /// Apply an event. Returns the new state if the event caused a
    /// transition; invalid events leave the state untouched.
    pub fn apply(&self, event: LifecycleEvent) -> Option<ShutdownState> {
        let mut transitioned = None;
        self.tx.send_if_modified(|state| match state.next(event) {
            Some(next) => {
                tracing::info!(from = state.as_str(), to = next.as_str(), ?event, "Lifecycle transition");
                *state = next;
                transitioned = Some(next);
                true
            }
            None => {
                tracing::debug!(state = state.as_str(), ?event, "Ignoring lifecycle event");
                false
            }
        });
        transitioned
    }

    /// Begin draining. Returns `false` if shutdown was already under way.
    pub fn trigger(&self, signal: &'static str) -> bool {
        self.apply(LifecycleEvent::Terminate { signal }).is_some()
    }

    /// Resolves once the state has left `Running`.
    pub async fn draining(&self) {
        let mut rx = self.subscribe();
        wait_until_draining(&mut rx).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once the observed state has left `Running`.
pub async fn wait_until_draining(rx: &mut watch::Receiver<ShutdownState>) {
    // Errs only once every `Shutdown` clone is dropped.
    let _ = rx.wait_for(|state| !state.accepts_connections()).await;
}
