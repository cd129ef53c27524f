//! Gateway lifecycle state machine.
//!
//! # States
//! ```text
//! Starting → Accepting → Draining → Stopped
//! ```
//!
//! Transitions only move forward; a state is never re-entered.

use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle phase of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    /// Routes and pools initialized, listener not yet accepting.
    Starting,
    /// Accepting new connections.
    Accepting,
    /// Listener closed, in-flight work finishing.
    Draining,
    /// Terminal.
    Stopped,
}

impl LifecycleState {
    /// True while health endpoints should report ready.
    pub fn is_serving(&self) -> bool {
        matches!(self, LifecycleState::Accepting | LifecycleState::Draining)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Accepting => "accepting",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

/// Shared handle on the lifecycle state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<LifecycleState>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Starting);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Move to `next` if it lies ahead of the current state.
    ///
    /// Returns false (and changes nothing) for backward or repeated transitions.
    pub fn advance(&self, next: LifecycleState) -> bool {
        let advanced = self.tx.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
        if advanced {
            tracing::info!(state = next.as_str(), "Lifecycle transition");
        }
        advanced
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Resolve once the lifecycle has reached `state` (or gone past it).
    pub async fn reached(&self, state: LifecycleState) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|current| *current >= state).await;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
