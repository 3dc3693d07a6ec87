//! Shared state for the HTTP and WebSocket handlers of one server run.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::registry::ClientRegistry;

/// State shared across all handlers of a running server.
///
/// A new `AppState` is built on every `start`; the registry is shared with
/// the owning `BroadcastServer` and outlives individual runs.
#[derive(Clone)]
pub struct AppState {
    /// Live clients.
    pub registry: Arc<ClientRegistry>,

    /// Cancelled when the server stops accepting and connections must end.
    pub shutdown: CancellationToken,

    /// Tracks connection tasks so `stop` can wait for them.
    pub connections: TaskTracker,
}

impl AppState {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self {
            registry,
            shutdown: CancellationToken::new(),
            connections: TaskTracker::new(),
        }
    }

    /// Whether new connections may still be registered.
    pub fn is_accepting(&self) -> bool {
        !self.shutdown.is_cancelled()
    }
}
