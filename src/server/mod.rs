//! WebSocket broadcast server.
//!
//! [`BroadcastServer`] owns the listening socket for the lifetime of one run
//! and the [`ClientRegistry`] across runs. Samples handed to
//! [`BroadcastServer::broadcast`] are encoded once and queued to every
//! registered client without waiting on any of them.

pub mod registry;
pub mod routes;
pub mod state;
pub mod ws;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{RelayError, Result};
use crate::motion::sample::{self, MotionSample};
use crate::server::registry::ClientRegistry;
use crate::server::routes::health;
use crate::server::state::AppState;

pub use registry::{ClientHandle, ClientId, Outbound};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8765;

/// How long `stop` waits for connections and the accept loop to wind down.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Resources of one running instance.
struct Running {
    addr: SocketAddr,
    state: AppState,
    serve_task: JoinHandle<()>,
}

/// Fan-out server for motion samples.
pub struct BroadcastServer {
    registry: Arc<ClientRegistry>,
    running: Mutex<Option<Running>>,
    live: AtomicBool,
}

impl BroadcastServer {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ClientRegistry::new()),
            running: Mutex::new(None),
            live: AtomicBool::new(false),
        }
    }

    /// Binds `addr` and starts accepting connections.
    ///
    /// Returns the bound address, which differs from `addr` when port 0 is
    /// requested. A bind failure leaves the server stopped; no retry is made.
    pub async fn start(&self, addr: SocketAddr) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(run) = running.as_ref() {
            return Err(RelayError::AlreadyRunning(run.addr));
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let state = AppState::new(Arc::clone(&self.registry));
        let app = router(state.clone());
        let shutdown = state.shutdown.clone();

        let serve_task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server terminated");
            }
        });

        self.live.store(true, Ordering::SeqCst);
        *running = Some(Running {
            addr: local_addr,
            state,
            serve_task,
        });

        tracing::info!(addr = %local_addr, "Broadcast server listening on ws://{}", local_addr);
        Ok(local_addr)
    }

    /// Stops accepting, closes every client and releases the port.
    ///
    /// Calling it on a stopped server does nothing. When it returns, no
    /// further frames reach any client and the port can be bound again. A
    /// concurrent `start` waits until the teardown has finished.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(mut run) = running.take() else {
            return;
        };

        self.live.store(false, Ordering::SeqCst);
        run.state.shutdown.cancel();
        close_all(&self.registry);

        run.state.connections.close();
        if tokio::time::timeout(STOP_TIMEOUT, run.state.connections.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                pending = run.state.connections.len(),
                "Connections still closing after stop timeout"
            );
        }
        // Catches a connection that registered while the first drain ran.
        close_all(&self.registry);

        if tokio::time::timeout(STOP_TIMEOUT, &mut run.serve_task)
            .await
            .is_err()
        {
            tracing::warn!("Accept loop did not finish in time, aborting");
            run.serve_task.abort();
            let _ = (&mut run.serve_task).await;
        }

        tracing::info!(addr = %run.addr, "Broadcast server stopped");
    }

    /// Queues `sample` to every connected client.
    ///
    /// The sample must already have passed the throttle. Returns how many
    /// clients accepted the frame. Never blocks on a client and never fails:
    /// an unencodable sample skips the cycle, an unreachable client is
    /// skipped.
    pub fn broadcast(&self, sample: &MotionSample) -> usize {
        if !self.live.load(Ordering::SeqCst) || self.registry.is_empty() {
            return 0;
        }

        let text: Arc<str> = match sample::encode(sample) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping broadcast of unencodable sample");
                return 0;
            }
        };

        let clients = self.registry.snapshot();
        let delivered = clients
            .iter()
            .filter(|client| client.send(Arc::clone(&text)))
            .count();
        tracing::trace!(delivered, clients = clients.len(), "Sample broadcast");
        delivered
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn client_count(&self) -> usize {
        self.registry.count()
    }

    /// Live connection count; updated after every registration change.
    pub fn subscribe_count(&self) -> watch::Receiver<usize> {
        self.registry.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|run| run.addr)
    }
}

impl Default for BroadcastServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BroadcastServer {
    fn drop(&mut self) {
        if let Some(run) = self.running.get_mut().take() {
            run.state.shutdown.cancel();
            run.serve_task.abort();
            close_all(&self.registry);
        }
    }
}

/// Removes every client and asks each connection to send its close frame.
fn close_all(registry: &ClientRegistry) {
    for client in registry.drain() {
        client.close();
    }
}

/// Builds the router for one server run.
fn router(state: AppState) -> Router {
    // CORS layer for browser clients probing /health
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .fallback(ws::upgrade_or_not_found)
        .layer(cors)
        .with_state(state)
}
