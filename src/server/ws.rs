//! WebSocket connection handling.
//!
//! Every request path is upgradable. A request that is not a valid
//! WebSocket upgrade gets a plain `404 Not Found`. Once upgraded, a
//! connection registers itself with the [`ClientRegistry`] and runs a
//! single loop that forwards queued broadcast frames to the peer and reads
//! the peer's frames:
//!
//! - `ping` is answered with a `pong` carrying the same payload (the
//!   WebSocket layer queues the reply and flushes it on the next read).
//! - `close` completes the close handshake and ends the connection.
//! - `text`/`binary` are echoed back to the sender for connectivity checks.
//!
//! Any transport error is an implicit close. Whatever ends the loop, the
//! client is deregistered before the socket is released.
//!
//! [`ClientRegistry`]: super::registry::ClientRegistry

use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;

use super::registry::{ClientHandle, ClientId, Outbound};
use super::state::AppState;

/// Upper bound on writing the final close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Why a connection loop ended.
#[derive(Debug)]
enum CloseReason {
    /// The server is stopping or asked this client to go away.
    ServerShutdown,
    /// The peer sent a close frame or disconnected.
    PeerClosed,
    /// Reading or writing failed.
    Transport(axum::Error),
}

/// Fallback handler: upgrade any path, or answer 404.
pub async fn upgrade_or_not_found(
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(ws) => upgrade(ws, state),
        None => not_found(),
    }
}

/// Completes the upgrade and hands the socket to a tracked connection task.
pub fn upgrade(ws: WebSocketUpgrade, state: AppState) -> Response {
    let connections = state.connections.clone();
    ws.on_failed_upgrade(|e| tracing::debug!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| connections.track_future(handle_socket(socket, state)))
}

pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

/// Runs one connection from registration to deregistration.
async fn handle_socket(socket: WebSocket, state: AppState) {
    if !state.is_accepting() {
        tracing::debug!("Dropping connection upgraded during shutdown");
        return;
    }

    let (client, mut outbound) = ClientHandle::new();
    let id = client.id();
    state.registry.add(client);

    let (mut sink, mut stream) = socket.split();
    let shutdown = state.shutdown.clone();

    let reason = loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break CloseReason::ServerShutdown,

            item = outbound.recv() => match item {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write(&mut sink, Message::Text(text.to_string()), &shutdown).await {
                        break e;
                    }
                }
                Some(Outbound::Close) | None => break CloseReason::ServerShutdown,
            },

            frame = stream.next() => match frame {
                Some(Ok(Message::Ping(payload))) => {
                    tracing::trace!(client_id = %id, bytes = payload.len(), "Ping received");
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = write(&mut sink, Message::Text(text), &shutdown).await {
                        break e;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if let Err(e) = write(&mut sink, Message::Binary(data), &shutdown).await {
                        break e;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(client_id = %id, ?frame, "Close frame received");
                    break CloseReason::PeerClosed;
                }
                Some(Err(e)) => break CloseReason::Transport(e),
                None => break CloseReason::PeerClosed,
            },
        }
    };

    state.registry.remove(id);
    finish(id, sink, reason).await;
}

/// Writes one frame unless shutdown wins the race.
async fn write(
    sink: &mut SplitSink<WebSocket, Message>,
    message: Message,
    shutdown: &CancellationToken,
) -> Result<(), CloseReason> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(CloseReason::ServerShutdown),
        result = sink.send(message) => result.map_err(CloseReason::Transport),
    }
}

/// Ends the close handshake appropriate to `reason` and releases the socket.
async fn finish(id: ClientId, mut sink: SplitSink<WebSocket, Message>, reason: CloseReason) {
    match reason {
        CloseReason::ServerShutdown => {
            let frame = Message::Close(Some(CloseFrame {
                code: close_code::AWAY,
                reason: "server stopping".into(),
            }));
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.send(frame)).await;
            tracing::debug!(client_id = %id, "Connection closed by server");
        }
        CloseReason::PeerClosed => {
            // Flushes the close reply queued when the peer's frame was read.
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
            tracing::debug!(client_id = %id, "Connection closed by peer");
        }
        CloseReason::Transport(e) => {
            tracing::debug!(client_id = %id, error = %e, "Connection dropped");
        }
    }
}
