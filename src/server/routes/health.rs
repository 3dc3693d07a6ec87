//! Health check endpoint.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::server::state::AppState;
use crate::server::ws;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub clients: usize,
}

/// GET /health - Liveness and current client count.
///
/// A WebSocket upgrade sent here is upgraded like on any other path.
pub async fn health_check(
    State(state): State<AppState>,
    upgrade: Option<WebSocketUpgrade>,
) -> Response {
    if let Some(upgrade) = upgrade {
        return ws::upgrade(upgrade, state);
    }

    Json(HealthResponse {
        status: "ok",
        clients: state.registry.count(),
    })
    .into_response()
}
