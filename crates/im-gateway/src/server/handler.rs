//! HTTP handlers
//!
//! WebSocket upgrade plus the health and stats endpoints.

use crate::connection::Transport;
use crate::registry::RegistryStats;
use crate::server::GatewayState;
use axum::{
    extract::{ConnectInfo, State, WebSocketUpgrade},
    response::IntoResponse,
    Json,
};
use std::net::SocketAddr;

/// WebSocket gateway handler
pub async fn ws_handler(
    State(state): State<GatewayState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let transport = Transport::websocket(socket, addr.to_string());
        if let Err(e) = state.gateway().handle_connection(transport) {
            tracing::warn!(addr = %addr, error = %e, "Failed to accept connection");
        }
    })
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Registry and worker pool counters
pub async fn stats(State(state): State<GatewayState>) -> Json<RegistryStats> {
    Json(state.gateway().registry().stats())
}
