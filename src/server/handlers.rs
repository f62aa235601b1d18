//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, Json, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::connection::run_connection;
use super::registry::SessionSummary;
use super::state::AppState;
use crate::protocol::{PROTOCOL_VERSION, WS_ENDPOINT};

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let logging = state.config.logging;
    let cors = state.config.cors_enabled;

    let mut router = Router::new()
        // Protocol endpoint
        .route(WS_ENDPOINT, get(ws_upgrade))
        // Health and status
        .route("/health", get(health_check))
        .route("/status", get(status))
        .with_state(state);

    if cors {
        router = router.layer(CorsLayer::permissive());
    }
    if logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

/// Upgrade to a protocol connection
async fn ws_upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.max_message_size(state.config.max_frame_bytes)
        .on_upgrade(move |socket| run_connection(socket, state))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always "ok"
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Status response
#[derive(Serialize)]
pub struct StatusResponse {
    /// Always "ok"
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
    /// Wire protocol version
    pub protocol_version: &'static str,
    /// Seconds since start
    pub uptime_secs: u64,
    /// Live sessions
    pub active_sessions: usize,
    /// Open WebSocket connections
    pub active_connections: usize,
    /// Per-session summaries, oldest first
    pub sessions: Vec<SessionSummary>,
}

/// Status endpoint
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sessions = state.registry.snapshot().await;

    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        protocol_version: PROTOCOL_VERSION,
        uptime_secs: state.uptime().as_secs(),
        active_sessions: sessions.len(),
        active_connections: state.registry.connection_count().await,
        sessions,
    })
}
