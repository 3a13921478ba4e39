//! API module - REST and WebSocket

pub mod rest;
pub mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::ready_check))

        // Presence rooms
        .route("/realtime/v1/rooms/{room}", get(rest::get_room))
        .route("/realtime/v1/ws", get(websocket::ws_handler))

        // Error reports
        .route("/errors/v1/reports", post(rest::submit_report))
        .with_state(state)
}
