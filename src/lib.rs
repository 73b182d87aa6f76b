//! Roulette Relay Server
//!
//! A WebSocket matchmaking and signaling relay for anonymous two-party
//! random chat:
//!
//! 1. **Matchmaking**: connected clients ask to be paired; a FIFO queue
//!    matches the first two live waiters into a session and designates the
//!    first-dequeued member as the WebRTC initiator.
//!
//! 2. **Signaling relay**: chat messages, SDP offers/answers, ICE candidates,
//!    and stream-ready notices are forwarded verbatim to the session partner
//!    — and only to the partner, never echoed back or broadcast.
//!
//! 3. **Skip ("next")**: either member can abandon the session at any time;
//!    the partner is told the other user disconnected and the skipper
//!    re-enters matchmaking immediately.
//!
//! The server never touches media. It only exchanges the signaling payloads
//! two peers need to establish their own direct connection.
//!
//! # Protocol (JSON over WebSocket at `/ws`)
//!
//! Client → server:
//! - `{"type": "seek_match"}` — enter matchmaking
//! - `{"type": "next"}` — skip the current partner, re-enter matchmaking
//! - `{"type": "chat", "message": "..."}` — relay a chat message
//! - `{"type": "call_offer", "sdp": "...", "kind": "offer"}`
//! - `{"type": "call_answer", "sdp": "...", "kind": "answer"}`
//! - `{"type": "ice_candidate", "candidate": "...", "sdp_media_line_index": 0, "sdp_media_id": "0"}`
//! - `{"type": "local_stream_ready"}`
//! - `{"type": "ping"}`
//!
//! Server → client:
//! - `{"type": "not_enough_users", "message": "Only 1 users online"}`
//! - `{"type": "matched", "message": "..."}`
//! - `{"type": "you_are_initiator", "initiator": true}`
//! - `{"type": "partner_disconnected", "message": "..."}`
//! - relayed `chat` / `call_offer` / `call_answer` / `ice_candidate` /
//!   `local_stream_ready` payloads, unchanged
//! - `{"type": "pong"}`, `{"type": "error", "message": "..."}`

pub mod handler;
pub mod matchmaker;
pub mod protocol;
pub mod state;

use axum::{
    extract::{State, WebSocketUpgrade},
    http::Method,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use matchmaker::{MatchOutcome, Matchmaker};
pub use protocol::{ClientMessage, ServerMessage, Session};
pub use state::{RelayConfig, RelayState};

/// Build the application router.
pub fn router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/info", get(info_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// WebSocket upgrade handler for client connections.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_websocket(socket, state))
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "roulette-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(json!({
        "online_clients": state.online_count(),
        "waiting_clients": state.waiting_count(),
        "active_sessions": state.session_count(),
    }))
}

/// Server info endpoint — returns metadata and the same counters as `/stats`.
/// Also useful for client-side ping measurement (time the round-trip).
async fn info_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(json!({
        "service": "roulette-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "online_clients": state.online_count(),
        "waiting_clients": state.waiting_count(),
        "active_sessions": state.session_count(),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
