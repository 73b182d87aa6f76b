//! WebSocket connection handler.
//!
//! Manages individual WebSocket connections: assigning connection ids,
//! parsing client messages, routing them through matchmaking and the relay,
//! and sending responses.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::matchmaker::MatchOutcome;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::RelayState;

/// Text sent to both members when a pair is formed.
const MATCHED_MESSAGE: &str = "You are matched with another user";

/// Text sent to the abandoned member on disconnect or skip. A skip is
/// deliberately indistinguishable from a real disconnect.
const PARTNER_DISCONNECTED_MESSAGE: &str = "Other user has disconnected";

/// Handle a single WebSocket connection.
///
/// This function runs for the lifetime of the connection:
/// 1. Assigns a fresh connection id and registers the outbound channel
/// 2. Spawns a sender task to forward outbound messages
/// 3. Processes incoming messages until the connection closes
/// 4. Tears down matchmaking state and notifies the abandoned partner
pub async fn handle_websocket(socket: WebSocket, state: RelayState) {
    // Clients are anonymous: the id exists only for the lifetime of the
    // socket and is never revealed to the peer.
    let conn_id = Uuid::new_v4().to_string();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    state.register_client(&conn_id, tx);

    // ── Sender Task ───────────────────────────────────────────────────────

    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize server message: {}", e);
                }
            }
        }
    });

    // ── Receive Loop ──────────────────────────────────────────────────────

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(&state, &conn_id, client_msg);
                }
                Err(e) => {
                    tracing::warn!(
                        conn = conn_id.as_str(),
                        error = %e,
                        "Failed to parse client message"
                    );
                    state.send_to_client(
                        &conn_id,
                        ServerMessage::Error {
                            message: format!("Invalid message format: {}", e),
                        },
                    );
                }
            },
            Ok(Message::Ping(_)) => {
                // Axum answers protocol pings itself; nothing to do here.
            }
            Ok(Message::Close(_)) => {
                tracing::info!(conn = conn_id.as_str(), "Client sent close frame");
                break;
            }
            Err(e) => {
                tracing::warn!(conn = conn_id.as_str(), error = %e, "WebSocket error");
                break;
            }
            _ => {} // Binary, Pong — ignore
        }
    }

    // ── Cleanup ───────────────────────────────────────────────────────────

    // Disconnect is terminal for this id: purge the session before dropping
    // the registry entry, and tell whoever was left behind.
    for partner in state.disconnect(&conn_id) {
        state.send_to_client(
            &partner,
            ServerMessage::PartnerDisconnected {
                message: PARTNER_DISCONNECTED_MESSAGE.to_string(),
            },
        );
    }

    state.unregister_client(&conn_id);
    sender_task.abort();
    tracing::info!(conn = conn_id.as_str(), "WebSocket disconnected");
}

/// Handle a parsed client message.
fn handle_client_message(state: &RelayState, conn_id: &str, msg: ClientMessage) {
    match msg {
        ClientMessage::SeekMatch => {
            handle_seek_match(state, conn_id);
        }

        ClientMessage::Next => {
            handle_next(state, conn_id);
        }

        ClientMessage::Chat { message } => {
            relay_to_partner(state, conn_id, "chat", ServerMessage::Chat { message });
        }

        ClientMessage::CallOffer { sdp, kind } => {
            relay_to_partner(state, conn_id, "offer", ServerMessage::CallOffer { sdp, kind });
        }

        ClientMessage::CallAnswer { sdp, kind } => {
            relay_to_partner(state, conn_id, "answer", ServerMessage::CallAnswer { sdp, kind });
        }

        ClientMessage::IceCandidate {
            candidate,
            sdp_media_line_index,
            sdp_media_id,
        } => {
            relay_to_partner(
                state,
                conn_id,
                "ice candidate",
                ServerMessage::IceCandidate {
                    candidate,
                    sdp_media_line_index,
                    sdp_media_id,
                },
            );
        }

        ClientMessage::LocalStreamReady => {
            relay_to_partner(state, conn_id, "stream notice", ServerMessage::LocalStreamReady);
        }

        ClientMessage::Ping => {
            state.send_to_client(conn_id, ServerMessage::Pong);
        }
    }
}

// ── Message Handlers ──────────────────────────────────────────────────────────

/// Enter matchmaking and report the outcome to everyone involved.
fn handle_seek_match(state: &RelayState, conn_id: &str) {
    match state.request_match(conn_id) {
        MatchOutcome::Paired(session) => {
            let [initiator, responder] = &session.members;

            for member in &session.members {
                state.send_to_client(
                    member,
                    ServerMessage::Matched {
                        message: MATCHED_MESSAGE.to_string(),
                    },
                );
            }

            // The first-dequeued member sends the offer.
            state.send_to_client(initiator, ServerMessage::YouAreInitiator { initiator: true });
            state.send_to_client(responder, ServerMessage::YouAreInitiator { initiator: false });
        }

        MatchOutcome::NotEnough { online } => {
            state.send_to_client(
                conn_id,
                ServerMessage::NotEnoughUsers {
                    message: format!("Only {} users online", online),
                },
            );
        }

        MatchOutcome::AlreadyMatched => {
            tracing::warn!(conn = conn_id, "Match request while already in a session");
        }
    }
}

/// Skip the current partner and immediately re-enter matchmaking.
fn handle_next(state: &RelayState, conn_id: &str) {
    if let Some(partner) = state.leave_session(conn_id) {
        state.send_to_client(
            &partner,
            ServerMessage::PartnerDisconnected {
                message: PARTNER_DISCONNECTED_MESSAGE.to_string(),
            },
        );
    }

    handle_seek_match(state, conn_id);
}

/// Forward a payload to the other member of the sender's session.
///
/// A sender with no session at all is a protocol race (an event arriving
/// mid-teardown): logged as a warning, payload dropped, nothing surfaced to
/// the caller. A sender whose partner already skipped away still holds a
/// session entry, so that payload is dropped quietly.
fn relay_to_partner(state: &RelayState, conn_id: &str, kind: &str, msg: ServerMessage) {
    match state.relay_target(conn_id) {
        Some(to) => {
            tracing::debug!(from = conn_id, to = to.as_str(), kind = kind, "Relaying");
            state.send_to_client(&to, msg);
        }
        None if state.in_session(conn_id) => {
            tracing::debug!(
                conn = conn_id,
                kind = kind,
                "Partner already left session, dropping payload"
            );
        }
        None => {
            tracing::warn!(
                conn = conn_id,
                kind = kind,
                "Signaling event without an active session"
            );
        }
    }
}
