//! Wire protocol message definitions.
//!
//! The server speaks a simple JSON-over-WebSocket protocol. Signaling
//! payloads (SDP offers/answers, ICE candidates) are opaque to the server —
//! they are forwarded verbatim to the session partner and never interpreted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Client → Server ───────────────────────────────────────────────────────────

/// Messages sent from a client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter matchmaking and wait to be paired with another user.
    SeekMatch,

    /// Skip the current partner and immediately re-enter matchmaking.
    Next,

    /// A chat message for the session partner.
    Chat {
        message: String,
    },

    /// An SDP call offer for the session partner.
    ///
    /// The `kind` field travels with the SDP so the receiving client can hand
    /// the payload straight to its WebRTC stack; the server does not check it.
    CallOffer {
        sdp: String,
        kind: String,
    },

    /// An SDP call answer for the session partner.
    CallAnswer {
        sdp: String,
        kind: String,
    },

    /// An ICE candidate for the session partner.
    IceCandidate {
        candidate: String,
        sdp_media_line_index: u32,
        sdp_media_id: String,
    },

    /// Tell the session partner that the local media stream is ready.
    LocalStreamReady,

    /// Ping to keep connection alive.
    Ping,
}

// ── Server → Client ───────────────────────────────────────────────────────────

/// Messages sent from the server to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Matchmaking could not form a pair; the client stays queued.
    NotEnoughUsers {
        message: String,
    },

    /// The client was paired into a session.
    Matched {
        message: String,
    },

    /// Role assignment for the new session. Exactly one member receives
    /// `initiator: true` and is expected to send the first offer.
    YouAreInitiator {
        initiator: bool,
    },

    /// The session partner disconnected or skipped away.
    PartnerDisconnected {
        message: String,
    },

    /// A chat message relayed from the session partner.
    Chat {
        message: String,
    },

    /// An SDP call offer relayed from the session partner.
    CallOffer {
        sdp: String,
        kind: String,
    },

    /// An SDP call answer relayed from the session partner.
    CallAnswer {
        sdp: String,
        kind: String,
    },

    /// An ICE candidate relayed from the session partner.
    IceCandidate {
        candidate: String,
        sdp_media_line_index: u32,
        sdp_media_id: String,
    },

    /// The session partner's local media stream is ready.
    LocalStreamReady,

    /// Pong response to keep connection alive.
    Pong,

    /// Error response.
    Error {
        message: String,
    },
}

// ── Supporting Types ──────────────────────────────────────────────────────────

/// An active two-party pairing.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// The two member connection ids, in dequeue order.
    pub members: [String; 2],
    /// The member designated to send the first offer (dequeued first).
    pub initiator: String,
    /// When the session was formed.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// The other member of the session, if `conn_id` is a member at all.
    pub fn partner_of(&self, conn_id: &str) -> Option<&str> {
        let [a, b] = &self.members;
        if a == conn_id {
            Some(b)
        } else if b == conn_id {
            Some(a)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_seek_match_serialization() {
        let msg = ClientMessage::SeekMatch;
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"seek_match\""));

        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, ClientMessage::SeekMatch));
    }

    #[test]
    fn test_client_message_call_offer_serialization() {
        let msg = ClientMessage::CallOffer {
            sdp: "v=0...".to_string(),
            kind: "offer".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"call_offer\""));

        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            ClientMessage::CallOffer { sdp, kind } => {
                assert_eq!(sdp, "v=0...");
                assert_eq!(kind, "offer");
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_client_message_ice_candidate_serialization() {
        let msg = ClientMessage::IceCandidate {
            candidate: "candidate:1 1 UDP 2122252543 192.0.2.1 54321 typ host".to_string(),
            sdp_media_line_index: 0,
            sdp_media_id: "0".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"ice_candidate\""));
        assert!(json.contains("sdp_media_line_index"));

        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            ClientMessage::IceCandidate {
                candidate,
                sdp_media_line_index,
                sdp_media_id,
            } => {
                assert!(candidate.starts_with("candidate:"));
                assert_eq!(sdp_media_line_index, 0);
                assert_eq!(sdp_media_id, "0");
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_client_message_rejects_missing_fields() {
        // Shape is validated once at the parse boundary: an offer without an
        // sdp field never reaches the relay.
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"call_offer","kind":"offer"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_message_not_enough_users_serialization() {
        let msg = ServerMessage::NotEnoughUsers {
            message: "Only 1 users online".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"not_enough_users\""));
        assert!(json.contains("Only 1 users online"));
    }

    #[test]
    fn test_server_message_you_are_initiator_serialization() {
        let msg = ServerMessage::YouAreInitiator { initiator: true };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"you_are_initiator\""));
        assert!(json.contains("\"initiator\":true"));
    }

    #[test]
    fn test_server_message_error_serialization() {
        let msg = ServerMessage::Error {
            message: "Something went wrong".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"error\""));
    }

    #[test]
    fn test_session_partner_of() {
        let session = Session {
            id: "s-1".to_string(),
            members: ["conn-a".to_string(), "conn-b".to_string()],
            initiator: "conn-a".to_string(),
            created_at: Utc::now(),
        };

        assert_eq!(session.partner_of("conn-a"), Some("conn-b"));
        assert_eq!(session.partner_of("conn-b"), Some("conn-a"));
        assert_eq!(session.partner_of("conn-c"), None);
    }
}
