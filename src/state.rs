//! Shared server state.
//!
//! The connection registry (connection id → outbound channel) lives in a
//! DashMap so the relay path reads it without locking. Everything the
//! matchmaker mutates sits behind its own mutex — see [`crate::matchmaker`].

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::matchmaker::{MatchOutcome, Matchmaker};
use crate::protocol::ServerMessage;

/// Default port to listen on.
const DEFAULT_PORT: u16 = 3000;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// A connected client's sender channel.
pub type ClientSender = mpsc::UnboundedSender<ServerMessage>;

/// Shared server state.
#[derive(Clone, Default)]
pub struct RelayState {
    /// Connection id → sender channel for connected clients.
    /// Inserted at WebSocket upgrade, removed when the socket closes.
    clients: Arc<DashMap<String, ClientSender>>,

    /// Matchmaking core: waiting queue, session table, session records.
    matchmaker: Arc<Matchmaker>,

    /// Server configuration.
    pub config: RelayConfig,
}

impl RelayState {
    /// Create a new server state with the given configuration.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            matchmaker: Arc::new(Matchmaker::new()),
            config,
        }
    }

    // ── Connection Registry ───────────────────────────────────────────────

    /// Register a connection with its sender channel.
    pub fn register_client(&self, conn_id: &str, sender: ClientSender) {
        tracing::info!(conn = conn_id, "Client registered");
        self.clients.insert(conn_id.to_string(), sender);
    }

    /// Unregister a connection when its socket closes.
    pub fn unregister_client(&self, conn_id: &str) {
        tracing::info!(conn = conn_id, "Client unregistered");
        self.clients.remove(conn_id);
    }

    /// Whether a connection is currently reachable. Queried live — a
    /// registered entry whose channel has closed counts as dead, which is
    /// how stale queue entries are detected during the pairing scan.
    pub fn is_live(&self, conn_id: &str) -> bool {
        self.clients
            .get(conn_id)
            .map(|sender| !sender.is_closed())
            .unwrap_or(false)
    }

    /// Send a message to a connected client. Returns true if sent.
    pub fn send_to_client(&self, conn_id: &str, message: ServerMessage) -> bool {
        if let Some(sender) = self.clients.get(conn_id) {
            sender.send(message).is_ok()
        } else {
            false
        }
    }

    /// Number of currently connected clients.
    pub fn online_count(&self) -> usize {
        self.clients.len()
    }

    // ── Matchmaking ───────────────────────────────────────────────────────

    /// Enter matchmaking, binding the registry's live view of connectivity
    /// into the pairing scan.
    pub fn request_match(&self, conn_id: &str) -> MatchOutcome {
        self.matchmaker
            .request_match(conn_id, |id| self.is_live(id))
    }

    /// Resolve the sole relay recipient for a payload from `sender`.
    pub fn relay_target(&self, sender: &str) -> Option<String> {
        self.matchmaker.relay_target(sender)
    }

    /// Whether the connection currently belongs to a session.
    pub fn in_session(&self, conn_id: &str) -> bool {
        self.matchmaker.in_session(conn_id)
    }

    /// Tear down matchmaking state for a disconnecting connection.
    /// Returns the abandoned members to notify.
    pub fn disconnect(&self, conn_id: &str) -> Vec<String> {
        self.matchmaker.disconnect(conn_id)
    }

    /// Leave the current session (skip). Returns the partner to notify.
    pub fn leave_session(&self, conn_id: &str) -> Option<String> {
        self.matchmaker.leave_session(conn_id)
    }

    /// Number of connections waiting for a partner.
    pub fn waiting_count(&self) -> usize {
        self.matchmaker.waiting_count()
    }

    /// Number of active sessions.
    pub fn session_count(&self) -> usize {
        self.matchmaker.session_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RelayConfig {
        RelayConfig { port: 3000 }
    }

    #[test]
    fn test_register_and_unregister_client() {
        let state = RelayState::new(test_config());
        let (tx, _rx) = mpsc::unbounded_channel();

        state.register_client("conn-a", tx);
        assert!(state.is_live("conn-a"));
        assert_eq!(state.online_count(), 1);

        state.unregister_client("conn-a");
        assert!(!state.is_live("conn-a"));
        assert_eq!(state.online_count(), 0);
    }

    #[test]
    fn test_closed_channel_is_not_live() {
        let state = RelayState::new(test_config());
        let (tx, rx) = mpsc::unbounded_channel();

        state.register_client("conn-a", tx);
        drop(rx);

        // Still registered, but no longer reachable.
        assert_eq!(state.online_count(), 1);
        assert!(!state.is_live("conn-a"));
    }

    #[test]
    fn test_send_to_online_client() {
        let state = RelayState::new(test_config());
        let (tx, mut rx) = mpsc::unbounded_channel();

        state.register_client("conn-a", tx);

        assert!(state.send_to_client("conn-a", ServerMessage::Pong));
        let msg = rx.try_recv().unwrap();
        match msg {
            ServerMessage::Pong => {}
            _ => panic!("Expected Pong"),
        }
    }

    #[test]
    fn test_send_to_offline_client_returns_false() {
        let state = RelayState::new(test_config());
        assert!(!state.send_to_client("conn-nobody", ServerMessage::Pong));
    }

    #[test]
    fn test_match_through_state() {
        let state = RelayState::new(test_config());
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();

        state.register_client("conn-a", tx_a);
        state.register_client("conn-b", tx_b);

        let outcome = state.request_match("conn-a");
        assert!(matches!(outcome, MatchOutcome::NotEnough { online: 1 }));

        match state.request_match("conn-b") {
            MatchOutcome::Paired(session) => {
                assert_eq!(session.initiator, "conn-a");
                assert_eq!(state.relay_target("conn-a"), Some("conn-b".to_string()));
            }
            other => panic!("Expected a pair, got {:?}", other),
        }

        assert_eq!(state.session_count(), 1);
        assert_eq!(state.waiting_count(), 0);
    }

    #[test]
    fn test_dead_candidate_skipped_at_scan_time() {
        let state = RelayState::new(test_config());
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let (tx_c, _rx_c) = mpsc::unbounded_channel();

        state.register_client("conn-a", tx_a);
        state.register_client("conn-b", tx_b);
        state.register_client("conn-c", tx_c);

        state.request_match("conn-a");
        drop(rx_a); // "conn-a" drops without a disconnect event

        // The scan discards the stale entry and keeps "conn-b" waiting.
        let outcome = state.request_match("conn-b");
        assert!(matches!(outcome, MatchOutcome::NotEnough { online: 1 }));

        match state.request_match("conn-c") {
            MatchOutcome::Paired(session) => {
                assert_eq!(session.members, ["conn-b".to_string(), "conn-c".to_string()]);
            }
            other => panic!("Expected a pair, got {:?}", other),
        }
    }

    #[test]
    fn test_disconnect_reports_partner() {
        let state = RelayState::new(test_config());
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();

        state.register_client("conn-a", tx_a);
        state.register_client("conn-b", tx_b);
        state.request_match("conn-a");
        state.request_match("conn-b");

        assert_eq!(state.disconnect("conn-a"), vec!["conn-b".to_string()]);
        assert_eq!(state.session_count(), 0);
    }
}
