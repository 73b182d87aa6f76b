//! Matchmaking core.
//!
//! Owns the waiting queue, the session table (connection id → session id),
//! and the session records. All three live behind a single mutex so a
//! connection moves from queue to session atomically: concurrent match
//! requests can never dequeue the same connection into two sessions, and a
//! connection is in at most one of {queue, session} at any instant.
//!
//! The core does no I/O. Liveness is an injected predicate, queried at
//! decision time, so stale queue entries for connections that dropped without
//! a disconnect event are discarded during the pairing scan rather than
//! trusted.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use uuid::Uuid;

use crate::protocol::Session;

/// Result of a match request.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// Two live connections were paired into a new session.
    Paired(Session),

    /// Fewer than two live connections were available. `online` is the
    /// number of connections left waiting, the requester included.
    NotEnough { online: usize },

    /// The requester is already in a session; nothing was changed.
    AlreadyMatched,
}

#[derive(Default)]
struct MatchCore {
    /// FIFO waiting list. A connection id appears at most once.
    queue: VecDeque<String>,

    /// Session table: connection id → session id. Absence means "not in a
    /// session" — there is no sentinel value.
    table: HashMap<String, String>,

    /// Session id → session record.
    sessions: HashMap<String, Session>,
}

/// The matchmaking service. All methods take `&self` and serialize through
/// the internal mutex; none of them block on anything but that lock.
#[derive(Default)]
pub struct Matchmaker {
    core: Mutex<MatchCore>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MatchCore> {
        // Mutations never unwind mid-update, so a poisoned guard is still
        // consistent.
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter `conn_id` into matchmaking and try to form a pair.
    ///
    /// Enqueueing is idempotent by id. The queue is only scanned when it
    /// holds at least two entries; the scan pops from the front, discarding
    /// entries `is_live` rejects, until two live connections are found. A
    /// lone live survivor is re-enqueued instead of being dropped.
    pub fn request_match(&self, conn_id: &str, is_live: impl Fn(&str) -> bool) -> MatchOutcome {
        let mut core = self.lock();

        if core.table.contains_key(conn_id) {
            return MatchOutcome::AlreadyMatched;
        }

        if !core.queue.iter().any(|id| id == conn_id) {
            core.queue.push_back(conn_id.to_string());
        }

        if core.queue.len() < 2 {
            return MatchOutcome::NotEnough {
                online: core.queue.len(),
            };
        }

        let mut live: Vec<String> = Vec::with_capacity(2);
        while live.len() < 2 {
            let Some(candidate) = core.queue.pop_front() else {
                break;
            };
            if is_live(&candidate) {
                live.push(candidate);
            } else {
                tracing::debug!(conn = candidate.as_str(), "Discarding dead queue entry");
            }
        }

        let mut drained = live.into_iter();
        match (drained.next(), drained.next()) {
            (Some(first), Some(second)) => {
                let session = Session {
                    id: Uuid::new_v4().to_string(),
                    members: [first.clone(), second],
                    initiator: first,
                    created_at: Utc::now(),
                };

                core.table
                    .insert(session.members[0].clone(), session.id.clone());
                core.table
                    .insert(session.members[1].clone(), session.id.clone());
                core.sessions.insert(session.id.clone(), session.clone());

                tracing::info!(
                    session_id = session.id.as_str(),
                    initiator = session.members[0].as_str(),
                    responder = session.members[1].as_str(),
                    "Formed session"
                );

                MatchOutcome::Paired(session)
            }
            (Some(survivor), None) => {
                core.queue.push_back(survivor);
                MatchOutcome::NotEnough {
                    online: core.queue.len(),
                }
            }
            _ => MatchOutcome::NotEnough {
                online: core.queue.len(),
            },
        }
    }

    /// Whether the connection currently holds a session-table entry.
    pub fn in_session(&self, conn_id: &str) -> bool {
        self.lock().table.contains_key(conn_id)
    }

    /// Resolve the sole relay recipient for a payload sent by `sender`.
    ///
    /// Returns the other session member, and only while that member's own
    /// table entry still points at the same session — a partner that skipped
    /// away no longer receives anything, even though the sender's entry
    /// lingers until they skip or disconnect themselves.
    pub fn relay_target(&self, sender: &str) -> Option<String> {
        let core = self.lock();
        let session_id = core.table.get(sender)?;
        let session = core.sessions.get(session_id)?;
        let partner = session.partner_of(sender)?;
        if core.table.get(partner) == Some(session_id) {
            Some(partner.to_string())
        } else {
            None
        }
    }

    /// Tear down all matchmaking state for a disconnecting connection.
    ///
    /// Removes any queue entry, then purges every session-table entry that
    /// maps to the connection's session — a full-session sweep, not a
    /// targeted delete, so an inconsistent table can never keep a dangling
    /// mapping alive. Returns the other purged members to notify (normally
    /// one, the partner).
    pub fn disconnect(&self, conn_id: &str) -> Vec<String> {
        let mut core = self.lock();

        core.queue.retain(|id| id != conn_id);

        let Some(session_id) = core.table.get(conn_id).cloned() else {
            return Vec::new();
        };

        let purged: Vec<String> = core
            .table
            .iter()
            .filter(|(_, mapped)| **mapped == session_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &purged {
            core.table.remove(id);
        }
        core.sessions.remove(&session_id);

        tracing::info!(
            conn = conn_id,
            session_id = session_id.as_str(),
            "Session torn down on disconnect"
        );

        purged.into_iter().filter(|id| id != conn_id).collect()
    }

    /// Leave the current session without disconnecting (the "next" flow).
    ///
    /// Only the leaver's own table entry is removed; the session record is
    /// dropped once no table entry references it. Returns the partner to
    /// notify, if they are still in the session.
    pub fn leave_session(&self, conn_id: &str) -> Option<String> {
        let mut core = self.lock();

        let session_id = core.table.remove(conn_id)?;
        let partner = core
            .sessions
            .get(&session_id)
            .and_then(|s| s.partner_of(conn_id))
            .map(str::to_string)
            .filter(|p| core.table.get(p) == Some(&session_id));

        if !core.table.values().any(|mapped| *mapped == session_id) {
            core.sessions.remove(&session_id);
        }

        tracing::info!(
            conn = conn_id,
            session_id = session_id.as_str(),
            "Left session"
        );

        partner
    }

    /// Number of connections currently waiting for a partner.
    pub fn waiting_count(&self) -> usize {
        self.lock().queue.len()
    }

    /// Number of active sessions.
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }
}
