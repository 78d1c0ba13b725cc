//! WebSocket Gateway
//!
//! Connection registry and room membership: maps user identity to active
//! session handles (multi-device) and chats to the sessions subscribed to
//! their live events. All state here is process-local and ephemeral; it is
//! rebuilt by clients reconnecting and rejoining rooms after a restart.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::events::ServerEvent;
use crate::infrastructure::metrics;

/// One authenticated live connection.
pub struct ConnectedSession {
    pub session_id: String,
    pub user_id: i64,
    pub connected_at: DateTime<Utc>,
    pub sender: mpsc::UnboundedSender<ServerEvent>,
}

/// What `unregister` leaves behind for cleanup: the owning user, the rooms
/// the session was joined to (a snapshot, safe to iterate), and whether the
/// user now has zero remaining sessions.
#[derive(Debug)]
pub struct SessionTeardown {
    pub user_id: i64,
    pub joined_chats: Vec<i64>,
    pub last_session: bool,
}

/// WebSocket gateway managing all connections and room subscriptions.
pub struct Gateway {
    /// Active sessions by session_id
    sessions: DashMap<String, Arc<ConnectedSession>>,
    /// User ID to session IDs (one user can have multiple sessions)
    user_sessions: DashMap<i64, Vec<String>>,
    /// Chat ID to joined session IDs
    room_sessions: DashMap<i64, HashSet<String>>,
    /// Session ID to joined chat IDs (reverse index for teardown)
    session_rooms: DashMap<String, HashSet<i64>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            user_sessions: DashMap::new(),
            room_sessions: DashMap::new(),
            session_rooms: DashMap::new(),
        }
    }

    /// Register a new connected session. Idempotent: re-registering an
    /// existing session_id is a no-op.
    ///
    /// Returns true when this is the user's first live session, decided
    /// under the user's entry guard so two devices connecting at once see
    /// exactly one first. Symmetric with `SessionTeardown::last_session`.
    pub fn register(
        &self,
        session_id: String,
        user_id: i64,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }

        let session = Arc::new(ConnectedSession {
            session_id: session_id.clone(),
            user_id,
            connected_at: Utc::now(),
            sender,
        });

        self.sessions.insert(session_id.clone(), session);
        let first_session = {
            let mut sessions = self.user_sessions.entry(user_id).or_default();
            sessions.push(session_id.clone());
            sessions.len() == 1
        };

        metrics::SESSIONS_ACTIVE.inc();

        tracing::info!(
            user_id = user_id,
            session_id = %session_id,
            first_session = first_session,
            "Session registered"
        );

        first_session
    }

    /// Unregister a session and detach it from every room it had joined.
    ///
    /// Room membership is captured as a snapshot before any mutation, so a
    /// burst of simultaneous disconnects (e.g. a restart) never iterates a
    /// structure it is mutating. Returns None for unknown sessions.
    pub fn unregister(&self, session_id: &str) -> Option<SessionTeardown> {
        let (_, session) = self.sessions.remove(session_id)?;

        let joined_chats: Vec<i64> = self
            .session_rooms
            .remove(session_id)
            .map(|(_, rooms)| rooms.into_iter().collect())
            .unwrap_or_default();

        for chat_id in &joined_chats {
            if let Some(mut room) = self.room_sessions.get_mut(chat_id) {
                room.remove(session_id);
            }
        }

        let last_session = {
            let mut remaining = self.user_sessions.entry(session.user_id).or_default();
            remaining.retain(|s| s != session_id);
            remaining.is_empty()
        };
        if last_session {
            self.user_sessions.remove(&session.user_id);
        }

        metrics::SESSIONS_ACTIVE.dec();

        tracing::info!(
            user_id = session.user_id,
            session_id = %session_id,
            last_session = last_session,
            "Session unregistered"
        );

        Some(SessionTeardown {
            user_id: session.user_id,
            joined_chats,
            last_session,
        })
    }

    /// Subscribe a session to a chat's live events.
    pub fn join(&self, session_id: &str, chat_id: i64) {
        if !self.sessions.contains_key(session_id) {
            return;
        }
        self.room_sessions
            .entry(chat_id)
            .or_default()
            .insert(session_id.to_string());
        self.session_rooms
            .entry(session_id.to_string())
            .or_default()
            .insert(chat_id);
    }

    /// Unsubscribe a session from a chat's live events.
    pub fn leave(&self, session_id: &str, chat_id: i64) {
        if let Some(mut room) = self.room_sessions.get_mut(&chat_id) {
            room.remove(session_id);
        }
        if let Some(mut rooms) = self.session_rooms.get_mut(session_id) {
            rooms.remove(&chat_id);
        }
    }

    /// Snapshot of the sessions currently joined to a chat.
    pub fn sessions_for(&self, chat_id: i64) -> Vec<String> {
        self.room_sessions
            .get(&chat_id)
            .map(|room| room.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of a user's session IDs.
    pub fn sessions_of_user(&self, user_id: i64) -> Vec<String> {
        self.user_sessions
            .get(&user_id)
            .map(|sessions| sessions.clone())
            .unwrap_or_default()
    }

    /// The user owning a session, if it is still connected.
    pub fn user_of_session(&self, session_id: &str) -> Option<i64> {
        self.sessions.get(session_id).map(|s| s.user_id)
    }

    /// Check if user is online (has at least one session).
    pub fn is_user_online(&self, user_id: i64) -> bool {
        self.user_sessions
            .get(&user_id)
            .map(|sessions| !sessions.is_empty())
            .unwrap_or(false)
    }

    /// Send an event to one session. Returns false when the session is gone;
    /// the caller decides whether that drop is worth logging.
    pub fn send_to_session(&self, session_id: &str, event: ServerEvent) -> bool {
        let name = event.event_name();
        let Some(session) = self.sessions.get(session_id) else {
            metrics::record_dropped(name);
            return false;
        };
        let sent = session.sender.send(event).is_ok();
        if sent {
            metrics::record_dispatch(name);
        } else {
            metrics::record_dropped(name);
        }
        sent
    }

    /// Send an event to every session of a user. Best-effort; returns how
    /// many sessions were reached.
    pub fn send_to_user(&self, user_id: i64, event: ServerEvent) -> usize {
        let mut delivered = 0;
        for session_id in self.sessions_of_user(user_id) {
            if let Some(session) = self.sessions.get(&session_id) {
                if session.sender.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        if delivered > 0 {
            metrics::record_dispatch(event.event_name());
        }
        delivered
    }

    /// Send an event to every session joined to a chat, optionally skipping
    /// one session (the originator, to avoid echo).
    pub fn send_to_room(&self, chat_id: i64, event: ServerEvent, skip: Option<&str>) -> usize {
        let mut delivered = 0;
        for session_id in self.sessions_for(chat_id) {
            if skip == Some(session_id.as_str()) {
                continue;
            }
            if let Some(session) = self.sessions.get(&session_id) {
                if session.sender.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            } else {
                metrics::record_dropped(event.event_name());
                tracing::debug!(
                    session_id = %session_id,
                    event = event.event_name(),
                    "Delivery dropped: session gone"
                );
            }
        }
        if delivered > 0 {
            metrics::record_dispatch(event.event_name());
        }
        delivered
    }

    /// Get session count
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}
