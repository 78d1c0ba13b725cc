//! Message Dispatcher
//!
//! Resolves the live delivery set for chat-scoped events: sessions joined to
//! the room, plus every session of participants who are connected but not
//! joined anywhere in the room. The union is deduplicated so one session
//! never receives the same event twice.

use std::collections::HashSet;
use std::sync::Arc;

use super::events::ServerEvent;
use super::gateway::Gateway;

/// The result of one fan-out.
#[derive(Debug, Default)]
pub struct DispatchSummary {
    /// Target sessions resolved before sending
    pub attempted: usize,
    /// Sessions the event actually reached
    pub delivered: usize,
    /// Distinct users among the reached sessions
    pub recipients: HashSet<i64>,
}

impl DispatchSummary {
    /// True when the push reached at least one session of someone other
    /// than `sender_id`.
    pub fn reached_other_than(&self, sender_id: i64) -> bool {
        self.recipients.iter().any(|id| *id != sender_id)
    }
}

pub struct MessageDispatcher {
    gateway: Arc<Gateway>,
}

impl MessageDispatcher {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// The session IDs an event for `chat_id` should reach, given the chat's
    /// participants. Room subscribers come first; participants with no
    /// session in the room fall back to all of their direct sessions.
    pub fn resolve_targets(&self, chat_id: i64, participants: &[i64]) -> Vec<String> {
        let mut targets: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let room = self.gateway.sessions_for(chat_id);
        let mut users_in_room: HashSet<i64> = HashSet::new();
        for session_id in room {
            if let Some(user_id) = self.gateway.user_of_session(&session_id) {
                users_in_room.insert(user_id);
            }
            if seen.insert(session_id.clone()) {
                targets.push(session_id);
            }
        }

        for participant in participants {
            if users_in_room.contains(participant) {
                continue;
            }
            for session_id in self.gateway.sessions_of_user(*participant) {
                if seen.insert(session_id.clone()) {
                    targets.push(session_id);
                }
            }
        }

        targets
    }

    /// Fan an event out to the chat's delivery set. Undeliverable sessions
    /// are counted and logged, never surfaced.
    pub fn dispatch(
        &self,
        chat_id: i64,
        participants: &[i64],
        event: ServerEvent,
    ) -> DispatchSummary {
        let targets = self.resolve_targets(chat_id, participants);
        let mut summary = DispatchSummary {
            attempted: targets.len(),
            ..Default::default()
        };

        for session_id in &targets {
            let user_id = self.gateway.user_of_session(session_id);
            if self.gateway.send_to_session(session_id, event.clone()) {
                summary.delivered += 1;
                if let Some(user_id) = user_id {
                    summary.recipients.insert(user_id);
                }
            } else {
                // send_to_session already counted the drop.
                tracing::debug!(
                    chat_id = chat_id,
                    session_id = %session_id,
                    event = event.event_name(),
                    "Delivery dropped"
                );
            }
        }

        tracing::debug!(
            chat_id = chat_id,
            event = event.event_name(),
            attempted = summary.attempted,
            delivered = summary.delivered,
            "Event dispatched"
        );

        summary
    }
}
