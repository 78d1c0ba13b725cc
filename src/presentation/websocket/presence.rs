//! Presence Tracker
//!
//! Derives a user's online state from registry transitions and broadcasts
//! them to the sessions of their contacts. Only the edges matter: a second
//! device connecting or the first of two disconnecting changes nothing
//! visible.

use std::sync::Arc;

use chrono::Utc;

use super::events::ServerEvent;
use super::gateway::Gateway;
use crate::domain::UserRepository;
use crate::shared::error::AppError;

pub struct PresenceTracker<U>
where
    U: UserRepository,
{
    gateway: Arc<Gateway>,
    users: Arc<U>,
}

impl<U> PresenceTracker<U>
where
    U: UserRepository,
{
    pub fn new(gateway: Arc<Gateway>, users: Arc<U>) -> Self {
        Self { gateway, users }
    }

    /// A session came up. `first_session` comes from `Gateway::register`,
    /// which decides the transition under the user's entry guard; sampling
    /// the session count here instead would let two concurrent connects both
    /// miss the flip. When true, persist the online flag and notify contacts.
    pub async fn session_opened(&self, user_id: i64, first_session: bool) -> Result<(), AppError> {
        if !first_session {
            return Ok(());
        }

        self.users.set_presence(user_id, true, Utc::now()).await?;
        self.broadcast(
            user_id,
            ServerEvent::PresenceChanged {
                user_id: user_id.to_string(),
                is_online: true,
                last_seen: None,
            },
        )
        .await;
        Ok(())
    }

    /// A session went down. `last_session` comes from the gateway teardown;
    /// when true the user is now offline and contacts learn their last_seen.
    pub async fn session_closed(&self, user_id: i64, last_session: bool) -> Result<(), AppError> {
        if !last_session {
            return Ok(());
        }

        let last_seen = Utc::now();
        self.users.set_presence(user_id, false, last_seen).await?;
        self.broadcast(
            user_id,
            ServerEvent::PresenceChanged {
                user_id: user_id.to_string(),
                is_online: false,
                last_seen: Some(last_seen.to_rfc3339()),
            },
        )
        .await;
        Ok(())
    }

    /// Push a presence event to every connected session of the user's
    /// contacts. Best-effort: a contact lookup failure is logged, never
    /// surfaced, because presence must not break connect or disconnect.
    async fn broadcast(&self, user_id: i64, event: ServerEvent) {
        let contacts = match self.users.contact_ids(user_id).await {
            Ok(contacts) => contacts,
            Err(e) => {
                tracing::warn!(
                    user_id = user_id,
                    error = %e,
                    "Presence broadcast skipped: contact lookup failed"
                );
                return;
            }
        };

        for contact_id in contacts {
            self.gateway.send_to_user(contact_id, event.clone());
        }
    }
}
