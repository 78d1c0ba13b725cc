//! Reaction Service
//!
//! Enforces "at most one reaction per user per message" with toggle and
//! replace semantics. The read-modify-write sequence (scan, remove, add) is
//! guarded by a per-message lock, so same-message operations from the same
//! user are last-writer-wins while different messages never contend.

use std::sync::Arc;

use crate::domain::{ChatRepository, MessageRepository};
use crate::shared::error::AppError;
use crate::shared::locks::MessageLocks;

/// Result of a react operation. `removed` and `added` are independent so the
/// protocol layer can emit the two broadcast events separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionOutcome {
    /// Chat the message belongs to (broadcast routing)
    pub chat_id: i64,
    /// Emoji removed from the user's previous reaction, if any
    pub removed: Option<String>,
    /// Emoji newly added, None when the call was a pure toggle-off
    pub added: Option<String>,
}

/// Reaction state machine over the durable store.
pub struct ReactionService<M, C>
where
    M: MessageRepository,
    C: ChatRepository,
{
    messages: Arc<M>,
    chats: Arc<C>,
    locks: Arc<MessageLocks>,
}

impl<M, C> ReactionService<M, C>
where
    M: MessageRepository,
    C: ChatRepository,
{
    pub fn new(messages: Arc<M>, chats: Arc<C>, locks: Arc<MessageLocks>) -> Self {
        Self {
            messages,
            chats,
            locks,
        }
    }

    /// Toggle or replace a user's reaction on a message.
    ///
    /// - no prior reaction: add `emoji`
    /// - prior reaction with the same emoji: remove it (toggle-off)
    /// - prior reaction with a different emoji: remove old, add new
    pub async fn react(
        &self,
        message_id: i64,
        user_id: i64,
        emoji: String,
    ) -> Result<ReactionOutcome, AppError> {
        if emoji.is_empty() {
            return Err(AppError::Validation("Emoji must not be empty".into()));
        }

        let _guard = self.locks.acquire(message_id).await;

        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".into()))?;

        if !self.chats.is_participant(message.chat_id, user_id).await? {
            return Err(AppError::PermissionDenied(
                "Not a participant of this chat".into(),
            ));
        }

        let previous = self.messages.find_user_reaction(message_id, user_id).await?;

        let outcome = match previous {
            Some(old) if old == emoji => {
                // Re-tap of the same emoji: pure toggle-off.
                self.messages
                    .remove_reaction(message_id, user_id, &old)
                    .await?;
                ReactionOutcome {
                    chat_id: message.chat_id,
                    removed: Some(old),
                    added: None,
                }
            }
            Some(old) => {
                self.messages
                    .remove_reaction(message_id, user_id, &old)
                    .await?;
                self.messages
                    .add_reaction(message_id, user_id, &emoji)
                    .await?;
                ReactionOutcome {
                    chat_id: message.chat_id,
                    removed: Some(old),
                    added: Some(emoji),
                }
            }
            None => {
                self.messages
                    .add_reaction(message_id, user_id, &emoji)
                    .await?;
                ReactionOutcome {
                    chat_id: message.chat_id,
                    removed: None,
                    added: Some(emoji),
                }
            }
        };

        tracing::debug!(
            message_id = message_id,
            user_id = user_id,
            removed = ?outcome.removed,
            added = ?outcome.added,
            "Reaction updated"
        );

        Ok(outcome)
    }
}
