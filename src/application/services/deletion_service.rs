//! Deletion Service
//!
//! Two distinct removal paths: per-viewer hides (silent, unlimited) and
//! sender-initiated delete-for-everyone (time-boxed, globally visible
//! tombstone). The two are never confused on the wire.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::domain::{Message, MessageRepository, DELETED_PLACEHOLDER};
use crate::shared::error::AppError;

/// How long after creation a sender may delete for everyone.
pub const DELETE_FOR_EVERYONE_WINDOW_HOURS: i64 = 24;

/// Deletion authority over the durable store.
pub struct DeletionService<M>
where
    M: MessageRepository,
{
    messages: Arc<M>,
}

impl<M> DeletionService<M>
where
    M: MessageRepository,
{
    pub fn new(messages: Arc<M>) -> Self {
        Self { messages }
    }

    /// Hide a message for one viewer only. Idempotent, never broadcast,
    /// no time limit, and invisible to every other participant.
    pub async fn delete_for_me(&self, message_id: i64, user_id: i64) -> Result<(), AppError> {
        if self.messages.find_by_id(message_id).await?.is_none() {
            return Err(AppError::NotFound("Message not found".into()));
        }

        self.messages.hide_for(message_id, user_id).await?;

        tracing::debug!(message_id = message_id, user_id = user_id, "Message hidden for viewer");
        Ok(())
    }

    /// Tombstone a message for all viewers. Sender-only, and only within
    /// the 24-hour window after creation.
    ///
    /// Returns the message with its placeholder content for broadcasting.
    pub async fn delete_for_everyone(
        &self,
        message_id: i64,
        requester_id: i64,
    ) -> Result<Message, AppError> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".into()))?;

        if message.sender_id != requester_id {
            return Err(AppError::PermissionDenied(
                "Only the sender can delete for everyone".into(),
            ));
        }

        let age = Utc::now().signed_duration_since(message.created_at);
        if age > Duration::hours(DELETE_FOR_EVERYONE_WINDOW_HOURS) {
            return Err(AppError::WindowExpired(format!(
                "Delete for everyone is only available for {} hours",
                DELETE_FOR_EVERYONE_WINDOW_HOURS
            )));
        }

        self.messages.mark_deleted(message_id).await?;

        tracing::info!(
            message_id = message_id,
            chat_id = message.chat_id,
            "Message deleted for everyone"
        );

        Ok(Message {
            deleted: true,
            content: DELETED_PLACEHOLDER.to_string(),
            ..message
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MockMessageRepository;
    use pretty_assertions::assert_eq;

    fn repo_with_message(sender_id: i64, age_minutes: i64) -> MockMessageRepository {
        let mut messages = MockMessageRepository::new();
        messages.expect_find_by_id().returning(move |id| {
            Ok(Some(Message {
                id,
                chat_id: 7,
                sender_id,
                content: "original".into(),
                created_at: Utc::now() - Duration::minutes(age_minutes),
                ..Default::default()
            }))
        });
        messages
    }

    #[tokio::test]
    async fn non_sender_is_denied_regardless_of_age() {
        let svc = DeletionService::new(Arc::new(repo_with_message(1, 1)));
        let err = svc.delete_for_everyone(5, 2).await.unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn sender_inside_window_succeeds_with_placeholder() {
        // 23h59m old
        let mut messages = repo_with_message(1, 23 * 60 + 59);
        messages.expect_mark_deleted().returning(|_| Ok(()));

        let svc = DeletionService::new(Arc::new(messages));
        let message = svc.delete_for_everyone(5, 1).await.unwrap();
        assert!(message.deleted);
        assert_eq!(message.content, DELETED_PLACEHOLDER);
    }

    #[tokio::test]
    async fn sender_past_window_gets_window_expired() {
        // Just over 24h old
        let svc = DeletionService::new(Arc::new(repo_with_message(1, 24 * 60 + 1)));
        let err = svc.delete_for_everyone(5, 1).await.unwrap_err();
        assert!(matches!(err, AppError::WindowExpired(_)));
    }

    #[tokio::test]
    async fn delete_for_me_is_idempotent() {
        let mut messages = repo_with_message(1, 1);
        // hide_for is ON CONFLICT DO NOTHING at the storage layer; repeated
        // calls must simply succeed.
        messages.expect_hide_for().times(2).returning(|_, _| Ok(()));

        let svc = DeletionService::new(Arc::new(messages));
        svc.delete_for_me(5, 2).await.unwrap();
        svc.delete_for_me(5, 2).await.unwrap();
    }

    #[tokio::test]
    async fn delete_for_me_missing_message_is_not_found() {
        let mut messages = MockMessageRepository::new();
        messages.expect_find_by_id().returning(|_| Ok(None));

        let svc = DeletionService::new(Arc::new(messages));
        let err = svc.delete_for_me(5, 2).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
