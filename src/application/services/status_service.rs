//! Status Service
//!
//! Monotonic sent -> delivered -> read transitions. The `read_by` set is the
//! persisted ground truth; aggregation for group display is left to clients.

use std::sync::Arc;

use crate::domain::{ChatRepository, MessageRepository, MessageStatus};
use crate::shared::error::AppError;

/// A status change to broadcast to the sender's sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub chat_id: i64,
    pub message_id: i64,
    pub sender_id: i64,
    pub status: MessageStatus,
    /// The reader whose receipt caused the change (for read transitions)
    pub reader_id: Option<i64>,
}

/// Status transition engine over the durable store.
pub struct StatusService<M, C>
where
    M: MessageRepository,
    C: ChatRepository,
{
    messages: Arc<M>,
    chats: Arc<C>,
}

impl<M, C> StatusService<M, C>
where
    M: MessageRepository,
    C: ChatRepository,
{
    pub fn new(messages: Arc<M>, chats: Arc<C>) -> Self {
        Self { messages, chats }
    }

    /// Record a read receipt for `reader_id`.
    ///
    /// Returns the change to broadcast, or None when nothing changed: the
    /// reader is the sender, or the receipt already existed. Redundant calls
    /// are success, not errors.
    pub async fn mark_read(
        &self,
        message_id: i64,
        reader_id: i64,
    ) -> Result<Option<StatusChange>, AppError> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".into()))?;

        if !self.chats.is_participant(message.chat_id, reader_id).await? {
            return Err(AppError::PermissionDenied(
                "Not a participant of this chat".into(),
            ));
        }

        // Senders are in read_by from creation; a self mark-read is a no-op.
        if message.sender_id == reader_id {
            return Ok(None);
        }

        let newly_added = self.messages.add_read_receipt(message_id, reader_id).await?;
        if !newly_added {
            return Ok(None);
        }

        // Guarded update: never regresses an already-read status.
        self.messages.promote_read(message_id).await?;

        tracing::debug!(
            message_id = message_id,
            reader_id = reader_id,
            "Read receipt recorded"
        );

        Ok(Some(StatusChange {
            chat_id: message.chat_id,
            message_id,
            sender_id: message.sender_id,
            status: MessageStatus::Read,
            reader_id: Some(reader_id),
        }))
    }

    /// Promote a message to delivered after its live push reached at least
    /// one non-sender session. Guarded: a late delivered signal never
    /// overwrites read.
    pub async fn mark_delivered(
        &self,
        message_id: i64,
    ) -> Result<Option<StatusChange>, AppError> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".into()))?;

        if message.status != MessageStatus::Sent {
            return Ok(None);
        }

        self.messages.promote_delivered(message_id).await?;

        Ok(Some(StatusChange {
            chat_id: message.chat_id,
            message_id,
            sender_id: message.sender_id,
            status: MessageStatus::Delivered,
            reader_id: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Message, MockChatRepository, MockMessageRepository};
    use pretty_assertions::assert_eq;

    fn message(id: i64, sender_id: i64, status: MessageStatus) -> Message {
        Message {
            id,
            chat_id: 7,
            sender_id,
            status,
            read_by: vec![sender_id],
            ..Default::default()
        }
    }

    fn member_chats() -> Arc<MockChatRepository> {
        let mut chats = MockChatRepository::new();
        chats.expect_is_participant().returning(|_, _| Ok(true));
        Arc::new(chats)
    }

    #[tokio::test]
    async fn reader_receipt_promotes_to_read() {
        let mut messages = MockMessageRepository::new();
        messages
            .expect_find_by_id()
            .returning(|id| Ok(Some(message(id, 1, MessageStatus::Delivered))));
        messages
            .expect_add_read_receipt()
            .returning(|_, _| Ok(true));
        messages.expect_promote_read().returning(|_| Ok(()));

        let svc = StatusService::new(Arc::new(messages), member_chats());
        let change = svc.mark_read(5, 2).await.unwrap().unwrap();
        assert_eq!(change.status, MessageStatus::Read);
        assert_eq!(change.sender_id, 1);
        assert_eq!(change.reader_id, Some(2));
    }

    #[tokio::test]
    async fn sender_mark_read_is_silent_noop() {
        let mut messages = MockMessageRepository::new();
        messages
            .expect_find_by_id()
            .returning(|id| Ok(Some(message(id, 1, MessageStatus::Sent))));

        let svc = StatusService::new(Arc::new(messages), member_chats());
        assert!(svc.mark_read(5, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_receipt_does_not_rebroadcast() {
        let mut messages = MockMessageRepository::new();
        messages
            .expect_find_by_id()
            .returning(|id| Ok(Some(message(id, 1, MessageStatus::Read))));
        messages
            .expect_add_read_receipt()
            .returning(|_, _| Ok(false));

        let svc = StatusService::new(Arc::new(messages), member_chats());
        assert!(svc.mark_read(5, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn receipt_from_non_participant_is_denied() {
        let mut messages = MockMessageRepository::new();
        messages
            .expect_find_by_id()
            .returning(|id| Ok(Some(message(id, 1, MessageStatus::Delivered))));
        // No receipt may be written for an outsider.
        messages.expect_add_read_receipt().times(0);
        let mut chats = MockChatRepository::new();
        chats
            .expect_is_participant()
            .returning(|_, user| Ok(user != 999));

        let svc = StatusService::new(Arc::new(messages), Arc::new(chats));
        let err = svc.mark_read(5, 999).await.unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn delivered_never_downgrades_read() {
        let mut messages = MockMessageRepository::new();
        messages
            .expect_find_by_id()
            .returning(|id| Ok(Some(message(id, 1, MessageStatus::Read))));
        // promote_delivered must not even be attempted once read.

        let svc = StatusService::new(Arc::new(messages), member_chats());
        assert!(svc.mark_delivered(5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delivered_promotes_sent() {
        let mut messages = MockMessageRepository::new();
        messages
            .expect_find_by_id()
            .returning(|id| Ok(Some(message(id, 1, MessageStatus::Sent))));
        messages.expect_promote_delivered().returning(|_| Ok(()));

        let svc = StatusService::new(Arc::new(messages), member_chats());
        let change = svc.mark_delivered(5).await.unwrap().unwrap();
        assert_eq!(change.status, MessageStatus::Delivered);
    }
}
