//! Message Service
//!
//! Send, edit, and history retrieval. Persists first; fan-out to live
//! sessions happens afterwards at the gateway and never rolls back a write.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::domain::{ChatRepository, Message, MessageRepository, MessageStatus};
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeGenerator;

/// Maximum message content length in characters.
pub const MAX_CONTENT_LENGTH: usize = 4000;

/// Wire representation of a message (snowflakes as strings).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageDto {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub status: MessageStatus,
    pub read_by: Vec<String>,
    pub reactions: HashMap<String, Vec<String>>,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<String>,
    pub created_at: String,
}

impl From<Message> for MessageDto {
    fn from(message: Message) -> Self {
        Self {
            id: message.id.to_string(),
            chat_id: message.chat_id.to_string(),
            sender_id: message.sender_id.to_string(),
            content: message.content,
            status: message.status,
            read_by: message.read_by.iter().map(|id| id.to_string()).collect(),
            reactions: message
                .reactions
                .into_iter()
                .map(|(emoji, users)| {
                    (emoji, users.iter().map(|id| id.to_string()).collect())
                })
                .collect(),
            deleted: message.deleted,
            edited_at: message.edited_at.map(|t| t.to_rfc3339()),
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

/// Message operations over the durable store.
pub struct MessageService<M, C>
where
    M: MessageRepository,
    C: ChatRepository,
{
    messages: Arc<M>,
    chats: Arc<C>,
    id_generator: Arc<SnowflakeGenerator>,
}

impl<M, C> MessageService<M, C>
where
    M: MessageRepository,
    C: ChatRepository,
{
    pub fn new(messages: Arc<M>, chats: Arc<C>, id_generator: Arc<SnowflakeGenerator>) -> Self {
        Self {
            messages,
            chats,
            id_generator,
        }
    }

    /// Persist a new message in a chat the sender belongs to.
    ///
    /// The sender is recorded in `read_by` immediately; status starts at
    /// `sent` until the live push reaches a recipient.
    pub async fn send_message(
        &self,
        chat_id: i64,
        sender_id: i64,
        content: String,
    ) -> Result<Message, AppError> {
        if content.is_empty() || content.chars().count() > MAX_CONTENT_LENGTH {
            return Err(AppError::Validation(format!(
                "Content must be 1..={} characters",
                MAX_CONTENT_LENGTH
            )));
        }

        if self.chats.find_by_id(chat_id).await?.is_none() {
            return Err(AppError::NotFound("Chat not found".into()));
        }
        if !self.chats.is_participant(chat_id, sender_id).await? {
            return Err(AppError::PermissionDenied(
                "Not a participant of this chat".into(),
            ));
        }

        let message = Message {
            id: self.id_generator.generate(),
            chat_id,
            sender_id,
            content,
            status: MessageStatus::Sent,
            read_by: vec![sender_id],
            created_at: Utc::now(),
            ..Default::default()
        };

        self.messages.create(&message).await?;

        tracing::debug!(
            message_id = message.id,
            chat_id = chat_id,
            sender_id = sender_id,
            "Message persisted"
        );

        Ok(message)
    }

    /// Fetch chat history as seen by `viewer_id`, newest first.
    ///
    /// Messages the viewer deleted for themselves are excluded entirely;
    /// messages deleted for everyone appear with their placeholder content.
    pub async fn get_history(
        &self,
        chat_id: i64,
        viewer_id: i64,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, AppError> {
        if self.chats.find_by_id(chat_id).await?.is_none() {
            return Err(AppError::NotFound("Chat not found".into()));
        }
        if !self.chats.is_participant(chat_id, viewer_id).await? {
            return Err(AppError::PermissionDenied(
                "Not a participant of this chat".into(),
            ));
        }

        self.messages
            .find_by_chat(chat_id, viewer_id, before, limit)
            .await
    }

    /// Count messages the viewer has not read yet.
    pub async fn unread_count(&self, chat_id: i64, viewer_id: i64) -> Result<i64, AppError> {
        if !self.chats.is_participant(chat_id, viewer_id).await? {
            return Err(AppError::PermissionDenied(
                "Not a participant of this chat".into(),
            ));
        }
        self.messages.unread_count(chat_id, viewer_id).await
    }

    /// Edit a message's content. Sender-only.
    pub async fn edit_message(
        &self,
        message_id: i64,
        editor_id: i64,
        content: String,
    ) -> Result<Message, AppError> {
        if content.is_empty() || content.chars().count() > MAX_CONTENT_LENGTH {
            return Err(AppError::Validation(format!(
                "Content must be 1..={} characters",
                MAX_CONTENT_LENGTH
            )));
        }

        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".into()))?;

        if message.sender_id != editor_id {
            return Err(AppError::PermissionDenied(
                "Can only edit your own messages".into(),
            ));
        }
        if message.deleted {
            return Err(AppError::InvalidState("Message was deleted".into()));
        }

        self.messages.set_edited(message_id, &content).await?;

        Ok(Message {
            content,
            edited_at: Some(Utc::now()),
            ..message
        })
    }
}
