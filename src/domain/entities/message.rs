//! Message entity and repository trait.
//!
//! Maps to the `messages` table plus its side tables (`message_reactions`,
//! `message_reads`, `message_hides`). The durable store is the source of
//! truth; live pushes are fire-and-forget on top of it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Content shown in place of a message removed for everyone.
pub const DELETED_PLACEHOLDER: &str = "This message was deleted";

/// Delivery status of a message. Transitions are monotonic:
/// sent -> delivered -> read, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Persisted, no recipient session reached yet
    #[default]
    Sent,
    /// Pushed to at least one recipient session
    Delivered,
    /// Read by at least one non-sender participant
    Read,
}

impl MessageStatus {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Self {
        match s {
            "delivered" => Self::Delivered,
            "read" => Self::Read,
            _ => Self::Sent,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents a message in a chat.
///
/// Maps to the `messages` table:
/// - id: BIGINT PRIMARY KEY (Snowflake ID)
/// - chat_id: BIGINT NOT NULL REFERENCES chats(id)
/// - sender_id: BIGINT NOT NULL REFERENCES users(id)
/// - content: TEXT NOT NULL (max 4000 characters)
/// - status: message_status NOT NULL DEFAULT 'sent'
/// - deleted: BOOLEAN NOT NULL DEFAULT FALSE
/// - edited_at: TIMESTAMPTZ NULL
/// - created_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
///
/// `read_by` and `reactions` aggregate the `message_reads` and
/// `message_reactions` side tables. Per-viewer hides live in `message_hides`
/// and are applied as a read-time filter, never loaded onto the entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Snowflake ID (primary key)
    pub id: i64,

    /// Chat this message belongs to
    pub chat_id: i64,

    /// Sender user ID
    pub sender_id: i64,

    /// Message content (placeholder text once deleted for everyone)
    pub content: String,

    /// Monotonic delivery status
    pub status: MessageStatus,

    /// Users who have read this message (includes the sender)
    pub read_by: Vec<i64>,

    /// Emoji -> users who reacted with it. A user appears under at most
    /// one emoji at any time.
    pub reactions: HashMap<String, Vec<i64>>,

    /// Whether the sender removed this message for everyone
    pub deleted: bool,

    /// Timestamp of the last edit (None if never edited)
    pub edited_at: Option<DateTime<Utc>>,

    /// Timestamp when the message was sent
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Check if this message has been edited.
    pub fn is_edited(&self) -> bool {
        self.edited_at.is_some()
    }

    /// Check whether a user has read this message.
    pub fn is_read_by(&self, user_id: i64) -> bool {
        self.read_by.contains(&user_id)
    }

    /// The emoji a user currently has on this message, if any.
    pub fn reaction_of(&self, user_id: i64) -> Option<&str> {
        self.reactions
            .iter()
            .find(|(_, users)| users.contains(&user_id))
            .map(|(emoji, _)| emoji.as_str())
    }
}

impl Default for Message {
    fn default() -> Self {
        Self {
            id: 0,
            chat_id: 0,
            sender_id: 0,
            content: String::new(),
            status: MessageStatus::default(),
            read_by: Vec::new(),
            reactions: HashMap::new(),
            deleted: false,
            edited_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Repository trait for Message data access operations.
///
/// Mutating operations are atomic at the database level (`ON CONFLICT DO
/// NOTHING`, guarded `UPDATE`s) so callers never need read-modify-write
/// cycles for single-field changes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Find a message by its Snowflake ID.
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError>;

    /// Persist a new message.
    async fn create(&self, message: &Message) -> Result<(), AppError>;

    /// Find messages in a chat as seen by `viewer_id`, newest first.
    ///
    /// Messages hidden for the viewer (delete-for-me) are excluded from the
    /// result entirely. Keyset pagination via `before`.
    async fn find_by_chat(
        &self,
        chat_id: i64,
        viewer_id: i64,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, AppError>;

    /// Count messages in a chat the viewer has not read (excluding their own
    /// and globally deleted ones).
    async fn unread_count(&self, chat_id: i64, viewer_id: i64) -> Result<i64, AppError>;

    /// Replace content and stamp `edited_at`.
    async fn set_edited(&self, id: i64, content: &str) -> Result<(), AppError>;

    /// Tombstone the message for everyone: set `deleted` and replace the
    /// content with the placeholder.
    async fn mark_deleted(&self, id: i64) -> Result<(), AppError>;

    /// Hide the message for one viewer. Idempotent.
    async fn hide_for(&self, id: i64, user_id: i64) -> Result<(), AppError>;

    /// Add a reaction. Idempotent for the same (message, user, emoji).
    async fn add_reaction(&self, id: i64, user_id: i64, emoji: &str) -> Result<(), AppError>;

    /// Remove a reaction. Silently succeeds if absent.
    async fn remove_reaction(&self, id: i64, user_id: i64, emoji: &str) -> Result<(), AppError>;

    /// The emoji this user currently has on the message, if any.
    async fn find_user_reaction(&self, id: i64, user_id: i64)
        -> Result<Option<String>, AppError>;

    /// Record a read receipt. Returns true iff the receipt was newly added.
    async fn add_read_receipt(&self, id: i64, user_id: i64) -> Result<bool, AppError>;

    /// Promote status to delivered. No-op unless the current status is sent.
    async fn promote_delivered(&self, id: i64) -> Result<(), AppError>;

    /// Promote status to read. No-op if already read; never regresses.
    async fn promote_read(&self, id: i64) -> Result<(), AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("sent", MessageStatus::Sent)]
    #[test_case("delivered", MessageStatus::Delivered)]
    #[test_case("read", MessageStatus::Read)]
    #[test_case("garbage", MessageStatus::Sent; "unknown falls back to sent")]
    fn status_parses_from_database_strings(raw: &str, expected: MessageStatus) {
        assert_eq!(MessageStatus::from_str(raw), expected);
    }

    #[test]
    fn status_ordering_is_monotonic() {
        assert!(MessageStatus::Sent < MessageStatus::Delivered);
        assert!(MessageStatus::Delivered < MessageStatus::Read);
    }

    #[test]
    fn reaction_of_finds_the_single_emoji() {
        let mut message = Message::default();
        message.reactions.insert("👍".into(), vec![1, 2]);
        message.reactions.insert("❤️".into(), vec![3]);

        assert_eq!(message.reaction_of(3), Some("❤️"));
        assert_eq!(message.reaction_of(4), None);
    }
}
