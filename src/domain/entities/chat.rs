//! Chat entity and repository trait.
//!
//! Maps to the `chats` and `chat_participants` tables. Participant
//! resolution is the read path the dispatcher uses for its direct-session
//! fallback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Kind of conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    /// One-to-one conversation, exactly two participants
    #[default]
    Direct,
    /// Named group conversation
    Group,
}

impl ChatType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "group" => Self::Group,
            _ => Self::Direct,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

/// Represents a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    /// Snowflake ID (primary key)
    pub id: i64,

    /// Direct or group
    pub chat_type: ChatType,

    /// Group name (None for direct chats)
    pub name: Option<String>,

    /// User who created the chat
    pub created_by: i64,

    /// Participant user IDs
    pub participants: Vec<i64>,

    /// Timestamp when the chat was created
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn is_participant(&self, user_id: i64) -> bool {
        self.participants.contains(&user_id)
    }
}

/// Repository trait for Chat data access operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Find a chat by its Snowflake ID, participants included.
    async fn find_by_id(&self, id: i64) -> Result<Option<Chat>, AppError>;

    /// Participant user IDs for a chat.
    async fn participants(&self, chat_id: i64) -> Result<Vec<i64>, AppError>;

    /// Check whether a user belongs to a chat.
    async fn is_participant(&self, chat_id: i64, user_id: i64) -> Result<bool, AppError>;
}
