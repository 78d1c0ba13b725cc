//! User entity and repository trait.
//!
//! The core only needs the slice of the user document that presence and
//! fan-out depend on: identity, contact list, and online status. Account
//! management lives elsewhere.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Represents a user account as seen by the coordination layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Snowflake ID (primary key)
    pub id: i64,

    /// Unique handle
    pub username: String,

    /// Display name shown in clients
    pub display_name: Option<String>,

    /// Derived from the connection registry; persisted so offline
    /// collaborators (REST, push) can read it
    pub is_online: bool,

    /// Last time the user had an open session
    pub last_seen: Option<DateTime<Utc>>,
}

/// Repository trait for User data access operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by ID.
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    /// User IDs in this user's contact list (presence broadcast targets).
    async fn contact_ids(&self, user_id: i64) -> Result<Vec<i64>, AppError>;

    /// Persist the derived online/offline flag and last-seen timestamp.
    async fn set_presence(
        &self,
        user_id: i64,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<(), AppError>;
}
