//! Chat Repository Implementation
//!
//! PostgreSQL implementation of chat and participant lookups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{Chat, ChatRepository, ChatType};
use crate::shared::error::AppError;

/// PostgreSQL implementation of the ChatRepository.
pub struct PgChatRepository {
    pool: PgPool,
}

impl PgChatRepository {
    /// Creates a new PgChatRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChatRow {
    id: i64,
    chat_type: String,
    name: Option<String>,
    created_by: i64,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Chat>, AppError> {
        let row = sqlx::query_as::<_, ChatRow>(
            r#"
            SELECT id, chat_type, name, created_by, created_at
            FROM chats
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let participants = self.participants(id).await?;

        Ok(Some(Chat {
            id: row.id,
            chat_type: ChatType::from_str(&row.chat_type),
            name: row.name,
            created_by: row.created_by,
            participants,
            created_at: row.created_at,
        }))
    }

    async fn participants(&self, chat_id: i64) -> Result<Vec<i64>, AppError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT user_id
            FROM chat_participants
            WHERE chat_id = $1
            ORDER BY joined_at ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn is_participant(&self, chat_id: i64, user_id: i64) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM chat_participants
                WHERE chat_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
