//! Message Repository Implementation
//!
//! PostgreSQL implementation of message persistence. Reactions, read
//! receipts, and per-viewer hides are stored as side tables with composite
//! primary keys, so single-field mutations are atomic `INSERT ON CONFLICT`
//! or guarded `UPDATE` statements rather than read-modify-write cycles.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{Message, MessageRepository, MessageStatus, DELETED_PLACEHOLDER};
use crate::shared::error::AppError;

/// PostgreSQL implementation of the MessageRepository.
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Creates a new PgMessageRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load reactions and read receipts for a batch of messages.
    async fn hydrate(&self, rows: Vec<MessageRow>) -> Result<Vec<Message>, AppError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

        let reaction_rows: Vec<(i64, i64, String)> = sqlx::query_as(
            r#"
            SELECT message_id, user_id, emoji
            FROM message_reactions
            WHERE message_id = ANY($1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let read_rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT message_id, user_id
            FROM message_reads
            WHERE message_id = ANY($1)
            ORDER BY read_at ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut reactions: HashMap<i64, HashMap<String, Vec<i64>>> = HashMap::new();
        for (message_id, user_id, emoji) in reaction_rows {
            reactions
                .entry(message_id)
                .or_default()
                .entry(emoji)
                .or_default()
                .push(user_id);
        }

        let mut reads: HashMap<i64, Vec<i64>> = HashMap::new();
        for (message_id, user_id) in read_rows {
            reads.entry(message_id).or_default().push(user_id);
        }

        Ok(rows
            .into_iter()
            .map(|r| {
                let mut message = r.into_message();
                message.reactions = reactions.remove(&message.id).unwrap_or_default();
                message.read_by = reads.remove(&message.id).unwrap_or_default();
                message
            })
            .collect())
    }
}

/// Main-table row, before side tables are aggregated.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    chat_id: i64,
    sender_id: i64,
    content: String,
    status: String,
    deleted: bool,
    edited_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_message(self) -> Message {
        Message {
            id: self.id,
            chat_id: self.chat_id,
            sender_id: self.sender_id,
            content: self.content,
            status: MessageStatus::from_str(&self.status),
            read_by: Vec::new(),
            reactions: HashMap::new(),
            deleted: self.deleted,
            edited_at: self.edited_at,
            created_at: self.created_at,
        }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, chat_id, sender_id, content, status, deleted, edited_at, created_at
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Persist a new message together with the sender's implicit read
    /// receipt, in one transaction.
    async fn create(&self, message: &Message) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, chat_id, sender_id, content, status, deleted, created_at)
            VALUES ($1, $2, $3, $4, $5, FALSE, $6)
            "#,
        )
        .bind(message.id)
        .bind(message.chat_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.status.as_str())
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(message.id)
        .bind(message.sender_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Messages hidden for the viewer are excluded from the result set
    /// entirely, independent of the global `deleted` flag.
    async fn find_by_chat(
        &self,
        chat_id: i64,
        viewer_id: i64,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, AppError> {
        let limit = limit.clamp(1, 100);

        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.id, m.chat_id, m.sender_id, m.content, m.status,
                   m.deleted, m.edited_at, m.created_at
            FROM messages m
            WHERE m.chat_id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM message_hides h
                  WHERE h.message_id = m.id AND h.user_id = $2
              )
              AND ($3::BIGINT IS NULL OR m.id < $3)
            ORDER BY m.id DESC
            LIMIT $4
            "#,
        )
        .bind(chat_id)
        .bind(viewer_id)
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn unread_count(&self, chat_id: i64, viewer_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages m
            WHERE m.chat_id = $1
              AND m.sender_id <> $2
              AND m.deleted = FALSE
              AND NOT EXISTS (
                  SELECT 1 FROM message_reads r
                  WHERE r.message_id = m.id AND r.user_id = $2
              )
              AND NOT EXISTS (
                  SELECT 1 FROM message_hides h
                  WHERE h.message_id = m.id AND h.user_id = $2
              )
            "#,
        )
        .bind(chat_id)
        .bind(viewer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn set_edited(&self, id: i64, content: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE messages
            SET content = $2, edited_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(content)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_deleted(&self, id: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE messages
            SET deleted = TRUE, content = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(DELETED_PLACEHOLDER)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn hide_for(&self, id: i64, user_id: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO message_hides (message_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_reaction(&self, id: i64, user_id: i64, emoji: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO message_reactions (message_id, user_id, emoji)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id, user_id, emoji) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(emoji)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_reaction(&self, id: i64, user_id: i64, emoji: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            DELETE FROM message_reactions
            WHERE message_id = $1 AND user_id = $2 AND emoji = $3
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(emoji)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_user_reaction(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<String>, AppError> {
        let emoji: Option<String> = sqlx::query_scalar(
            r#"
            SELECT emoji
            FROM message_reactions
            WHERE message_id = $1 AND user_id = $2
            LIMIT 1
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(emoji)
    }

    async fn add_read_receipt(&self, id: i64, user_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn promote_delivered(&self, id: i64) -> Result<(), AppError> {
        // Guarded so a late delivered signal never downgrades read.
        sqlx::query(
            r#"
            UPDATE messages
            SET status = 'delivered'
            WHERE id = $1 AND status = 'sent'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn promote_read(&self, id: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = 'read'
            WHERE id = $1 AND status <> 'read'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
