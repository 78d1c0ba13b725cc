//! User Repository Implementation
//!
//! PostgreSQL implementation of the user slice the coordination layer needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{User, UserRepository};
use crate::shared::error::AppError;

/// PostgreSQL implementation of the UserRepository.
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Creates a new PgUserRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    display_name: Option<String>,
    is_online: bool,
    last_seen: Option<DateTime<Utc>>,
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, display_name, is_online, last_seen
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| User {
            id: r.id,
            username: r.username,
            display_name: r.display_name,
            is_online: r.is_online,
            last_seen: r.last_seen,
        }))
    }

    async fn contact_ids(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT contact_id
            FROM user_contacts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn set_presence(
        &self,
        user_id: i64,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET is_online = $2, last_seen = $3
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(is_online)
        .bind(last_seen)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
