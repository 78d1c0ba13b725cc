//! Chat History Handlers
//!
//! REST access to the durable message log. History is per-viewer: rows the
//! caller hid are filtered out entirely, tombstoned rows come back with
//! their placeholder text.

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::application::services::MessageDto;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;

/// History query parameters
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Return messages with IDs strictly below this one
    pub before: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UnreadResponse {
    pub chat_id: String,
    pub unread: i64,
}

/// Get a page of a chat's messages, newest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(chat_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageDto>>, AppError> {
    let chat_id: i64 = chat_id
        .parse()
        .map_err(|_| AppError::Validation("Invalid chat ID".into()))?;
    let before = query
        .before
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| AppError::Validation("Invalid cursor".into()))
        })
        .transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);

    let messages = state
        .messages
        .get_history(chat_id, auth.user_id, before, limit)
        .await?;

    Ok(Json(messages.into_iter().map(MessageDto::from).collect()))
}

/// Count messages the caller has not read in a chat.
pub async fn get_unread(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(chat_id): Path<String>,
) -> Result<Json<UnreadResponse>, AppError> {
    let chat_id: i64 = chat_id
        .parse()
        .map_err(|_| AppError::Validation("Invalid chat ID".into()))?;

    let unread = state.messages.unread_count(chat_id, auth.user_id).await?;

    Ok(Json(UnreadResponse {
        chat_id: chat_id.to_string(),
        unread,
    }))
}
