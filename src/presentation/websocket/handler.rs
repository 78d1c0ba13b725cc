//! WebSocket Connection Handler
//!
//! One task per connection: identify with a JWT, register with the gateway,
//! then translate client events into service calls and fan the resulting
//! server events out. Teardown clears room membership, typing state and
//! presence in that order.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, Stream, StreamExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;
use validator::Validate;

use super::events::{ClientEvent, ReactionAction, ServerEvent};
use crate::application::services::MessageDto;
use crate::domain::{ChatRepository, UserRepository};
use crate::shared::error::AppError;
use crate::startup::AppState;

/// JWT claims for token validation
#[derive(Debug, serde::Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: i64,
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let ws = ws
        .max_message_size(state.settings.websocket.max_message_size)
        .max_frame_size(state.settings.websocket.max_frame_size);
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle one WebSocket connection from accept to teardown.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    tracing::debug!(session_id = %session_id, "New WebSocket connection");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Forward queued server events to the socket.
    let writer_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize event");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // First frame must be an identify, within the configured window.
    let identify_timeout = Duration::from_secs(state.settings.websocket.identify_timeout_secs);
    let token = match timeout(identify_timeout, await_identify(&mut stream)).await {
        Ok(Some(token)) => token,
        Ok(None) => {
            tracing::debug!(session_id = %session_id, "Connection closed before identify");
            writer_task.abort();
            return;
        }
        Err(_) => {
            tracing::debug!(session_id = %session_id, "Identify timeout");
            let _ = tx.send(ServerEvent::Error {
                code: AppError::Unauthorized(String::new()).code(),
                message: "Identify timeout".into(),
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer_task.abort();
            return;
        }
    };

    let user = match authenticate(&token, &state).await {
        Ok(user) => user,
        Err(e) => {
            tracing::debug!(session_id = %session_id, error = %e, "Identify rejected");
            let _ = tx.send(ServerEvent::Error {
                code: e.code(),
                message: "Authentication failed".into(),
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer_task.abort();
            return;
        }
    };

    let first_session = state
        .gateway
        .register(session_id.clone(), user.id, tx.clone());

    let _ = tx.send(ServerEvent::Ready {
        session_id: session_id.clone(),
        user_id: user.id.to_string(),
        username: user.username.clone(),
    });

    if let Err(e) = state.presence.session_opened(user.id, first_session).await {
        tracing::warn!(user_id = user.id, error = %e, "Presence update failed on connect");
    }

    tracing::info!(
        user_id = user.id,
        session_id = %session_id,
        "User connected and identified"
    );

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let event = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        let _ = tx.send(ServerEvent::Error {
                            code: AppError::Validation(String::new()).code(),
                            message: format!("Malformed event: {}", e),
                        });
                        continue;
                    }
                };
                if let Err(e) = dispatch_client_event(event, user.id, &session_id, &state).await {
                    // Redundant transitions are success from the client's
                    // point of view and produce no event at all.
                    if matches!(e, AppError::InvalidState(_)) {
                        continue;
                    }
                    let _ = tx.send(ServerEvent::Error {
                        code: e.code(),
                        message: e.to_string(),
                    });
                }
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(session_id = %session_id, "Connection closed");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Pong is handled automatically by axum
            }
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    teardown(&session_id, &state).await;
    writer_task.abort();

    tracing::info!(
        user_id = user.id,
        session_id = %session_id,
        "User disconnected"
    );
}

/// Read frames until the client sends an identify; returns its token.
async fn await_identify(
    stream: &mut (impl Stream<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<String> {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Ok(ClientEvent::Identify(payload)) = serde_json::from_str(&text) {
                    return Some(payload.token);
                }
            }
            Ok(Message::Close(_)) => return None,
            Err(_) => return None,
            _ => continue,
        }
    }
    None
}

/// Validate the JWT and load the account it names.
async fn authenticate(token: &str, state: &AppState) -> Result<crate::domain::User, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.settings.jwt.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::Unauthorized("Token expired".into())
        }
        _ => AppError::Unauthorized("Invalid token".into()),
    })?;

    let user_id: i64 = token_data
        .claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid token claims".into()))?;

    state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unknown account".into()))
}

fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.parse()
        .map_err(|_| AppError::Validation(format!("Invalid id: {}", raw)))
}

/// Route one client event to its service and fan the outcome out.
async fn dispatch_client_event(
    event: ClientEvent,
    user_id: i64,
    session_id: &str,
    state: &AppState,
) -> Result<(), AppError> {
    match event {
        ClientEvent::Identify(_) => {
            // Already identified; a second identify is ignored.
            Ok(())
        }

        ClientEvent::JoinRoom(payload) => {
            let chat_id = parse_id(&payload.chat_id)?;
            if !state.chats.is_participant(chat_id, user_id).await? {
                return Err(AppError::PermissionDenied(
                    "Not a participant of this chat".into(),
                ));
            }
            state.gateway.join(session_id, chat_id);
            Ok(())
        }

        ClientEvent::LeaveRoom(payload) => {
            let chat_id = parse_id(&payload.chat_id)?;
            state.gateway.leave(session_id, chat_id);
            // Leaving mid-typing clears the indicator for the room.
            if state.typing.clear(chat_id, user_id) {
                state.gateway.send_to_room(
                    chat_id,
                    ServerEvent::TypingChanged {
                        chat_id: chat_id.to_string(),
                        user_id: user_id.to_string(),
                        is_typing: false,
                    },
                    Some(session_id),
                );
            }
            Ok(())
        }

        ClientEvent::TypingStart(payload) => {
            let chat_id = parse_id(&payload.chat_id)?;
            if state.typing.set_typing(chat_id, user_id) {
                state.gateway.send_to_room(
                    chat_id,
                    ServerEvent::TypingChanged {
                        chat_id: chat_id.to_string(),
                        user_id: user_id.to_string(),
                        is_typing: true,
                    },
                    Some(session_id),
                );
            }
            Ok(())
        }

        ClientEvent::TypingStop(payload) => {
            let chat_id = parse_id(&payload.chat_id)?;
            if state.typing.clear(chat_id, user_id) {
                state.gateway.send_to_room(
                    chat_id,
                    ServerEvent::TypingChanged {
                        chat_id: chat_id.to_string(),
                        user_id: user_id.to_string(),
                        is_typing: false,
                    },
                    Some(session_id),
                );
            }
            Ok(())
        }

        ClientEvent::SendMessage(payload) => {
            payload
                .validate()
                .map_err(|e| AppError::Validation(e.to_string()))?;
            let chat_id = parse_id(&payload.chat_id)?;

            let message = state
                .messages
                .send_message(chat_id, user_id, payload.content)
                .await?;
            let message_id = message.id;

            // A sender's own typing indicator ends with the message.
            if state.typing.clear(chat_id, user_id) {
                state.gateway.send_to_room(
                    chat_id,
                    ServerEvent::TypingChanged {
                        chat_id: chat_id.to_string(),
                        user_id: user_id.to_string(),
                        is_typing: false,
                    },
                    Some(session_id),
                );
            }

            let participants = state.chats.participants(chat_id).await?;
            let summary = state.dispatcher.dispatch(
                chat_id,
                &participants,
                ServerEvent::MessageNew {
                    message: MessageDto::from(message),
                },
            );

            // The push reaching another participant's device is what makes
            // the message delivered; the sender learns via a status event on
            // their own sessions only.
            if summary.reached_other_than(user_id) {
                if let Some(change) = state.statuses.mark_delivered(message_id).await? {
                    state.gateway.send_to_user(
                        change.sender_id,
                        ServerEvent::MessageStatus {
                            chat_id: change.chat_id.to_string(),
                            message_id: change.message_id.to_string(),
                            status: change.status,
                            user_id: None,
                        },
                    );
                }
            }
            Ok(())
        }

        ClientEvent::EditMessage(payload) => {
            payload
                .validate()
                .map_err(|e| AppError::Validation(e.to_string()))?;
            let message_id = parse_id(&payload.message_id)?;

            let message = state
                .messages
                .edit_message(message_id, user_id, payload.content)
                .await?;
            let participants = state.chats.participants(message.chat_id).await?;
            state.dispatcher.dispatch(
                message.chat_id,
                &participants,
                ServerEvent::MessageEdited {
                    chat_id: message.chat_id.to_string(),
                    message_id: message_id.to_string(),
                    content: message.content,
                    edited_at: message
                        .edited_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default(),
                },
            );
            Ok(())
        }

        ClientEvent::React(payload) => {
            payload
                .validate()
                .map_err(|e| AppError::Validation(e.to_string()))?;
            let message_id = parse_id(&payload.message_id)?;

            let outcome = state
                .reactions
                .react(message_id, user_id, payload.emoji)
                .await?;
            let participants = state.chats.participants(outcome.chat_id).await?;

            // A replace is announced as two events, removal first, so every
            // client converges regardless of its starting state.
            if let Some(emoji) = outcome.removed {
                state.dispatcher.dispatch(
                    outcome.chat_id,
                    &participants,
                    ServerEvent::ReactionChanged {
                        chat_id: outcome.chat_id.to_string(),
                        message_id: message_id.to_string(),
                        user_id: user_id.to_string(),
                        emoji,
                        action: ReactionAction::Removed,
                    },
                );
            }
            if let Some(emoji) = outcome.added {
                state.dispatcher.dispatch(
                    outcome.chat_id,
                    &participants,
                    ServerEvent::ReactionChanged {
                        chat_id: outcome.chat_id.to_string(),
                        message_id: message_id.to_string(),
                        user_id: user_id.to_string(),
                        emoji,
                        action: ReactionAction::Added,
                    },
                );
            }
            Ok(())
        }

        ClientEvent::DeleteMessage(payload) => {
            let message_id = parse_id(&payload.message_id)?;

            if payload.for_everyone {
                let message = state
                    .deletions
                    .delete_for_everyone(message_id, user_id)
                    .await?;
                let participants = state.chats.participants(message.chat_id).await?;
                state.dispatcher.dispatch(
                    message.chat_id,
                    &participants,
                    ServerEvent::MessageDeleted {
                        chat_id: message.chat_id.to_string(),
                        message_id: message_id.to_string(),
                    },
                );
            } else {
                // Per-viewer hide: no event to anyone, including the caller.
                state.deletions.delete_for_me(message_id, user_id).await?;
            }
            Ok(())
        }

        ClientEvent::MarkRead(payload) => {
            let message_id = parse_id(&payload.message_id)?;
            if let Some(change) = state.statuses.mark_read(message_id, user_id).await? {
                // Receipts concern only the original sender's devices.
                state.gateway.send_to_user(
                    change.sender_id,
                    ServerEvent::MessageStatus {
                        chat_id: change.chat_id.to_string(),
                        message_id: change.message_id.to_string(),
                        status: change.status,
                        user_id: change.reader_id.map(|id| id.to_string()),
                    },
                );
            }
            Ok(())
        }
    }
}

/// Disconnect cleanup: detach from rooms, drop typing state, update presence.
async fn teardown(session_id: &str, state: &AppState) {
    let Some(td) = state.gateway.unregister(session_id) else {
        return;
    };

    for chat_id in &td.joined_chats {
        if state.typing.clear(*chat_id, td.user_id) {
            state.gateway.send_to_room(
                *chat_id,
                ServerEvent::TypingChanged {
                    chat_id: chat_id.to_string(),
                    user_id: td.user_id.to_string(),
                    is_typing: false,
                },
                None,
            );
        }
    }

    if let Err(e) = state.presence.session_closed(td.user_id, td.last_session).await {
        tracing::warn!(
            user_id = td.user_id,
            error = %e,
            "Presence update failed on disconnect"
        );
    }
}
