//! Gateway Event Types
//!
//! The logical client protocol: inbound client events and outbound server
//! events, as `{"t": <name>, "d": <payload>}` JSON envelopes. Snowflake IDs
//! travel as strings.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::application::services::MessageDto;
use crate::domain::MessageStatus;

/// Inbound client event
#[derive(Debug, Deserialize)]
#[serde(tag = "t", content = "d", rename_all = "snake_case")]
pub enum ClientEvent {
    /// First frame on every connection; carries the auth token
    Identify(IdentifyPayload),
    JoinRoom(RoomPayload),
    LeaveRoom(RoomPayload),
    TypingStart(RoomPayload),
    TypingStop(RoomPayload),
    SendMessage(SendMessagePayload),
    EditMessage(EditMessagePayload),
    React(ReactPayload),
    DeleteMessage(DeleteMessagePayload),
    MarkRead(MarkReadPayload),
}

#[derive(Debug, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RoomPayload {
    pub chat_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessagePayload {
    pub chat_id: String,
    #[validate(length(min = 1, max = 4000))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EditMessagePayload {
    pub message_id: String,
    #[validate(length(min = 1, max = 4000))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReactPayload {
    pub message_id: String,
    #[validate(length(min = 1, max = 100))]
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMessagePayload {
    pub message_id: String,
    /// False requests a silent per-viewer hide
    #[serde(default)]
    pub for_everyone: bool,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadPayload {
    pub message_id: String,
}

/// Whether a reaction was added or removed. A replace produces two events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionAction {
    Added,
    Removed,
}

/// Outbound server event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t", content = "d", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Sent once after a successful identify
    Ready {
        session_id: String,
        user_id: String,
        username: String,
    },
    MessageNew {
        message: MessageDto,
    },
    MessageEdited {
        chat_id: String,
        message_id: String,
        content: String,
        edited_at: String,
    },
    /// Global tombstone; never emitted for per-viewer hides
    MessageDeleted {
        chat_id: String,
        message_id: String,
    },
    MessageStatus {
        chat_id: String,
        message_id: String,
        status: MessageStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    ReactionChanged {
        chat_id: String,
        message_id: String,
        user_id: String,
        emoji: String,
        action: ReactionAction,
    },
    TypingChanged {
        chat_id: String,
        user_id: String,
        is_typing: bool,
    },
    PresenceChanged {
        user_id: String,
        is_online: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_seen: Option<String>,
    },
    Error {
        code: u16,
        message: String,
    },
}

impl ServerEvent {
    /// Event name for logs and metrics labels
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::Ready { .. } => "ready",
            ServerEvent::MessageNew { .. } => "message_new",
            ServerEvent::MessageEdited { .. } => "message_edited",
            ServerEvent::MessageDeleted { .. } => "message_deleted",
            ServerEvent::MessageStatus { .. } => "message_status",
            ServerEvent::ReactionChanged { .. } => "reaction_changed",
            ServerEvent::TypingChanged { .. } => "typing_changed",
            ServerEvent::PresenceChanged { .. } => "presence_changed",
            ServerEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_deserialize_from_tagged_json() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"t":"join_room","d":{"chat_id":"42"}}"#).unwrap();
        assert!(matches!(event, ClientEvent::JoinRoom(p) if p.chat_id == "42"));

        let event: ClientEvent = serde_json::from_str(
            r#"{"t":"delete_message","d":{"message_id":"7","for_everyone":true}}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            ClientEvent::DeleteMessage(p) if p.for_everyone
        ));
    }

    #[test]
    fn delete_defaults_to_local_hide() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"t":"delete_message","d":{"message_id":"7"}}"#).unwrap();
        assert!(matches!(
            event,
            ClientEvent::DeleteMessage(p) if !p.for_everyone
        ));
    }

    #[test]
    fn server_events_serialize_with_tag() {
        let event = ServerEvent::TypingChanged {
            chat_id: "42".into(),
            user_id: "1".into(),
            is_typing: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["t"], "typing_changed");
        assert_eq!(json["d"]["is_typing"], true);
    }
}
