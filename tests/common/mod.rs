//! Common Test Utilities
//!
//! In-memory repository stands-ins for coordination scenarios that do not
//! need a database.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use chat_relay::domain::{
    Chat, ChatRepository, ChatType, Message, MessageRepository, User, UserRepository,
};
use chat_relay::presentation::websocket::{Gateway, ServerEvent};
use chat_relay::shared::error::AppError;

/// Register a session and hand back its event receiver.
pub fn connect(gateway: &Gateway, session_id: &str, user_id: i64) -> UnboundedReceiver<ServerEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    gateway.register(session_id.to_string(), user_id, tx);
    rx
}

/// In-memory user store with a static contact graph.
pub struct InMemoryUsers {
    pub contacts: HashMap<i64, Vec<i64>>,
    pub presence_log: Mutex<Vec<(i64, bool)>>,
}

impl InMemoryUsers {
    pub fn new(contacts: HashMap<i64, Vec<i64>>) -> Arc<Self> {
        Arc::new(Self {
            contacts,
            presence_log: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl UserRepository for InMemoryUsers {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(Some(User {
            id,
            username: format!("user{}", id),
            display_name: None,
            is_online: false,
            last_seen: None,
        }))
    }

    async fn contact_ids(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        Ok(self.contacts.get(&user_id).cloned().unwrap_or_default())
    }

    async fn set_presence(
        &self,
        user_id: i64,
        is_online: bool,
        _last_seen: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.presence_log.lock().unwrap().push((user_id, is_online));
        Ok(())
    }
}

/// In-memory chat store with a static participant roster.
pub struct InMemoryChats {
    pub rosters: HashMap<i64, Vec<i64>>,
}

impl InMemoryChats {
    pub fn new(rosters: HashMap<i64, Vec<i64>>) -> Arc<Self> {
        Arc::new(Self { rosters })
    }
}

#[async_trait]
impl ChatRepository for InMemoryChats {
    async fn find_by_id(&self, id: i64) -> Result<Option<Chat>, AppError> {
        Ok(self.rosters.get(&id).map(|participants| Chat {
            id,
            chat_type: ChatType::Group,
            name: Some(format!("chat{}", id)),
            created_by: participants[0],
            participants: participants.clone(),
            created_at: Utc::now(),
        }))
    }

    async fn participants(&self, chat_id: i64) -> Result<Vec<i64>, AppError> {
        Ok(self.rosters.get(&chat_id).cloned().unwrap_or_default())
    }

    async fn is_participant(&self, chat_id: i64, user_id: i64) -> Result<bool, AppError> {
        Ok(self
            .rosters
            .get(&chat_id)
            .map(|p| p.contains(&user_id))
            .unwrap_or(false))
    }
}

/// In-memory message store covering the operations the status and reaction
/// engines exercise.
#[derive(Default)]
pub struct InMemoryMessages {
    pub messages: Mutex<HashMap<i64, Message>>,
    pub reads: Mutex<HashSet<(i64, i64)>>,
    pub reactions: Mutex<HashMap<(i64, i64), String>>,
    pub hides: Mutex<HashSet<(i64, i64)>>,
}

impl InMemoryMessages {
    pub fn with_messages(messages: Vec<Message>) -> Arc<Self> {
        let store = Self::default();
        {
            let mut map = store.messages.lock().unwrap();
            for message in messages {
                store
                    .reads
                    .lock()
                    .unwrap()
                    .insert((message.id, message.sender_id));
                map.insert(message.id, message);
            }
        }
        Arc::new(store)
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessages {
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        Ok(self.messages.lock().unwrap().get(&id).cloned())
    }

    async fn create(&self, message: &Message) -> Result<(), AppError> {
        self.reads
            .lock()
            .unwrap()
            .insert((message.id, message.sender_id));
        self.messages
            .lock()
            .unwrap()
            .insert(message.id, message.clone());
        Ok(())
    }

    async fn find_by_chat(
        &self,
        _chat_id: i64,
        _viewer_id: i64,
        _before: Option<i64>,
        _limit: i64,
    ) -> Result<Vec<Message>, AppError> {
        unimplemented!("not exercised by coordination tests")
    }

    async fn unread_count(&self, chat_id: i64, viewer_id: i64) -> Result<i64, AppError> {
        let reads = self.reads.lock().unwrap();
        let hides = self.hides.lock().unwrap();
        let count = self
            .messages
            .lock()
            .unwrap()
            .values()
            .filter(|m| {
                m.chat_id == chat_id
                    && m.sender_id != viewer_id
                    && !m.deleted
                    && !reads.contains(&(m.id, viewer_id))
                    && !hides.contains(&(m.id, viewer_id))
            })
            .count();
        Ok(count as i64)
    }

    async fn set_edited(&self, _id: i64, _content: &str) -> Result<(), AppError> {
        unimplemented!("not exercised by coordination tests")
    }

    async fn mark_deleted(&self, id: i64) -> Result<(), AppError> {
        if let Some(message) = self.messages.lock().unwrap().get_mut(&id) {
            message.deleted = true;
            message.content = chat_relay::domain::DELETED_PLACEHOLDER.to_string();
        }
        Ok(())
    }

    async fn hide_for(&self, id: i64, user_id: i64) -> Result<(), AppError> {
        self.hides.lock().unwrap().insert((id, user_id));
        Ok(())
    }

    async fn add_reaction(&self, id: i64, user_id: i64, emoji: &str) -> Result<(), AppError> {
        self.reactions
            .lock()
            .unwrap()
            .insert((id, user_id), emoji.to_string());
        Ok(())
    }

    async fn remove_reaction(&self, id: i64, user_id: i64, _emoji: &str) -> Result<(), AppError> {
        self.reactions.lock().unwrap().remove(&(id, user_id));
        Ok(())
    }

    async fn find_user_reaction(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<String>, AppError> {
        Ok(self.reactions.lock().unwrap().get(&(id, user_id)).cloned())
    }

    async fn add_read_receipt(&self, id: i64, user_id: i64) -> Result<bool, AppError> {
        Ok(self.reads.lock().unwrap().insert((id, user_id)))
    }

    async fn promote_delivered(&self, id: i64) -> Result<(), AppError> {
        if let Some(message) = self.messages.lock().unwrap().get_mut(&id) {
            if message.status == chat_relay::domain::MessageStatus::Sent {
                message.status = chat_relay::domain::MessageStatus::Delivered;
            }
        }
        Ok(())
    }

    async fn promote_read(&self, id: i64) -> Result<(), AppError> {
        if let Some(message) = self.messages.lock().unwrap().get_mut(&id) {
            message.status = chat_relay::domain::MessageStatus::Read;
        }
        Ok(())
    }
}
