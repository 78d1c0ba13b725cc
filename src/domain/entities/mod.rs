//! Domain Entities
//!
//! Core business entities and their repository traits.

pub mod chat;
pub mod message;
pub mod user;

pub use chat::{Chat, ChatRepository, ChatType};
pub use message::{Message, MessageRepository, MessageStatus, DELETED_PLACEHOLDER};
pub use user::{User, UserRepository};

#[cfg(test)]
pub use chat::MockChatRepository;
#[cfg(test)]
pub use message::MockMessageRepository;
#[cfg(test)]
pub use user::MockUserRepository;
