//! Repository Implementations
//!
//! PostgreSQL implementations of the domain repository traits.

pub mod chat_repository;
pub mod message_repository;
pub mod user_repository;

pub use chat_repository::PgChatRepository;
pub use message_repository::PgMessageRepository;
pub use user_repository::PgUserRepository;
