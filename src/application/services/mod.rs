//! Application Services
//!
//! Business logic over the repository traits. Each service owns one of the
//! concurrency-sensitive state machines of the messaging core.

pub mod deletion_service;
pub mod message_service;
pub mod reaction_service;
pub mod status_service;

pub use deletion_service::{DeletionService, DELETE_FOR_EVERYONE_WINDOW_HOURS};
pub use message_service::{MessageDto, MessageService, MAX_CONTENT_LENGTH};
pub use reaction_service::{ReactionOutcome, ReactionService};
pub use status_service::{StatusChange, StatusService};
