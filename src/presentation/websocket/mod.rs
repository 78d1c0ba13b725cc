//! WebSocket Layer
//!
//! Live-messaging coordination: the gateway (connection and room registry),
//! the per-connection handler, and the ephemeral typing and presence
//! trackers built on top of it.

pub mod dispatcher;
pub mod events;
pub mod gateway;
pub mod handler;
pub mod presence;
pub mod typing;

pub use dispatcher::{DispatchSummary, MessageDispatcher};
pub use events::{ClientEvent, ReactionAction, ServerEvent};
pub use gateway::{Gateway, SessionTeardown};
pub use presence::PresenceTracker;
pub use typing::TypingTracker;
