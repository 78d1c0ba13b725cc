//! Shared Utilities
//!
//! Common error types, ID generation, and synchronization helpers.

pub mod error;
pub mod locks;
pub mod snowflake;

pub use error::AppError;
pub use locks::MessageLocks;
pub use snowflake::SnowflakeGenerator;
