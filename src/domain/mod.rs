//! Domain Layer
//!
//! Business entities and repository traits. Implementations live in the
//! infrastructure layer.

pub mod entities;

pub use entities::*;
