//! Application Layer
//!
//! Services orchestrating domain operations.

pub mod services;

pub use services::*;
