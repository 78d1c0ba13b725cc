//! Infrastructure Layer
//!
//! Database access and observability implementations.

pub mod database;
pub mod metrics;
pub mod repositories;
