//! # Chat Relay
//!
//! The live-messaging coordination layer of a group-chat backend:
//! - WebSocket gateway for real-time events (messages, reactions, typing,
//!   presence, read receipts)
//! - RESTful history and unread-count endpoints
//! - PostgreSQL for durable message state
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Core business entities and repository traits
//! - **Application Layer**: Business logic services
//! - **Infrastructure Layer**: Database implementations and metrics
//! - **Presentation Layer**: HTTP handlers and the WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! chat_relay/
//! +-- config/         Configuration management
//! +-- domain/         Domain entities and repository traits
//! +-- application/    Application services
//! +-- infrastructure/ Database implementations and metrics
//! +-- presentation/   HTTP routes and WebSocket handlers
//! +-- shared/         Common utilities (errors, snowflake IDs, locks)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
