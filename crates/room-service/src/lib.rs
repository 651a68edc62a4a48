//! Room Service Library
//!
//! Coordinates room sessions for Huddle: room creation and ending, the
//! membership ledger, host-equivalent authorization, and per-request
//! sequencing of those pieces against a versioned durable store.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/coordinator.rs -> repositories/*.rs
//!                                     |-> services/lifecycle.rs
//!                                     |-> services/ledger.rs
//!                                     `-> policy.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Identity gate (bearer token to user identity)
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication and HTTP metrics layers
//! - `models` - Room, participant and read-model types
//! - `observability` - Prometheus metrics
//! - `policy` - Authorization decisions
//! - `repositories` - Durable store trait with PostgreSQL and in-memory backends
//! - `routes` - Axum router setup
//! - `services` - Lifecycle manager, membership ledger, coordinator

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod policy;
pub mod repositories;
pub mod routes;
pub mod services;
