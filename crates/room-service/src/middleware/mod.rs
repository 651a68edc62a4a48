//! HTTP middleware for the room service.
//!
//! - `auth` - bearer authentication for `/api/v1` routes
//! - `http_metrics` - request counters and latency for every response

pub mod auth;
pub mod http_metrics;

pub use auth::{require_auth, AuthState};
pub use http_metrics::http_metrics_middleware;
