//! Observability for the room service: Prometheus metrics definitions.

pub mod metrics;
