//! Prometheus scrape endpoint.
//!
//! Unauthenticated. Labels are bounded (normalized paths, operation names,
//! error kinds) and carry no user or room identifiers.

use axum::extract::State;
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
#[tracing::instrument(skip_all, name = "room.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
