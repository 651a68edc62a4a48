//! Liveness and readiness probes.
//!
//! - `/health` answers as long as the process serves requests
//! - `/ready` also pings the durable store

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

/// Liveness probe. Checks no dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe: 200 when the store answers, 503 otherwise.
#[tracing::instrument(skip_all, name = "room.health.readiness")]
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    if state.coordinator.store_ready().await {
        (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready".to_string(),
                store: "healthy".to_string(),
            }),
        )
    } else {
        tracing::warn!(target: "room.handlers", "Readiness check failed: store unreachable");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready".to_string(),
                store: "unhealthy".to_string(),
            }),
        )
    }
}
