//! HTTP routes for the room service.
//!
//! Defines the Axum router and application state.

use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use crate::services::RoomCoordinator;
use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Request-level deadline enforced by the HTTP layer.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RoomCoordinator>,
}

/// Build the application routes.
///
/// - `/health`, `/ready`, `/metrics` - public, unversioned
/// - `/api/v1/rooms/...`, `/api/v1/history` - bearer authenticated
///
/// Layer order, innermost first: timeout, trace, HTTP metrics.
pub fn build_routes(
    state: Arc<AppState>,
    auth_state: Arc<AuthState>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route("/api/v1/rooms", post(handlers::create_room))
        .route("/api/v1/rooms/:code", get(handlers::get_room))
        .route("/api/v1/rooms/:code/join", post(handlers::join_room))
        .route("/api/v1/rooms/:code/leave", delete(handlers::leave_room))
        .route("/api/v1/rooms/:code/end", patch(handlers::end_room))
        .route(
            "/api/v1/rooms/:code/settings",
            patch(handlers::update_settings),
        )
        .route(
            "/api/v1/rooms/:code/participants/:participant_id/role",
            patch(handlers::set_participant_role),
        )
        .route(
            "/api/v1/history",
            get(handlers::get_history).delete(handlers::purge_history),
        )
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state);

    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(HTTP_REQUEST_TIMEOUT))
        .layer(middleware::from_fn(http_metrics_middleware))
}
