//! Room handlers.
//!
//! Thin adapters from HTTP to the [`RoomCoordinator`]: extract the caller's
//! identity and the request parameters, call one coordinator operation, and
//! shape the response. No room state is decided here.
//!
//! - `POST /api/v1/rooms` - create a room (201)
//! - `GET /api/v1/rooms/{code}` - resolved room view
//! - `POST /api/v1/rooms/{code}/join` - join
//! - `DELETE /api/v1/rooms/{code}/leave` - leave (204)
//! - `PATCH /api/v1/rooms/{code}/end` - end (204)
//! - `PATCH /api/v1/rooms/{code}/settings` - partial settings update
//! - `PATCH /api/v1/rooms/{code}/participants/{id}/role` - change a role
//! - `GET /api/v1/history` - caller's ended rooms
//! - `DELETE /api/v1/history` - purge caller's ended rooms
//!
//! [`RoomCoordinator`]: crate::services::RoomCoordinator

use crate::auth::Identity;
use crate::errors::RoomError;
use crate::models::{
    CreateRoomRequest, HistoryPage, HistoryQuery, Participant, PurgeHistoryResponse,
    RoomSnapshot, SetRoleRequest, SettingsPatch,
};
use crate::routes::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Extension, Json,
};
use common::types::ParticipantId;
use std::sync::Arc;
use tracing::instrument;

/// Map a body rejection to a 400 with the standard error envelope.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, RoomError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!(target: "room.handlers", error = %rejection, "Rejected request body");
        RoomError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    })
}

// ============================================================================
// Rooms
// ============================================================================

/// Handler for POST /api/v1/rooms
///
/// Returns 201 with the new room; the caller is its host and first member.
#[instrument(skip_all, name = "room.handlers.create_room")]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    body: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RoomSnapshot>), RoomError> {
    let request = json_body(body)?;
    let snapshot = state
        .coordinator
        .create_room(&request.title, identity.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// Handler for GET /api/v1/rooms/{code}
#[instrument(skip_all, name = "room.handlers.get_room", fields(room_code = %code))]
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
) -> Result<Json<RoomSnapshot>, RoomError> {
    let snapshot = state.coordinator.get_room(&code, identity.user_id).await?;
    Ok(Json(snapshot))
}

/// Handler for POST /api/v1/rooms/{code}/join
///
/// Idempotent: a member joining again gets the current view back.
#[instrument(skip_all, name = "room.handlers.join_room", fields(room_code = %code))]
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
) -> Result<Json<RoomSnapshot>, RoomError> {
    let snapshot = state.coordinator.join_room(&code, identity.user_id).await?;

    tracing::info!(
        target: "room.handlers",
        room_id = %snapshot.room_id,
        display_name = %identity.display_name,
        "Join request served"
    );

    Ok(Json(snapshot))
}

/// Handler for DELETE /api/v1/rooms/{code}/leave
#[instrument(skip_all, name = "room.handlers.leave_room", fields(room_code = %code))]
pub async fn leave_room(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
) -> Result<StatusCode, RoomError> {
    state.coordinator.leave_room(&code, identity.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for PATCH /api/v1/rooms/{code}/end
#[instrument(skip_all, name = "room.handlers.end_room", fields(room_code = %code))]
pub async fn end_room(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
) -> Result<StatusCode, RoomError> {
    state.coordinator.end_room(&code, identity.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for PATCH /api/v1/rooms/{code}/settings
#[instrument(skip_all, name = "room.handlers.update_settings", fields(room_code = %code))]
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
    body: Result<Json<SettingsPatch>, JsonRejection>,
) -> Result<Json<RoomSnapshot>, RoomError> {
    let patch = json_body(body)?;
    let snapshot = state
        .coordinator
        .update_settings(&code, identity.user_id, patch)
        .await?;
    Ok(Json(snapshot))
}

/// Handler for PATCH /api/v1/rooms/{code}/participants/{participant_id}/role
#[instrument(skip_all, name = "room.handlers.set_participant_role")]
pub async fn set_participant_role(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    path: Result<Path<(String, ParticipantId)>, PathRejection>,
    body: Result<Json<SetRoleRequest>, JsonRejection>,
) -> Result<Json<Participant>, RoomError> {
    let Path((code, participant_id)) = path.map_err(|rejection| {
        tracing::debug!(target: "room.handlers", error = %rejection, "Rejected path");
        RoomError::Validation("Invalid participant id".to_string())
    })?;
    let request = json_body(body)?;

    let participant = state
        .coordinator
        .set_participant_role(&code, identity.user_id, participant_id, &request.role)
        .await?;
    Ok(Json(participant))
}

// ============================================================================
// History
// ============================================================================

/// Handler for GET /api/v1/history?before=&limit=
#[instrument(skip_all, name = "room.handlers.get_history")]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryPage>, RoomError> {
    let Query(query) = query.map_err(|rejection| {
        tracing::debug!(target: "room.handlers", error = %rejection, "Rejected query");
        RoomError::Validation(format!("Invalid query: {}", rejection.body_text()))
    })?;

    let page = state
        .coordinator
        .get_history(identity.user_id, query.before, query.effective_limit())
        .await?;
    Ok(Json(page))
}

/// Handler for DELETE /api/v1/history
#[instrument(skip_all, name = "room.handlers.purge_history")]
pub async fn purge_history(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<PurgeHistoryResponse>, RoomError> {
    let deleted = state.coordinator.purge_history(identity.user_id).await?;
    Ok(Json(PurgeHistoryResponse { deleted }))
}
