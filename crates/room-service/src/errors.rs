//! Room service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Messages
//! returned to clients for dependency and internal failures are generic; the
//! actual cause is logged server-side.

use crate::repositories::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Room service error type.
///
/// Maps to HTTP status codes:
/// - Validation: 400 Bad Request
/// - InvalidToken: 401 Unauthorized
/// - Forbidden: 403 Forbidden
/// - NotFound: 404 Not Found (also used for ended rooms)
/// - Conflict: 409 Conflict
/// - Internal: 500 Internal Server Error
/// - Dependency: 503 Service Unavailable
/// - Timeout: 504 Gateway Timeout
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Dependency(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            RoomError::Validation(_) => 400,
            RoomError::InvalidToken(_) => 401,
            RoomError::Forbidden(_) => 403,
            RoomError::NotFound(_) => 404,
            RoomError::Conflict(_) => 409,
            RoomError::Internal(_) => 500,
            RoomError::Dependency(_) => 503,
            RoomError::Timeout => 504,
        }
    }

    /// Bounded label for the `error_type` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            RoomError::Validation(_) => "validation",
            RoomError::InvalidToken(_) => "invalid_token",
            RoomError::Forbidden(_) => "forbidden",
            RoomError::NotFound(_) => "not_found",
            RoomError::Conflict(_) => "conflict",
            RoomError::Dependency(_) => "dependency",
            RoomError::Timeout => "timeout",
            RoomError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            RoomError::Validation(reason) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", reason.clone())
            }
            RoomError::InvalidToken(reason) => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", reason.clone())
            }
            RoomError::Forbidden(reason) => (StatusCode::FORBIDDEN, "FORBIDDEN", reason.clone()),
            RoomError::NotFound(resource) => (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone()),
            RoomError::Conflict(reason) => (StatusCode::CONFLICT, "CONFLICT", reason.clone()),
            RoomError::Dependency(reason) => {
                tracing::error!(target: "room.store", reason = %reason, "Durable store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "DEPENDENCY_ERROR",
                    "Service temporarily unavailable".to_string(),
                )
            }
            RoomError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "TIMEOUT",
                "The operation did not complete in time".to_string(),
            ),
            RoomError::Internal(reason) => {
                tracing::error!(target: "room.internal", reason = %reason, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"huddle-api\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

/// Store errors that escape the coordinator's retry loop.
impl From<StoreError> for RoomError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(what) => RoomError::Conflict(what),
            StoreError::VersionConflict => {
                RoomError::Conflict("Room was modified concurrently".to_string())
            }
            StoreError::Unavailable(reason) => RoomError::Dependency(reason),
            StoreError::Corrupt(reason) => RoomError::Internal(reason),
        }
    }
}
