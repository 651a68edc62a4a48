//! Authentication middleware for the room API.
//!
//! Pulls the bearer token from the Authorization header, hands it to the
//! configured [`IdentityGate`], and stores the resulting [`Identity`] in the
//! request extensions for handlers.

use crate::auth::{Identity, IdentityGate};
use crate::errors::RoomError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub gate: Arc<dyn IdentityGate>,
}

fn extract_bearer_token(req: &Request) -> Result<&str, RoomError> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "room.middleware.auth", "Missing Authorization header");
            RoomError::InvalidToken("Missing Authorization header".to_string())
        })?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            tracing::debug!(target: "room.middleware.auth", "Invalid Authorization header format");
            RoomError::InvalidToken("Invalid Authorization header format".to_string())
        })
}

/// Reject unauthenticated requests with 401; otherwise continue with the
/// caller's `Identity` in the extensions.
#[instrument(skip_all, name = "room.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, RoomError> {
    let token = extract_bearer_token(&req)?;
    let identity: Identity = state.gate.authenticate(token).await?;

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Extension, Router,
    };
    use common::types::UserId;
    use tower::ServiceExt;

    /// Accepts exactly one token.
    struct FixedGate {
        token: &'static str,
        user_id: UserId,
    }

    #[async_trait]
    impl IdentityGate for FixedGate {
        async fn authenticate(&self, token: &str) -> Result<Identity, RoomError> {
            if token == self.token {
                Ok(Identity {
                    user_id: self.user_id,
                    display_name: "Alice".to_string(),
                })
            } else {
                Err(RoomError::InvalidToken("bad token".to_string()))
            }
        }
    }

    async fn whoami(Extension(identity): Extension<Identity>) -> String {
        identity.user_id.to_string()
    }

    fn app(user_id: UserId) -> Router {
        let state = Arc::new(AuthState {
            gate: Arc::new(FixedGate {
                token: "good",
                user_id,
            }),
        });
        Router::new()
            .route("/whoami", get(whoami))
            .route_layer(middleware::from_fn_with_state(state, require_auth))
    }

    fn request(auth: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri("/whoami");
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        let user_id = UserId::new();
        let response = app(user_id)
            .oneshot(request(Some("Bearer good")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let response = app(UserId::new()).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("WWW-Authenticate"));
    }

    #[tokio::test]
    async fn test_non_bearer_scheme_is_unauthorized() {
        let response = app(UserId::new())
            .oneshot(request(Some("Basic Z29vZA==")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_bearer_is_unauthorized() {
        let response = app(UserId::new())
            .oneshot(request(Some("Bearer ")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_rejected_token_is_unauthorized() {
        let response = app(UserId::new())
            .oneshot(request(Some("Bearer forged")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
