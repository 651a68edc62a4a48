//! HS256 bearer token verification.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only HS256 is accepted; the `alg` header cannot downgrade it
//! - `exp` is required and validated; `iat` may not be further in the future
//!   than the configured clock skew
//! - Every rejection carries the same generic message

use super::{Identity, IdentityGate};
use crate::errors::RoomError;
use async_trait::async_trait;
use common::jwt::{check_token_size, validate_iat, UserClaims};
use common::secret::{ExposeSecret, SecretString};
use common::types::UserId;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

const INVALID_TOKEN: &str = "The access token is invalid or expired";

/// Identity gate backed by HS256 tokens from the identity service.
pub struct JwtIdentityGate {
    decoding_key: DecodingKey,
    validation: Validation,
    clock_skew: Duration,
}

impl JwtIdentityGate {
    pub fn new(secret: &SecretString, clock_skew: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
            clock_skew,
        }
    }

    fn verify(&self, token: &str) -> Result<UserClaims, RoomError> {
        check_token_size(token).map_err(|e| {
            tracing::debug!(target: "room.middleware.auth", error = %e, "Token size check failed");
            RoomError::InvalidToken(INVALID_TOKEN.to_string())
        })?;

        let token_data =
            decode::<UserClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                tracing::debug!(target: "room.middleware.auth", error = %e, "Token verification failed");
                RoomError::InvalidToken(INVALID_TOKEN.to_string())
            })?;

        validate_iat(token_data.claims.iat, self.clock_skew).map_err(|e| {
            tracing::debug!(target: "room.middleware.auth", error = %e, "Token iat validation failed");
            RoomError::InvalidToken(INVALID_TOKEN.to_string())
        })?;

        Ok(token_data.claims)
    }
}

/// Parse the token subject. Accepts a bare UUID or `user:{uuid}`.
pub fn parse_user_id(sub: &str) -> Result<UserId, RoomError> {
    let raw = sub.strip_prefix("user:").unwrap_or(sub);
    Uuid::parse_str(raw).map(UserId).map_err(|e| {
        tracing::debug!(target: "room.middleware.auth", error = %e, "Failed to parse user ID from token");
        RoomError::InvalidToken(INVALID_TOKEN.to_string())
    })
}

#[async_trait]
impl IdentityGate for JwtIdentityGate {
    #[instrument(skip_all, name = "room.auth.authenticate")]
    async fn authenticate(&self, token: &str) -> Result<Identity, RoomError> {
        let claims = self.verify(token)?;
        let user_id = parse_user_id(&claims.sub)?;

        let display_name = claims
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| user_id.to_string());

        Ok(Identity {
            user_id,
            display_name,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::jwt::MAX_JWT_SIZE_BYTES;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-signing-secret-0123456789abcdef";

    fn gate() -> JwtIdentityGate {
        JwtIdentityGate::new(&SecretString::from(SECRET), Duration::from_secs(300))
    }

    fn sign(claims: &UserClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims_for(sub: &str, name: Option<&str>) -> UserClaims {
        let now = chrono::Utc::now().timestamp();
        UserClaims {
            sub: sub.to_string(),
            name: name.map(str::to_string),
            iat: now,
            exp: now + 3600,
        }
    }

    #[tokio::test]
    async fn test_valid_token_yields_identity() {
        let user = UserId::new();
        let token = sign(&claims_for(&format!("user:{user}"), Some("Alice")), SECRET);

        let identity = gate().authenticate(&token).await.unwrap();
        assert_eq!(identity.user_id, user);
        assert_eq!(identity.display_name, "Alice");
    }

    #[tokio::test]
    async fn test_missing_name_falls_back_to_user_id() {
        let user = UserId::new();
        let token = sign(&claims_for(&user.to_string(), None), SECRET);

        let identity = gate().authenticate(&token).await.unwrap();
        assert_eq!(identity.display_name, user.to_string());
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let token = sign(&claims_for(&UserId::new().to_string(), None), "other-secret");
        assert!(matches!(
            gate().authenticate(&token).await,
            Err(RoomError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let mut claims = claims_for(&UserId::new().to_string(), None);
        claims.iat -= 7200;
        claims.exp -= 7200;
        let token = sign(&claims, SECRET);
        assert!(gate().authenticate(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_future_iat_rejected() {
        let mut claims = claims_for(&UserId::new().to_string(), None);
        claims.iat += 3600;
        claims.exp += 3600;
        let token = sign(&claims, SECRET);
        assert!(gate().authenticate(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_token_rejected() {
        let token = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert!(gate().authenticate(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_non_uuid_subject_rejected() {
        let token = sign(&claims_for("service:room-bot", None), SECRET);
        assert!(matches!(
            gate().authenticate(&token).await,
            Err(RoomError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_parse_user_id_formats() {
        let user = UserId::new();
        assert_eq!(parse_user_id(&user.to_string()).unwrap(), user);
        assert_eq!(parse_user_id(&format!("user:{user}")).unwrap(), user);
        assert!(parse_user_id("user:").is_err());
    }
}
