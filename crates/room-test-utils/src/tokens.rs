//! Bearer tokens signed with the harness secret.

use chrono::Utc;
use common::jwt::UserClaims;
use common::types::UserId;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

/// Signing secret shared by `TestRoomServer` and the helpers below.
pub const TEST_TOKEN_SECRET: &str = "room-test-utils-signing-secret";

/// Sign arbitrary claims with `secret`.
pub fn sign_claims(claims: &UserClaims, secret: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("HS256 signing cannot fail for serializable claims")
}

/// A one-hour token for `user_id`, accepted by `TestRoomServer`.
pub fn mint_token(user_id: UserId, name: Option<&str>) -> String {
    let now = Utc::now().timestamp();
    sign_claims(
        &UserClaims {
            sub: format!("user:{user_id}"),
            name: name.map(str::to_string),
            iat: now,
            exp: now + 3600,
        },
        TEST_TOKEN_SECRET,
    )
}

/// A token for `user_id` that expired an hour ago.
pub fn expired_token(user_id: UserId) -> String {
    let now = Utc::now().timestamp();
    sign_claims(
        &UserClaims {
            sub: user_id.to_string(),
            name: None,
            iat: now - 7200,
            exp: now - 3600,
        },
        TEST_TOKEN_SECRET,
    )
}
