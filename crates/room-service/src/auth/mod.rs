//! Identity gate for the room service.
//!
//! The identity service issues bearer tokens; this module turns a token into
//! an [`Identity`]. The HTTP layer depends only on the [`IdentityGate`]
//! trait so tests can swap the verifier.
//!
//! # Components
//!
//! - `jwt` - HS256 token verification with a secret shared with the identity service

pub mod jwt;

pub use jwt::JwtIdentityGate;

use crate::errors::RoomError;
use async_trait::async_trait;
use common::types::UserId;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

/// Authenticates bearer credentials.
#[async_trait]
pub trait IdentityGate: Send + Sync {
    /// Validate `token` and return the caller it identifies.
    ///
    /// # Errors
    ///
    /// Returns `RoomError::InvalidToken` for every rejection, with a generic
    /// message.
    async fn authenticate(&self, token: &str) -> Result<Identity, RoomError>;
}
