//! Secret types for values that must never reach logs.
//!
//! Re-exports the [`secrecy`] wrappers. In Huddle the only long-lived secret
//! is the token signing key shared with the identity service; bearer tokens
//! taken off the wire are wrapped too before they are handed around.
//!
//! `SecretString` implements `Debug` with redaction, so a struct that derives
//! `Debug` while holding one stays safe to log with `{:?}` or tracing fields.
//! The value is zeroized on drop.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let signing_key = SecretString::from("identity-signing-key");
//! assert!(!format!("{signing_key:?}").contains("identity-signing-key"));
//! assert_eq!(signing_key.expose_secret(), "identity-signing-key");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
