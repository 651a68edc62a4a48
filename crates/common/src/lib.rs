//! Common utilities and types shared across Huddle components.

#![warn(clippy::pedantic)]

/// Module for identifier newtypes (rooms, participants, users)
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (size limits, clock skew, user claims)
pub mod jwt;
