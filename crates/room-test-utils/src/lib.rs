//! # Room Test Utilities
//!
//! Shared test utilities for the room service:
//! - `TestRoomServer`, the real router on a random port over the in-memory store
//! - Token helpers for authenticated requests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use room_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestRoomServer::spawn().await?;
//!     let alice = UserId::new();
//!
//!     let response = reqwest::Client::new()
//!         .post(format!("{}/api/v1/rooms", server.url()))
//!         .bearer_auth(mint_token(alice, Some("Alice")))
//!         .json(&serde_json::json!({"title": "Standup"}))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 201);
//!     Ok(())
//! }
//! ```

pub mod server_harness;
pub mod tokens;

pub use server_harness::*;
pub use tokens::*;
