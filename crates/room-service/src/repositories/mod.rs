//! Repository layer for the room service.
//!
//! The coordinator depends only on the [`RoomRepository`] trait. Two
//! implementations exist:
//! - [`PgRoomRepository`]: PostgreSQL via sqlx, one transaction per write
//! - [`InMemoryRoomRepository`]: same semantics behind a tokio `RwLock`,
//!   with fault injection for tests
//!
//! Room writes are conditional on the room's `version`. A commit whose
//! expected version is stale fails with [`StoreError::VersionConflict`] and
//! leaves nothing behind.

pub mod memory;
pub mod rooms;

pub use memory::InMemoryRoomRepository;
pub use rooms::PgRoomRepository;

use crate::models::{HistoryCursor, Participant, Room, RoomRecord, UserProfile};
use async_trait::async_trait;
use common::types::{ParticipantId, RoomId, UserId};
use thiserror::Error;

/// Errors reported by a durable store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write (room code, or a second
    /// active membership for the same room and user).
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The room's version moved since it was read.
    #[error("Room version changed since it was read")]
    VersionConflict,

    /// The store could not be reached or failed the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be mapped back into a domain record.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Constraint names reported with [`StoreError::UniqueViolation`].
pub mod constraints {
    pub const ROOM_CODE: &str = "rooms_room_code_key";
    pub const ACTIVE_MEMBERSHIP: &str = "participants_one_active_per_user";
}

/// One atomic write against a room and its membership records.
///
/// Either every part lands or none does.
#[derive(Debug, Clone)]
pub struct RoomCommit {
    /// The room's full new state. `room.room_id` selects the row.
    pub room: Room,

    /// Version the caller read; the write fails if it moved.
    pub expected_version: i64,

    /// Fresh participant records.
    pub inserted: Vec<Participant>,

    /// Replacement state for existing participant records.
    pub updated: Vec<Participant>,
}

impl RoomCommit {
    /// Commit only a room change.
    pub fn room_only(room: Room, expected_version: i64) -> Self {
        Self {
            room,
            expected_version,
            inserted: Vec::new(),
            updated: Vec::new(),
        }
    }
}

/// Durable store for rooms, participants and identity profiles.
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Insert a new room together with its host's membership record.
    ///
    /// Fails with `UniqueViolation` if the room code is taken.
    async fn insert_room(&self, room: &Room, host: &Participant)
        -> Result<RoomRecord, StoreError>;

    /// Find a room by code, whatever its status.
    async fn find_room_by_code(&self, room_code: &str) -> Result<Option<RoomRecord>, StoreError>;

    async fn find_room(&self, room_id: RoomId) -> Result<Option<RoomRecord>, StoreError>;

    /// The active membership record for (room, user), if one exists.
    async fn find_active_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Participant>, StoreError>;

    async fn find_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Option<Participant>, StoreError>;

    /// Load participant records by id. Unknown ids are skipped.
    async fn list_participants(
        &self,
        participant_ids: &[ParticipantId],
    ) -> Result<Vec<Participant>, StoreError>;

    /// Apply a [`RoomCommit`] atomically and return the new room record.
    async fn commit(&self, commit: &RoomCommit) -> Result<RoomRecord, StoreError>;

    /// Ended rooms hosted by `host_user_id`, ordered by
    /// `(created_at, room_id)` descending, strictly after `before` in that
    /// order when given.
    async fn list_history(
        &self,
        host_user_id: UserId,
        before: Option<HistoryCursor>,
        limit: u32,
    ) -> Result<Vec<Room>, StoreError>;

    /// Delete every ended room hosted by `host_user_id` along with its
    /// participant records. Returns the number of rooms removed.
    async fn delete_history(&self, host_user_id: UserId) -> Result<u64, StoreError>;

    /// Profiles for the given users. Users without a profile are skipped.
    async fn find_profiles(&self, user_ids: &[UserId]) -> Result<Vec<UserProfile>, StoreError>;

    /// Connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;
}
