//! Room Lifecycle Manager.
//!
//! Owns room creation, code lookup, ending, settings and history. Reads go
//! straight to the repository. Mutations of existing rooms are returned as
//! [`RoomCommit`]s for the coordinator to apply under its conflict retry.

use crate::errors::RoomError;
use crate::models::{
    FeatureToggles, HistoryCursor, HistoryPage, Participant, ParticipantRole, Room, RoomRecord,
    RoomStatus, SettingsPatch, MAX_ROOM_TITLE_LENGTH,
};
use crate::repositories::{constraints, RoomCommit, RoomRepository, StoreError};
use crate::services::codes::{looks_like_room_code, RoomCodeSource};
use chrono::{DateTime, Utc};
use common::types::{RoomId, UserId};
use std::sync::Arc;
use tracing::instrument;

const ROOM_NOT_FOUND: &str = "Room not found or has ended";

pub struct RoomLifecycle {
    repo: Arc<dyn RoomRepository>,
    codes: Arc<dyn RoomCodeSource>,
    code_retries: u32,
}

/// Trim and validate a room title.
pub fn normalize_title(title: &str) -> Result<String, RoomError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(RoomError::Validation("Room title is required".to_string()));
    }
    if trimmed.chars().count() > MAX_ROOM_TITLE_LENGTH {
        return Err(RoomError::Validation(format!(
            "Room title must be at most {MAX_ROOM_TITLE_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_string())
}

impl RoomLifecycle {
    pub fn new(
        repo: Arc<dyn RoomRepository>,
        codes: Arc<dyn RoomCodeSource>,
        code_retries: u32,
    ) -> Self {
        Self {
            repo,
            codes,
            code_retries,
        }
    }

    /// Create an active room with default toggles and enroll its host.
    ///
    /// A room code clash regenerates the code, up to `code_retries` extra
    /// attempts, then fails with `Conflict`.
    #[instrument(skip_all, name = "room.lifecycle.create", fields(host_user_id = %host_user_id))]
    pub async fn create(&self, title: &str, host_user_id: UserId) -> Result<RoomRecord, RoomError> {
        let title = normalize_title(title)?;

        for attempt in 0..=self.code_retries {
            let room_code = self.codes.next_code()?;
            let room_id = RoomId::new();
            let host = Participant::new(room_id, host_user_id, ParticipantRole::Host);
            let room = Room {
                room_id,
                title: title.clone(),
                host_user_id,
                room_code,
                status: RoomStatus::Active,
                settings: FeatureToggles::default(),
                participants: vec![host.participant_id],
                created_at: host.joined_at,
                ended_at: None,
            };

            match self.repo.insert_room(&room, &host).await {
                Ok(record) => {
                    tracing::info!(
                        target: "room.coordinator",
                        room_id = %record.room.room_id,
                        room_code = %record.room.room_code,
                        "Room created"
                    );
                    return Ok(record);
                }
                Err(StoreError::UniqueViolation(constraint))
                    if constraint == constraints::ROOM_CODE =>
                {
                    tracing::warn!(
                        target: "room.coordinator",
                        attempt = attempt + 1,
                        "Room code collision, regenerating"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::error!(
            target: "room.coordinator",
            attempts = self.code_retries + 1,
            "Room code collision retries exhausted"
        );
        Err(RoomError::Conflict(
            "Could not allocate a unique room code".to_string(),
        ))
    }

    /// Look up a room by code. Ended and unknown rooms are both not-found.
    #[instrument(skip_all, name = "room.lifecycle.find_active_by_code")]
    pub async fn find_active_by_code(&self, room_code: &str) -> Result<RoomRecord, RoomError> {
        if !looks_like_room_code(room_code) {
            return Err(RoomError::NotFound(ROOM_NOT_FOUND.to_string()));
        }

        match self.repo.find_room_by_code(room_code).await? {
            Some(record) if record.room.is_active() => Ok(record),
            _ => Err(RoomError::NotFound(ROOM_NOT_FOUND.to_string())),
        }
    }

    /// End a room: status becomes `ended`, the membership set is cleared and
    /// every listed member's record is stamped with the end time.
    pub fn end(record: &RoomRecord, members: &[Participant], now: DateTime<Utc>) -> RoomCommit {
        let mut room = record.room.clone();
        room.status = RoomStatus::Ended;
        room.ended_at = Some(now);
        room.participants.clear();

        let updated = members
            .iter()
            .filter(|p| p.is_active() && record.room.lists(p.participant_id))
            .map(|p| Participant {
                left_at: Some(now),
                ..p.clone()
            })
            .collect();

        RoomCommit {
            room,
            expected_version: record.version,
            inserted: Vec::new(),
            updated,
        }
    }

    /// Apply a partial settings update. Absent keys keep their value.
    pub fn update_settings(record: &RoomRecord, patch: &SettingsPatch) -> RoomCommit {
        let mut room = record.room.clone();
        room.settings = patch.apply_to(room.settings);
        RoomCommit::room_only(room, record.version)
    }

    /// One page of the host's ended rooms, newest first.
    #[instrument(skip_all, name = "room.lifecycle.list_history", fields(host_user_id = %host_user_id))]
    pub async fn list_history(
        &self,
        host_user_id: UserId,
        before: Option<HistoryCursor>,
        limit: u32,
    ) -> Result<HistoryPage, RoomError> {
        // One extra row tells us whether another page exists.
        let mut rooms = self
            .repo
            .list_history(host_user_id, before, limit.saturating_add(1))
            .await?;

        let has_more = rooms.len() > limit as usize;
        rooms.truncate(limit as usize);
        let next_before = if has_more {
            rooms.last().map(HistoryCursor::after)
        } else {
            None
        };

        Ok(HistoryPage { rooms, next_before })
    }

    /// Permanently delete the host's ended rooms.
    #[instrument(skip_all, name = "room.lifecycle.purge_history", fields(host_user_id = %host_user_id))]
    pub async fn purge_history(&self, host_user_id: UserId) -> Result<u64, RoomError> {
        let deleted = self.repo.delete_history(host_user_id).await?;
        tracing::info!(target: "room.coordinator", deleted, "Room history purged");
        Ok(deleted)
    }
}
