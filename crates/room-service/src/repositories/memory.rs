//! In-memory room repository.
//!
//! Mirrors the PostgreSQL repository's semantics: unique room codes, at most
//! one active membership per (room, user), version-checked commits that
//! apply fully or not at all. Every write holds the state lock for its whole
//! duration, which gives the same atomicity a transaction does.
//!
//! Fault injection lets tests force conflicts, outages and slow commits:
//!
//! ```rust,ignore
//! let repo = InMemoryRoomRepository::new().with_profile(profile);
//! repo.inject_commit_conflicts(2);
//! repo.inject_unavailable(1);
//! repo.set_commit_delay(Duration::from_millis(200));
//! ```

use super::{constraints, RoomCommit, RoomRepository, StoreError};
use crate::models::{HistoryCursor, Participant, Room, RoomRecord, RoomStatus, UserProfile};
use async_trait::async_trait;
use common::types::{ParticipantId, RoomId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::instrument;

#[derive(Debug, Default)]
struct State {
    rooms: HashMap<RoomId, RoomRecord>,
    codes: HashMap<String, RoomId>,
    participants: HashMap<ParticipantId, Participant>,
    profiles: HashMap<UserId, UserProfile>,
}

impl State {
    fn has_active_membership(&self, room_id: RoomId, user_id: UserId) -> bool {
        self.participants
            .values()
            .any(|p| p.room_id == room_id && p.user_id == user_id && p.is_active())
    }
}

/// Room repository held entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRoomRepository {
    state: RwLock<State>,
    pending_conflicts: AtomicU32,
    pending_outages: AtomicU32,
    commit_delay_ms: AtomicU64,
}

/// Consume one unit from a fault counter, if any remain.
fn take_fault(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl InMemoryRoomRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an identity profile.
    #[must_use]
    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.state
            .get_mut()
            .profiles
            .insert(profile.user_id, profile);
        self
    }

    /// Add or replace an identity profile.
    pub async fn put_profile(&self, profile: UserProfile) {
        self.state
            .write()
            .await
            .profiles
            .insert(profile.user_id, profile);
    }

    /// The next `count` commits fail with `VersionConflict` without applying.
    pub fn inject_commit_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// The next `count` repository calls of any kind fail with `Unavailable`.
    pub fn inject_unavailable(&self, count: u32) {
        self.pending_outages.store(count, Ordering::SeqCst);
    }

    /// Sleep this long inside every commit and insert before applying it.
    pub fn set_commit_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.commit_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of participant records of any state stored for a room.
    pub async fn participant_record_count(&self, room_id: RoomId) -> usize {
        self.state
            .read()
            .await
            .participants
            .values()
            .filter(|p| p.room_id == room_id)
            .count()
    }

    fn check_outage(&self) -> Result<(), StoreError> {
        if take_fault(&self.pending_outages) {
            return Err(StoreError::Unavailable(
                "injected store outage".to_string(),
            ));
        }
        Ok(())
    }

    async fn commit_delay(&self) {
        let millis = self.commit_delay_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    #[instrument(skip_all, name = "room.repo.memory.insert_room")]
    async fn insert_room(
        &self,
        room: &Room,
        host: &Participant,
    ) -> Result<RoomRecord, StoreError> {
        self.check_outage()?;
        self.commit_delay().await;

        let mut state = self.state.write().await;
        if state.codes.contains_key(&room.room_code) {
            return Err(StoreError::UniqueViolation(constraints::ROOM_CODE.to_string()));
        }

        let record = RoomRecord {
            room: room.clone(),
            version: 1,
        };
        state.codes.insert(room.room_code.clone(), room.room_id);
        state.rooms.insert(room.room_id, record.clone());
        state.participants.insert(host.participant_id, host.clone());

        Ok(record)
    }

    async fn find_room_by_code(&self, room_code: &str) -> Result<Option<RoomRecord>, StoreError> {
        self.check_outage()?;
        let state = self.state.read().await;
        Ok(state
            .codes
            .get(room_code)
            .and_then(|room_id| state.rooms.get(room_id))
            .cloned())
    }

    async fn find_room(&self, room_id: RoomId) -> Result<Option<RoomRecord>, StoreError> {
        self.check_outage()?;
        Ok(self.state.read().await.rooms.get(&room_id).cloned())
    }

    async fn find_active_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Participant>, StoreError> {
        self.check_outage()?;
        let state = self.state.read().await;
        Ok(state
            .participants
            .values()
            .find(|p| p.room_id == room_id && p.user_id == user_id && p.is_active())
            .cloned())
    }

    async fn find_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Option<Participant>, StoreError> {
        self.check_outage()?;
        Ok(self
            .state
            .read()
            .await
            .participants
            .get(&participant_id)
            .cloned())
    }

    async fn list_participants(
        &self,
        participant_ids: &[ParticipantId],
    ) -> Result<Vec<Participant>, StoreError> {
        self.check_outage()?;
        let state = self.state.read().await;
        Ok(participant_ids
            .iter()
            .filter_map(|id| state.participants.get(id).cloned())
            .collect())
    }

    #[instrument(skip_all, name = "room.repo.memory.commit", fields(room_id = %commit.room.room_id))]
    async fn commit(&self, commit: &RoomCommit) -> Result<RoomRecord, StoreError> {
        self.check_outage()?;
        self.commit_delay().await;

        if take_fault(&self.pending_conflicts) {
            return Err(StoreError::VersionConflict);
        }

        let mut state = self.state.write().await;
        let room_id = commit.room.room_id;

        let current_version = match state.rooms.get(&room_id) {
            Some(record) => record.version,
            None => return Err(StoreError::VersionConflict),
        };
        if current_version != commit.expected_version {
            return Err(StoreError::VersionConflict);
        }

        // Validate everything before touching state so a rejected commit
        // leaves nothing behind.
        let mut active_after_updates: Vec<(RoomId, UserId)> = Vec::new();
        for updated in &commit.updated {
            if !state.participants.contains_key(&updated.participant_id) {
                return Err(StoreError::Corrupt(format!(
                    "participant {} does not exist",
                    updated.participant_id
                )));
            }
            if updated.is_active() {
                active_after_updates.push((updated.room_id, updated.user_id));
            }
        }
        for inserted in &commit.inserted {
            let retired_by_update = commit.updated.iter().any(|u| {
                u.room_id == inserted.room_id && u.user_id == inserted.user_id && !u.is_active()
            });
            let clashes_existing = state.has_active_membership(inserted.room_id, inserted.user_id)
                && !retired_by_update;
            let clashes_in_commit =
                active_after_updates.contains(&(inserted.room_id, inserted.user_id));
            if clashes_existing || clashes_in_commit {
                return Err(StoreError::UniqueViolation(
                    constraints::ACTIVE_MEMBERSHIP.to_string(),
                ));
            }
            active_after_updates.push((inserted.room_id, inserted.user_id));
        }

        for updated in &commit.updated {
            state
                .participants
                .insert(updated.participant_id, updated.clone());
        }
        for inserted in &commit.inserted {
            state
                .participants
                .insert(inserted.participant_id, inserted.clone());
        }

        let record = RoomRecord {
            room: commit.room.clone(),
            version: current_version + 1,
        };
        state.rooms.insert(room_id, record.clone());

        Ok(record)
    }

    async fn list_history(
        &self,
        host_user_id: UserId,
        before: Option<HistoryCursor>,
        limit: u32,
    ) -> Result<Vec<Room>, StoreError> {
        self.check_outage()?;
        let state = self.state.read().await;

        let mut rooms: Vec<Room> = state
            .rooms
            .values()
            .map(|record| &record.room)
            .filter(|room| room.host_user_id == host_user_id && room.status == RoomStatus::Ended)
            .filter(|room| before.map_or(true, |cursor| cursor.precedes(room)))
            .cloned()
            .collect();

        rooms.sort_by(|a, b| (b.created_at, b.room_id).cmp(&(a.created_at, a.room_id)));
        rooms.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rooms)
    }

    #[instrument(skip_all, name = "room.repo.memory.delete_history")]
    async fn delete_history(&self, host_user_id: UserId) -> Result<u64, StoreError> {
        self.check_outage()?;
        let mut state = self.state.write().await;

        let doomed: Vec<(RoomId, String)> = state
            .rooms
            .values()
            .filter(|r| r.room.host_user_id == host_user_id && r.room.status == RoomStatus::Ended)
            .map(|r| (r.room.room_id, r.room.room_code.clone()))
            .collect();

        for (room_id, room_code) in &doomed {
            state.rooms.remove(room_id);
            state.codes.remove(room_code);
            state.participants.retain(|_, p| p.room_id != *room_id);
        }

        Ok(doomed.len() as u64)
    }

    async fn find_profiles(&self, user_ids: &[UserId]) -> Result<Vec<UserProfile>, StoreError> {
        self.check_outage()?;
        let state = self.state.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| state.profiles.get(id).cloned())
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_outage()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::models::{FeatureToggles, ParticipantRole};
    use chrono::Utc;

    fn new_room(host: UserId, code: &str) -> (Room, Participant) {
        let room_id = RoomId::new();
        let host_record = Participant::new(room_id, host, ParticipantRole::Host);
        let room = Room {
            room_id,
            title: "Standup".to_string(),
            host_user_id: host,
            room_code: code.to_string(),
            status: RoomStatus::Active,
            settings: FeatureToggles::default(),
            participants: vec![host_record.participant_id],
            created_at: Utc::now(),
            ended_at: None,
        };
        (room, host_record)
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_code() {
        let repo = InMemoryRoomRepository::new();
        let (room, host) = new_room(UserId::new(), "dupcode00001");
        repo.insert_room(&room, &host).await.unwrap();

        let (other, other_host) = new_room(UserId::new(), "dupcode00001");
        let err = repo.insert_room(&other, &other_host).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::UniqueViolation(constraints::ROOM_CODE.to_string())
        );
    }

    #[tokio::test]
    async fn test_commit_with_stale_version_changes_nothing() {
        let repo = InMemoryRoomRepository::new();
        let (room, host) = new_room(UserId::new(), "stalever0001");
        let record = repo.insert_room(&room, &host).await.unwrap();

        let joiner = Participant::new(room.room_id, UserId::new(), ParticipantRole::Participant);
        let mut next = record.room.clone();
        next.participants.push(joiner.participant_id);

        let stale = RoomCommit {
            room: next,
            expected_version: record.version + 7,
            inserted: vec![joiner.clone()],
            updated: Vec::new(),
        };
        assert_eq!(
            repo.commit(&stale).await.unwrap_err(),
            StoreError::VersionConflict
        );
        assert!(repo
            .find_participant(joiner.participant_id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            repo.find_room(room.room_id).await.unwrap().unwrap().version,
            record.version
        );
    }

    #[tokio::test]
    async fn test_commit_rejects_second_active_membership() {
        let repo = InMemoryRoomRepository::new();
        let host_user = UserId::new();
        let (room, host) = new_room(host_user, "twoactive001");
        let record = repo.insert_room(&room, &host).await.unwrap();

        let duplicate = Participant::new(room.room_id, host_user, ParticipantRole::Host);
        let commit = RoomCommit {
            room: record.room.clone(),
            expected_version: record.version,
            inserted: vec![duplicate],
            updated: Vec::new(),
        };
        assert!(matches!(
            repo.commit(&commit).await,
            Err(StoreError::UniqueViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_bumps_version_and_applies_all_parts() {
        let repo = InMemoryRoomRepository::new();
        let (room, host) = new_room(UserId::new(), "applyall0001");
        let record = repo.insert_room(&room, &host).await.unwrap();

        let mut left = host.clone();
        left.left_at = Some(Utc::now());
        let mut next = record.room.clone();
        next.participants.clear();

        let committed = repo
            .commit(&RoomCommit {
                room: next,
                expected_version: record.version,
                inserted: Vec::new(),
                updated: vec![left],
            })
            .await
            .unwrap();

        assert_eq!(committed.version, record.version + 1);
        assert!(committed.room.participants.is_empty());
        let stored = repo.find_participant(host.participant_id).await.unwrap().unwrap();
        assert!(!stored.is_active());
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed() {
        let repo = InMemoryRoomRepository::new();
        repo.inject_unavailable(1);
        assert!(matches!(repo.ping().await, Err(StoreError::Unavailable(_))));
        assert!(repo.ping().await.is_ok());

        let (room, host) = new_room(UserId::new(), "injected0001");
        let record = repo.insert_room(&room, &host).await.unwrap();
        repo.inject_commit_conflicts(1);
        let commit = RoomCommit::room_only(record.room.clone(), record.version);
        assert_eq!(
            repo.commit(&commit).await.unwrap_err(),
            StoreError::VersionConflict
        );
        assert!(repo.commit(&commit).await.is_ok());
    }

    #[tokio::test]
    async fn test_history_newest_first_and_purge() {
        let repo = InMemoryRoomRepository::new();
        let host_user = UserId::new();

        for (offset, code) in [(30, "hist00000001"), (20, "hist00000002"), (10, "hist00000003")] {
            let (mut room, host) = new_room(host_user, code);
            room.created_at = Utc::now() - chrono::Duration::minutes(offset);
            let record = repo.insert_room(&room, &host).await.unwrap();
            let mut ended = record.room.clone();
            ended.status = RoomStatus::Ended;
            repo.commit(&RoomCommit::room_only(ended, record.version))
                .await
                .unwrap();
        }
        let (active, active_host) = new_room(host_user, "stillactive1");
        repo.insert_room(&active, &active_host).await.unwrap();

        let page = repo.list_history(host_user, None, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].room_code, "hist00000003");
        assert_eq!(page[1].room_code, "hist00000002");

        let rest = repo
            .list_history(host_user, Some(HistoryCursor::after(&page[1])), 10)
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].room_code, "hist00000001");

        assert_eq!(repo.delete_history(host_user).await.unwrap(), 3);
        assert!(repo.list_history(host_user, None, 10).await.unwrap().is_empty());
        assert!(repo
            .find_room_by_code("stillactive1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_history_orders_timestamp_ties_by_room_id() {
        let repo = InMemoryRoomRepository::new();
        let host_user = UserId::new();
        let created_at = Utc::now();

        for code in ["tied00000001", "tied00000002", "tied00000003"] {
            let (mut room, host) = new_room(host_user, code);
            room.created_at = created_at;
            let record = repo.insert_room(&room, &host).await.unwrap();
            let mut ended = record.room.clone();
            ended.status = RoomStatus::Ended;
            repo.commit(&RoomCommit::room_only(ended, record.version))
                .await
                .unwrap();
        }

        let all = repo.list_history(host_user, None, 10).await.unwrap();
        let mut expected: Vec<RoomId> = all.iter().map(|r| r.room_id).collect();
        expected.sort_by(|a, b| b.cmp(a));
        assert_eq!(all.iter().map(|r| r.room_id).collect::<Vec<_>>(), expected);

        let first = repo.list_history(host_user, None, 1).await.unwrap();
        let rest = repo
            .list_history(host_user, Some(HistoryCursor::after(&first[0])), 10)
            .await
            .unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].room_id, expected[1]);
        assert_eq!(rest[1].room_id, expected[2]);
    }
}
