//! Membership Ledger.
//!
//! Plans membership transitions (join, leave, role change) against a room
//! record the caller has just read, and projects rooms into resolved
//! snapshots. Every planned change carries the room update and the
//! participant writes together, so the room's list and the records can
//! never be observed out of step.

use crate::errors::RoomError;
use crate::models::{
    Participant, ParticipantRole, ResolvedParticipant, RoomRecord, RoomSnapshot, UserProfile,
};
use crate::repositories::{RoomCommit, RoomRepository};
use chrono::Utc;
use common::types::{ParticipantId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Outcome of planning a join.
#[derive(Debug, Clone)]
pub enum JoinPlan {
    /// The user already holds an active membership; nothing to write.
    AlreadyMember(Participant),

    /// Write `commit` to enroll `participant`.
    Enroll {
        participant: Participant,
        commit: RoomCommit,
    },
}

pub struct MembershipLedger {
    repo: Arc<dyn RoomRepository>,
}

impl MembershipLedger {
    pub fn new(repo: Arc<dyn RoomRepository>) -> Self {
        Self { repo }
    }

    /// The user's active membership in this room, if the room still lists it.
    pub async fn member_record(
        &self,
        record: &RoomRecord,
        user_id: UserId,
    ) -> Result<Option<Participant>, RoomError> {
        let found = self
            .repo
            .find_active_participant(record.room.room_id, user_id)
            .await?;
        Ok(found.filter(|p| record.room.lists(p.participant_id)))
    }

    /// Plan a join. Existing members get their current record back.
    #[instrument(skip_all, name = "room.ledger.join", fields(room_id = %record.room.room_id))]
    pub async fn plan_join(
        &self,
        record: &RoomRecord,
        user_id: UserId,
    ) -> Result<JoinPlan, RoomError> {
        let existing = self
            .repo
            .find_active_participant(record.room.room_id, user_id)
            .await?;

        let mut retired = Vec::new();
        if let Some(current) = existing {
            if record.room.lists(current.participant_id) {
                return Ok(JoinPlan::AlreadyMember(current));
            }
            // Active record the room no longer lists: close it out so the
            // fresh record does not trip the one-active-membership rule.
            tracing::warn!(
                target: "room.coordinator",
                participant_id = %current.participant_id,
                "Retiring unlisted active participant record"
            );
            retired.push(Participant {
                left_at: Some(Utc::now()),
                ..current
            });
        }

        let role = if user_id == record.room.host_user_id {
            ParticipantRole::Host
        } else {
            ParticipantRole::Participant
        };
        let participant = Participant::new(record.room.room_id, user_id, role);

        let mut room = record.room.clone();
        room.participants.push(participant.participant_id);

        Ok(JoinPlan::Enroll {
            commit: RoomCommit {
                room,
                expected_version: record.version,
                inserted: vec![participant.clone()],
                updated: retired,
            },
            participant,
        })
    }

    /// Plan a leave. Fails with `NotFound` if the user is not a member.
    #[instrument(skip_all, name = "room.ledger.leave", fields(room_id = %record.room.room_id))]
    pub async fn plan_leave(
        &self,
        record: &RoomRecord,
        user_id: UserId,
    ) -> Result<RoomCommit, RoomError> {
        let member = self.member_record(record, user_id).await?.ok_or_else(|| {
            RoomError::NotFound("You are not a participant in this room".to_string())
        })?;

        let mut room = record.room.clone();
        room.participants.retain(|id| *id != member.participant_id);

        Ok(RoomCommit {
            room,
            expected_version: record.version,
            inserted: Vec::new(),
            updated: vec![Participant {
                left_at: Some(Utc::now()),
                ..member
            }],
        })
    }

    /// Plan a role change for a member of this room.
    ///
    /// Returns the updated participant and, if the role actually changes,
    /// the commit that records it.
    #[instrument(skip_all, name = "room.ledger.set_role", fields(room_id = %record.room.room_id))]
    pub async fn plan_set_role(
        &self,
        record: &RoomRecord,
        participant_id: ParticipantId,
        role: ParticipantRole,
    ) -> Result<(Participant, Option<RoomCommit>), RoomError> {
        let target = self
            .repo
            .find_participant(participant_id)
            .await?
            .filter(|p| {
                p.room_id == record.room.room_id
                    && p.is_active()
                    && record.room.lists(p.participant_id)
            })
            .ok_or_else(|| {
                RoomError::NotFound("Participant not found in this room".to_string())
            })?;

        if target.role == role {
            return Ok((target, None));
        }

        let updated = Participant { role, ..target };
        let commit = RoomCommit {
            room: record.room.clone(),
            expected_version: record.version,
            inserted: Vec::new(),
            updated: vec![updated.clone()],
        };
        Ok((updated, Some(commit)))
    }

    /// Project a room into its resolved read model.
    ///
    /// Reads the current participant records and profiles on every call.
    /// Users without a profile are shown by their user id.
    #[instrument(skip_all, name = "room.ledger.snapshot", fields(room_id = %record.room.room_id))]
    pub async fn snapshot(&self, record: &RoomRecord) -> Result<RoomSnapshot, RoomError> {
        let room = &record.room;

        let members: Vec<Participant> = self
            .repo
            .list_participants(&room.participants)
            .await?
            .into_iter()
            .filter(Participant::is_active)
            .collect();

        let user_ids: Vec<UserId> = members.iter().map(|p| p.user_id).collect();
        let profiles: HashMap<UserId, UserProfile> = self
            .repo
            .find_profiles(&user_ids)
            .await?
            .into_iter()
            .map(|profile| (profile.user_id, profile))
            .collect();

        let participants = members
            .into_iter()
            .map(|p| {
                let profile = profiles.get(&p.user_id);
                resolve(p, profile)
            })
            .collect();

        Ok(RoomSnapshot {
            room_id: room.room_id,
            title: room.title.clone(),
            host_user_id: room.host_user_id,
            room_code: room.room_code.clone(),
            status: room.status,
            settings: room.settings,
            participants,
            created_at: room.created_at,
        })
    }
}

fn resolve(participant: Participant, profile: Option<&UserProfile>) -> ResolvedParticipant {
    let (display_name, avatar_url) = match profile {
        Some(profile) => (profile.display_name.clone(), profile.avatar_url.clone()),
        None => (participant.user_id.to_string(), None),
    };

    ResolvedParticipant {
        participant_id: participant.participant_id,
        user_id: participant.user_id,
        display_name,
        avatar_url,
        role: participant.role,
        permissions: participant.permissions,
        joined_at: participant.joined_at,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::models::{FeatureToggles, Room, RoomStatus};
    use crate::repositories::InMemoryRoomRepository;
    use common::types::RoomId;

    async fn seeded(host: UserId) -> (Arc<InMemoryRoomRepository>, MembershipLedger, RoomRecord) {
        let repo = Arc::new(
            InMemoryRoomRepository::new().with_profile(UserProfile {
                user_id: host,
                display_name: "Alice".to_string(),
                avatar_url: Some("https://cdn.example.test/alice.png".to_string()),
            }),
        );
        let room_id = RoomId::new();
        let host_record = Participant::new(room_id, host, ParticipantRole::Host);
        let room = Room {
            room_id,
            title: "Standup".to_string(),
            host_user_id: host,
            room_code: "Ab3dE6gH9jKm".to_string(),
            status: RoomStatus::Active,
            settings: FeatureToggles::default(),
            participants: vec![host_record.participant_id],
            created_at: Utc::now(),
            ended_at: None,
        };
        let record = repo.insert_room(&room, &host_record).await.unwrap();
        let ledger = MembershipLedger::new(repo.clone());
        (repo, ledger, record)
    }

    #[tokio::test]
    async fn test_join_plans_participant_role_for_non_host() {
        let (_repo, ledger, record) = seeded(UserId::new()).await;
        let guest = UserId::new();

        match ledger.plan_join(&record, guest).await.unwrap() {
            JoinPlan::Enroll {
                participant,
                commit,
            } => {
                assert_eq!(participant.role, ParticipantRole::Participant);
                assert!(commit.room.lists(participant.participant_id));
                assert_eq!(commit.inserted.len(), 1);
                assert!(commit.updated.is_empty());
            }
            JoinPlan::AlreadyMember(_) => panic!("guest is not a member yet"),
        }
    }

    #[tokio::test]
    async fn test_join_returns_existing_membership() {
        let host = UserId::new();
        let (_repo, ledger, record) = seeded(host).await;

        match ledger.plan_join(&record, host).await.unwrap() {
            JoinPlan::AlreadyMember(p) => assert_eq!(p.participant_id, record.room.participants[0]),
            JoinPlan::Enroll { .. } => panic!("host is already enrolled"),
        }
    }

    #[tokio::test]
    async fn test_host_rejoining_after_leave_gets_host_role() {
        let host = UserId::new();
        let (repo, ledger, record) = seeded(host).await;

        let leave = ledger.plan_leave(&record, host).await.unwrap();
        let record = repo.commit(&leave).await.unwrap();
        assert!(record.room.participants.is_empty());

        match ledger.plan_join(&record, host).await.unwrap() {
            JoinPlan::Enroll { participant, .. } => {
                assert_eq!(participant.role, ParticipantRole::Host);
            }
            JoinPlan::AlreadyMember(_) => panic!("host left the room"),
        }
    }

    #[tokio::test]
    async fn test_leave_without_membership_is_not_found() {
        let (_repo, ledger, record) = seeded(UserId::new()).await;
        assert!(matches!(
            ledger.plan_leave(&record, UserId::new()).await,
            Err(RoomError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_role_rejects_participant_of_another_room() {
        let (_repo, ledger, record) = seeded(UserId::new()).await;
        let (_other_repo, _other_ledger, other) = seeded(UserId::new()).await;

        let result = ledger
            .plan_set_role(&record, other.room.participants[0], ParticipantRole::Host)
            .await;
        assert!(matches!(result, Err(RoomError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_role_same_role_is_noop() {
        let (_repo, ledger, record) = seeded(UserId::new()).await;
        let (participant, commit) = ledger
            .plan_set_role(&record, record.room.participants[0], ParticipantRole::Host)
            .await
            .unwrap();
        assert_eq!(participant.role, ParticipantRole::Host);
        assert!(commit.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_resolves_profiles_with_fallback() {
        let host = UserId::new();
        let (repo, ledger, record) = seeded(host).await;
        let guest = UserId::new();

        let JoinPlan::Enroll { commit, .. } = ledger.plan_join(&record, guest).await.unwrap() else {
            panic!("guest should enroll");
        };
        let record = repo.commit(&commit).await.unwrap();

        let snapshot = ledger.snapshot(&record).await.unwrap();
        assert_eq!(snapshot.participants.len(), 2);

        let host_entry = snapshot.participant_for(host).unwrap();
        assert_eq!(host_entry.display_name, "Alice");
        assert!(host_entry.avatar_url.is_some());

        let guest_entry = snapshot.participant_for(guest).unwrap();
        assert_eq!(guest_entry.display_name, guest.to_string());
        assert_eq!(guest_entry.role, ParticipantRole::Participant);
    }
}
