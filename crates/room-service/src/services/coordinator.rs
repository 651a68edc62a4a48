//! Room Coordinator.
//!
//! Sequences one logical room operation: load the room by code, check the
//! authorization policy, plan the lifecycle or ledger transition, commit it
//! atomically, and return the refreshed read model.
//!
//! # Concurrency
//!
//! Nothing is cached between requests. Each attempt re-reads the room and
//! the actor's membership before deciding anything. Commits are conditional
//! on the room version; a lost race (version conflict, or a second active
//! membership rejected by the store) re-runs the whole attempt, at most
//! `conflict_retries` extra times, then surfaces `Conflict`.
//!
//! Every operation runs under `operation_timeout`. A timeout is reported as
//! `Timeout` and never retried here.

use crate::errors::RoomError;
use crate::models::{
    HistoryCursor, HistoryPage, Participant, ParticipantRole, RoomRecord, RoomSnapshot,
    SettingsPatch,
};
use crate::observability::metrics;
use crate::policy::{self, Action};
use crate::repositories::{RoomRepository, StoreError};
use crate::services::codes::RoomCodeSource;
use crate::services::ledger::{JoinPlan, MembershipLedger};
use crate::services::lifecycle::RoomLifecycle;
use chrono::Utc;
use common::types::{ParticipantId, UserId};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Tunables for the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Extra attempts after a lost optimistic-concurrency race.
    pub conflict_retries: u32,

    /// Extra attempts after a room code collision.
    pub code_retries: u32,

    /// Deadline for one whole operation, retries included.
    pub operation_timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            conflict_retries: 3,
            code_retries: 3,
            operation_timeout: Duration::from_millis(5000),
        }
    }
}

/// Failure of a single attempt.
enum AttemptError {
    /// Lost a race; re-read and try again.
    Conflict(StoreError),
    Fail(RoomError),
}

impl From<RoomError> for AttemptError {
    fn from(err: RoomError) -> Self {
        AttemptError::Fail(err)
    }
}

impl From<StoreError> for AttemptError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict | StoreError::UniqueViolation(_) => {
                AttemptError::Conflict(err)
            }
            other => AttemptError::Fail(other.into()),
        }
    }
}

type AttemptResult<T> = Result<T, AttemptError>;

pub struct RoomCoordinator {
    repo: Arc<dyn RoomRepository>,
    lifecycle: RoomLifecycle,
    ledger: MembershipLedger,
    settings: CoordinatorSettings,
}

impl RoomCoordinator {
    pub fn new(
        repo: Arc<dyn RoomRepository>,
        codes: Arc<dyn RoomCodeSource>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            lifecycle: RoomLifecycle::new(repo.clone(), codes, settings.code_retries),
            ledger: MembershipLedger::new(repo.clone()),
            repo,
            settings,
        }
    }

    pub fn settings(&self) -> CoordinatorSettings {
        self.settings
    }

    /// Create a room hosted by `host_user_id`; the host is its first member.
    #[instrument(skip_all, name = "room.create_room", fields(user_id = %host_user_id))]
    pub async fn create_room(
        &self,
        title: &str,
        host_user_id: UserId,
    ) -> Result<RoomSnapshot, RoomError> {
        self.run("create_room", async {
            let record = self.lifecycle.create(title, host_user_id).await?;
            self.ledger.snapshot(&record).await
        })
        .await
    }

    /// Resolved view of an active room, for its members and its creator.
    #[instrument(skip_all, name = "room.get_room", fields(room_code = %room_code, user_id = %user_id))]
    pub async fn get_room(
        &self,
        room_code: &str,
        user_id: UserId,
    ) -> Result<RoomSnapshot, RoomError> {
        self.run("get_room", async {
            let record = self.lifecycle.find_active_by_code(room_code).await?;
            let is_member = self.ledger.member_record(&record, user_id).await?.is_some();
            if !is_member && record.room.host_user_id != user_id {
                return Err(RoomError::NotFound(
                    "Room not found or has ended".to_string(),
                ));
            }
            self.ledger.snapshot(&record).await
        })
        .await
    }

    /// Join a room by code. Joining twice returns the existing membership.
    #[instrument(skip_all, name = "room.join_room", fields(room_code = %room_code, user_id = %user_id))]
    pub async fn join_room(
        &self,
        room_code: &str,
        user_id: UserId,
    ) -> Result<RoomSnapshot, RoomError> {
        self.run(
            "join_room",
            self.with_conflict_retry("join_room", || async move {
                let record = self.lifecycle.find_active_by_code(room_code).await?;
                policy::can_act(&record.room, user_id, Action::Join, None).into_result()?;

                let record = match self.ledger.plan_join(&record, user_id).await? {
                    JoinPlan::AlreadyMember(existing) => {
                        tracing::debug!(
                            target: "room.coordinator",
                            participant_id = %existing.participant_id,
                            "Already a member, join is a no-op"
                        );
                        record
                    }
                    JoinPlan::Enroll {
                        participant,
                        commit,
                    } => {
                        let committed = self.repo.commit(&commit).await?;
                        tracing::info!(
                            target: "room.coordinator",
                            room_id = %committed.room.room_id,
                            participant_id = %participant.participant_id,
                            role = %participant.role,
                            "Participant joined"
                        );
                        committed
                    }
                };

                Ok::<_, AttemptError>(self.ledger.snapshot(&record).await?)
            }),
        )
        .await
    }

    /// Leave a room. The room stays active even if its host leaves.
    #[instrument(skip_all, name = "room.leave_room", fields(room_code = %room_code, user_id = %user_id))]
    pub async fn leave_room(&self, room_code: &str, user_id: UserId) -> Result<(), RoomError> {
        self.run(
            "leave_room",
            self.with_conflict_retry("leave_room", || async move {
                let record = self.lifecycle.find_active_by_code(room_code).await?;
                policy::can_act(&record.room, user_id, Action::Leave { member: user_id }, None)
                    .into_result()?;

                let commit = self.ledger.plan_leave(&record, user_id).await?;
                self.repo.commit(&commit).await?;
                tracing::info!(
                    target: "room.coordinator",
                    room_id = %record.room.room_id,
                    "Participant left"
                );
                Ok::<_, AttemptError>(())
            }),
        )
        .await
    }

    /// End a room. Terminal: the room drops out of code lookups and its
    /// membership set is emptied.
    #[instrument(skip_all, name = "room.end_room", fields(room_code = %room_code, user_id = %actor_id))]
    pub async fn end_room(&self, room_code: &str, actor_id: UserId) -> Result<(), RoomError> {
        self.run(
            "end_room",
            self.with_conflict_retry("end_room", || async move {
                let record = self.authorized(room_code, actor_id, Action::End).await?;

                let members = self.repo.list_participants(&record.room.participants).await?;
                let commit = RoomLifecycle::end(&record, &members, Utc::now());
                self.repo.commit(&commit).await?;
                tracing::info!(
                    target: "room.coordinator",
                    room_id = %record.room.room_id,
                    released = commit.updated.len(),
                    "Room ended"
                );
                Ok::<_, AttemptError>(())
            }),
        )
        .await
    }

    /// Partially update a room's feature toggles.
    #[instrument(skip_all, name = "room.update_settings", fields(room_code = %room_code, user_id = %actor_id))]
    pub async fn update_settings(
        &self,
        room_code: &str,
        actor_id: UserId,
        patch: SettingsPatch,
    ) -> Result<RoomSnapshot, RoomError> {
        if !patch.has_changes() {
            return Err(RoomError::Validation(
                "At least one setting must be provided".to_string(),
            ));
        }

        self.run(
            "update_settings",
            self.with_conflict_retry("update_settings", || async move {
                let record = self
                    .authorized(room_code, actor_id, Action::UpdateSettings)
                    .await?;

                let commit = RoomLifecycle::update_settings(&record, &patch);
                let committed = self.repo.commit(&commit).await?;
                Ok::<_, AttemptError>(self.ledger.snapshot(&committed).await?)
            }),
        )
        .await
    }

    /// Change a participant's role. Only the room's creator may do this.
    ///
    /// `role` must be `host` or `participant`.
    #[instrument(
        skip_all,
        name = "room.set_participant_role",
        fields(room_code = %room_code, user_id = %actor_id, participant_id = %participant_id)
    )]
    pub async fn set_participant_role(
        &self,
        room_code: &str,
        actor_id: UserId,
        participant_id: ParticipantId,
        role: &str,
    ) -> Result<Participant, RoomError> {
        let role: ParticipantRole = role
            .parse()
            .map_err(|e| RoomError::Validation(format!("Invalid role: {e}")))?;

        self.run(
            "set_participant_role",
            self.with_conflict_retry("set_participant_role", || async move {
                let record = self.authorized(room_code, actor_id, Action::SetRole).await?;

                let (participant, commit) = self
                    .ledger
                    .plan_set_role(&record, participant_id, role)
                    .await?;
                if let Some(commit) = commit {
                    self.repo.commit(&commit).await?;
                    tracing::info!(
                        target: "room.coordinator",
                        room_id = %record.room.room_id,
                        participant_id = %participant.participant_id,
                        role = %participant.role,
                        "Participant role changed"
                    );
                }
                Ok::<_, AttemptError>(participant)
            }),
        )
        .await
    }

    /// A page of the caller's ended rooms, newest first.
    #[instrument(skip_all, name = "room.get_history", fields(user_id = %host_user_id))]
    pub async fn get_history(
        &self,
        host_user_id: UserId,
        before: Option<HistoryCursor>,
        limit: u32,
    ) -> Result<HistoryPage, RoomError> {
        self.run(
            "get_history",
            self.lifecycle.list_history(host_user_id, before, limit),
        )
        .await
    }

    /// Delete the caller's ended rooms. Returns how many were removed.
    #[instrument(skip_all, name = "room.purge_history", fields(user_id = %host_user_id))]
    pub async fn purge_history(&self, host_user_id: UserId) -> Result<u64, RoomError> {
        self.run("purge_history", self.lifecycle.purge_history(host_user_id))
            .await
    }

    /// Store connectivity, for readiness probes.
    pub async fn store_ready(&self) -> bool {
        self.repo.ping().await.is_ok()
    }

    /// Load the active room and check `action` for `actor_id` against the
    /// actor's current membership.
    async fn authorized(
        &self,
        room_code: &str,
        actor_id: UserId,
        action: Action,
    ) -> Result<RoomRecord, RoomError> {
        let record = self.lifecycle.find_active_by_code(room_code).await?;
        let actor_record = self.ledger.member_record(&record, actor_id).await?;

        let decision = policy::can_act(&record.room, actor_id, action, actor_record.as_ref());
        if !decision.is_allowed() {
            tracing::warn!(
                target: "room.coordinator",
                room_id = %record.room.room_id,
                action = action.as_str(),
                decision = ?decision,
                "Action denied"
            );
        }
        decision.into_result()?;
        Ok(record)
    }

    /// Re-run `attempt` after lost races, up to `conflict_retries` times.
    async fn with_conflict_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> Result<T, RoomError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AttemptResult<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fail(err)) => return Err(err),
                Err(AttemptError::Conflict(cause)) => {
                    if retries >= self.settings.conflict_retries {
                        tracing::warn!(
                            target: "room.coordinator",
                            operation,
                            attempts = retries + 1,
                            cause = %cause,
                            "Conflict retries exhausted"
                        );
                        return Err(RoomError::Conflict(
                            "Room is busy, please retry".to_string(),
                        ));
                    }
                    retries += 1;
                    metrics::record_conflict_retry(operation);
                    tracing::debug!(
                        target: "room.coordinator",
                        operation,
                        attempt = retries,
                        cause = %cause,
                        "Lost race on room, re-reading"
                    );
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// Apply the operation deadline and record the outcome.
    async fn run<T, Fut>(&self, operation: &'static str, work: Fut) -> Result<T, RoomError>
    where
        Fut: Future<Output = Result<T, RoomError>>,
    {
        let start = Instant::now();

        let result = tokio::time::timeout(self.settings.operation_timeout, work)
            .await
            .unwrap_or_else(|_| {
                tracing::warn!(
                    target: "room.coordinator",
                    operation,
                    timeout_ms = self.settings.operation_timeout.as_millis() as u64,
                    "Operation timed out"
                );
                Err(RoomError::Timeout)
            });

        match &result {
            Ok(_) => metrics::record_room_operation(operation, "success", None, start.elapsed()),
            Err(err) => metrics::record_room_operation(
                operation,
                "error",
                Some(err.kind()),
                start.elapsed(),
            ),
        }
        result
    }
}
