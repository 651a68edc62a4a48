//! PostgreSQL room repository.
//!
//! Every write runs in one transaction. Room updates are conditional on the
//! `version` column (`WHERE version = $expected`), so two writers that read
//! the same version cannot both commit. The partial unique index
//! `participants_one_active_per_user` backs the one-active-membership rule.
//!
//! # Security
//!
//! - All queries use parameterized statements
//! - Driver error details stay in logs; callers see `StoreError` only

use super::{RoomCommit, RoomRepository, StoreError};
use crate::models::{
    FeatureToggles, HistoryCursor, Participant, ParticipantRole, PermissionFlags, Room, RoomRecord, RoomStatus,
    UserProfile,
};
use crate::observability::metrics;
use async_trait::async_trait;
use common::types::{ParticipantId, RoomId, UserId};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// PostgreSQL SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

macro_rules! room_columns {
    () => {
        "room_id, title, host_user_id, room_code, status, chat_enabled, voice_enabled, \
         allow_screen_share, video_enabled, participant_ids, version, created_at, ended_at"
    };
}

macro_rules! participant_columns {
    () => {
        "participant_id, room_id, user_id, role, muted, video_on, screen_sharing, \
         joined_at, left_at"
    };
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return StoreError::UniqueViolation(
                    db_err.constraint().unwrap_or("unknown").to_string(),
                );
            }
        }

        match err {
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_) => StoreError::Corrupt(err.to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Record query metrics and pass the result through.
fn observe<T>(
    operation: &'static str,
    start: Instant,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    let status = match &result {
        Ok(_) => "success",
        Err(StoreError::UniqueViolation(_) | StoreError::VersionConflict) => "conflict",
        Err(_) => "error",
    };
    metrics::record_db_query(operation, status, start.elapsed());

    if let Err(e) = &result {
        tracing::debug!(target: "room.repo", operation, error = %e, "Query failed");
    }
    result
}

fn uuids<'a, I, T>(ids: I) -> Vec<Uuid>
where
    I: IntoIterator<Item = &'a T>,
    T: AsRef<Uuid> + 'a,
{
    ids.into_iter().map(|id| *id.as_ref()).collect()
}

/// PostgreSQL-backed [`RoomRepository`].
#[derive(Debug, Clone)]
pub struct PgRoomRepository {
    pool: PgPool,
}

impl PgRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomRepository for PgRoomRepository {
    #[instrument(skip_all, name = "room.repo.insert_room", fields(room_id = %room.room_id))]
    async fn insert_room(
        &self,
        room: &Room,
        host: &Participant,
    ) -> Result<RoomRecord, StoreError> {
        let start = Instant::now();

        let result: Result<RoomRecord, StoreError> = async {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query(concat!(
                "INSERT INTO rooms (room_id, title, host_user_id, room_code, status, \
                 chat_enabled, voice_enabled, allow_screen_share, video_enabled, \
                 participant_ids, version, created_at, ended_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 1, $11, $12) \
                 RETURNING ",
                room_columns!()
            ))
            .bind(room.room_id.0) // $1
            .bind(&room.title) // $2
            .bind(room.host_user_id.0) // $3
            .bind(&room.room_code) // $4
            .bind(room.status.as_str()) // $5
            .bind(room.settings.chat_enabled) // $6
            .bind(room.settings.voice_enabled) // $7
            .bind(room.settings.allow_screen_share) // $8
            .bind(room.settings.video_enabled) // $9
            .bind(uuids(&room.participants)) // $10
            .bind(room.created_at) // $11
            .bind(room.ended_at) // $12
            .fetch_one(&mut *tx)
            .await?;

            insert_participant(&mut tx, host).await?;

            let record = map_row_to_room(&row)?;
            tx.commit().await?;
            Ok(record)
        }
        .await;

        observe("insert_room", start, result)
    }

    #[instrument(skip_all, name = "room.repo.find_room_by_code")]
    async fn find_room_by_code(&self, room_code: &str) -> Result<Option<RoomRecord>, StoreError> {
        let start = Instant::now();

        let result: Result<Option<RoomRecord>, StoreError> = async {
            let row = sqlx::query(concat!(
                "SELECT ",
                room_columns!(),
                " FROM rooms WHERE room_code = $1"
            ))
            .bind(room_code)
            .fetch_optional(&self.pool)
            .await?;

            row.as_ref().map(map_row_to_room).transpose()
        }
        .await;

        observe("find_room_by_code", start, result)
    }

    #[instrument(skip_all, name = "room.repo.find_room", fields(room_id = %room_id))]
    async fn find_room(&self, room_id: RoomId) -> Result<Option<RoomRecord>, StoreError> {
        let start = Instant::now();

        let result: Result<Option<RoomRecord>, StoreError> = async {
            let row = sqlx::query(concat!(
                "SELECT ",
                room_columns!(),
                " FROM rooms WHERE room_id = $1"
            ))
            .bind(room_id.0)
            .fetch_optional(&self.pool)
            .await?;

            row.as_ref().map(map_row_to_room).transpose()
        }
        .await;

        observe("find_room", start, result)
    }

    #[instrument(skip_all, name = "room.repo.find_active_participant", fields(room_id = %room_id))]
    async fn find_active_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Participant>, StoreError> {
        let start = Instant::now();

        let result: Result<Option<Participant>, StoreError> = async {
            let row = sqlx::query(concat!(
                "SELECT ",
                participant_columns!(),
                " FROM participants WHERE room_id = $1 AND user_id = $2 AND left_at IS NULL"
            ))
            .bind(room_id.0)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;

            row.as_ref().map(map_row_to_participant).transpose()
        }
        .await;

        observe("find_active_participant", start, result)
    }

    #[instrument(skip_all, name = "room.repo.find_participant")]
    async fn find_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Option<Participant>, StoreError> {
        let start = Instant::now();

        let result: Result<Option<Participant>, StoreError> = async {
            let row = sqlx::query(concat!(
                "SELECT ",
                participant_columns!(),
                " FROM participants WHERE participant_id = $1"
            ))
            .bind(participant_id.0)
            .fetch_optional(&self.pool)
            .await?;

            row.as_ref().map(map_row_to_participant).transpose()
        }
        .await;

        observe("find_participant", start, result)
    }

    #[instrument(skip_all, name = "room.repo.list_participants", fields(count = participant_ids.len()))]
    async fn list_participants(
        &self,
        participant_ids: &[ParticipantId],
    ) -> Result<Vec<Participant>, StoreError> {
        if participant_ids.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        // Keep the caller's order: the room's list order is the join order.
        let result: Result<Vec<Participant>, StoreError> = async {
            let rows = sqlx::query(concat!(
                "SELECT ",
                participant_columns!(),
                " FROM participants p \
                 JOIN UNNEST($1::uuid[]) WITH ORDINALITY AS wanted(id, ord) \
                   ON p.participant_id = wanted.id \
                 ORDER BY wanted.ord"
            ))
            .bind(uuids(participant_ids))
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(map_row_to_participant).collect()
        }
        .await;

        observe("list_participants", start, result)
    }

    #[instrument(
        skip_all,
        name = "room.repo.commit",
        fields(
            room_id = %commit.room.room_id,
            expected_version = commit.expected_version,
            inserted = commit.inserted.len(),
            updated = commit.updated.len()
        )
    )]
    async fn commit(&self, commit: &RoomCommit) -> Result<RoomRecord, StoreError> {
        let start = Instant::now();
        let room = &commit.room;

        let result: Result<RoomRecord, StoreError> = async {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query(concat!(
                "UPDATE rooms SET \
                   title = $3, status = $4, chat_enabled = $5, voice_enabled = $6, \
                   allow_screen_share = $7, video_enabled = $8, participant_ids = $9, \
                   ended_at = $10, version = version + 1 \
                 WHERE room_id = $1 AND version = $2 \
                 RETURNING ",
                room_columns!()
            ))
            .bind(room.room_id.0) // $1
            .bind(commit.expected_version) // $2
            .bind(&room.title) // $3
            .bind(room.status.as_str()) // $4
            .bind(room.settings.chat_enabled) // $5
            .bind(room.settings.voice_enabled) // $6
            .bind(room.settings.allow_screen_share) // $7
            .bind(room.settings.video_enabled) // $8
            .bind(uuids(&room.participants)) // $9
            .bind(room.ended_at) // $10
            .fetch_optional(&mut *tx)
            .await?;

            // Dropping the transaction rolls it back.
            let Some(row) = row else {
                return Err(StoreError::VersionConflict);
            };

            // Retire memberships before inserting new ones so the partial
            // unique index sees the final state.
            for participant in &commit.updated {
                update_participant(&mut tx, participant).await?;
            }
            for participant in &commit.inserted {
                insert_participant(&mut tx, participant).await?;
            }

            let record = map_row_to_room(&row)?;
            tx.commit().await?;
            Ok(record)
        }
        .await;

        observe("commit", start, result)
    }

    #[instrument(skip_all, name = "room.repo.list_history")]
    async fn list_history(
        &self,
        host_user_id: UserId,
        before: Option<HistoryCursor>,
        limit: u32,
    ) -> Result<Vec<Room>, StoreError> {
        let start = Instant::now();

        let result: Result<Vec<Room>, StoreError> = async {
            let rows = sqlx::query(concat!(
                "SELECT ",
                room_columns!(),
                " FROM rooms \
                 WHERE host_user_id = $1 AND status = 'ended' \
                   AND ($2::timestamptz IS NULL \
                        OR (created_at, room_id) < ($2, $3::uuid)) \
                 ORDER BY created_at DESC, room_id DESC \
                 LIMIT $4"
            ))
            .bind(host_user_id.0) // $1
            .bind(before.map(|cursor| cursor.created_at)) // $2
            .bind(before.map(|cursor| cursor.room_id.0)) // $3
            .bind(i64::from(limit)) // $4
            .fetch_all(&self.pool)
            .await?;

            rows.iter()
                .map(|row| map_row_to_room(row).map(|record| record.room))
                .collect()
        }
        .await;

        observe("list_history", start, result)
    }

    #[instrument(skip_all, name = "room.repo.delete_history")]
    async fn delete_history(&self, host_user_id: UserId) -> Result<u64, StoreError> {
        let start = Instant::now();

        // Participant rows go with their room via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM rooms WHERE host_user_id = $1 AND status = 'ended'")
            .bind(host_user_id.0)
            .execute(&self.pool)
            .await
            .map(|done| done.rows_affected())
            .map_err(StoreError::from);

        observe("delete_history", start, result)
    }

    #[instrument(skip_all, name = "room.repo.find_profiles", fields(count = user_ids.len()))]
    async fn find_profiles(&self, user_ids: &[UserId]) -> Result<Vec<UserProfile>, StoreError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        let result: Result<Vec<UserProfile>, StoreError> = async {
            let rows = sqlx::query(
                "SELECT user_id, display_name, avatar_url FROM users WHERE user_id = ANY($1)",
            )
            .bind(uuids(user_ids))
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(map_row_to_profile).collect()
        }
        .await;

        observe("find_profiles", start, result)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(StoreError::from);
        observe("ping", start, result)
    }
}

async fn insert_participant(
    conn: &mut PgConnection,
    participant: &Participant,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO participants (participant_id, room_id, user_id, role, muted, video_on, \
         screen_sharing, joined_at, left_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(participant.participant_id.0)
    .bind(participant.room_id.0)
    .bind(participant.user_id.0)
    .bind(participant.role.as_str())
    .bind(participant.permissions.muted)
    .bind(participant.permissions.video_on)
    .bind(participant.permissions.screen_sharing)
    .bind(participant.joined_at)
    .bind(participant.left_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn update_participant(
    conn: &mut PgConnection,
    participant: &Participant,
) -> Result<(), StoreError> {
    let done = sqlx::query(
        "UPDATE participants SET role = $2, muted = $3, video_on = $4, screen_sharing = $5, \
         left_at = $6 \
         WHERE participant_id = $1",
    )
    .bind(participant.participant_id.0)
    .bind(participant.role.as_str())
    .bind(participant.permissions.muted)
    .bind(participant.permissions.video_on)
    .bind(participant.permissions.screen_sharing)
    .bind(participant.left_at)
    .execute(conn)
    .await?;

    if done.rows_affected() != 1 {
        return Err(StoreError::Corrupt(format!(
            "participant {} does not exist",
            participant.participant_id
        )));
    }
    Ok(())
}

fn map_row_to_room(row: &PgRow) -> Result<RoomRecord, StoreError> {
    let status: String = row.try_get("status")?;
    let status = RoomStatus::parse(&status)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown room status '{status}'")))?;
    let participant_ids: Vec<Uuid> = row.try_get("participant_ids")?;

    Ok(RoomRecord {
        room: Room {
            room_id: RoomId(row.try_get("room_id")?),
            title: row.try_get("title")?,
            host_user_id: UserId(row.try_get("host_user_id")?),
            room_code: row.try_get("room_code")?,
            status,
            settings: FeatureToggles {
                chat_enabled: row.try_get("chat_enabled")?,
                voice_enabled: row.try_get("voice_enabled")?,
                allow_screen_share: row.try_get("allow_screen_share")?,
                video_enabled: row.try_get("video_enabled")?,
            },
            participants: participant_ids.into_iter().map(ParticipantId).collect(),
            created_at: row.try_get("created_at")?,
            ended_at: row.try_get("ended_at")?,
        },
        version: row.try_get("version")?,
    })
}

fn map_row_to_profile(row: &PgRow) -> Result<UserProfile, StoreError> {
    Ok(UserProfile {
        user_id: UserId(row.try_get("user_id")?),
        display_name: row.try_get("display_name")?,
        avatar_url: row.try_get("avatar_url")?,
    })
}

fn map_row_to_participant(row: &PgRow) -> Result<Participant, StoreError> {
    let role: String = row.try_get("role")?;
    let role: ParticipantRole = role
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("{e}")))?;

    Ok(Participant {
        participant_id: ParticipantId(row.try_get("participant_id")?),
        room_id: RoomId(row.try_get("room_id")?),
        user_id: UserId(row.try_get("user_id")?),
        role,
        permissions: PermissionFlags {
            muted: row.try_get("muted")?,
            video_on: row.try_get("video_on")?,
            screen_sharing: row.try_get("screen_sharing")?,
        },
        joined_at: row.try_get("joined_at")?,
        left_at: row.try_get("left_at")?,
    })
}
