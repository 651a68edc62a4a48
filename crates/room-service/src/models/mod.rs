//! Room service models.
//!
//! Domain records (rooms, participants, profiles), the resolved read model
//! returned to callers, and the request/response bodies of the HTTP adapter.

use chrono::{DateTime, Utc};
use common::types::{ParticipantId, RoomId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum room title length after trimming.
pub const MAX_ROOM_TITLE_LENGTH: usize = 200;

/// Default page size for room history.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Largest page size a caller may request for room history.
pub const MAX_HISTORY_LIMIT: u32 = 100;

// ============================================================================
// Room
// ============================================================================

/// Room lifecycle state. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Room accepts joins and mutations.
    Active,

    /// Room is history: invisible to code lookups, read-only.
    Ended,
}

impl RoomStatus {
    /// Returns the string representation stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Active => "active",
            RoomStatus::Ended => "ended",
        }
    }

    /// Parse the stored representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(RoomStatus::Active),
            "ended" => Some(RoomStatus::Ended),
            _ => None,
        }
    }
}

/// Per-room feature toggles. New rooms start with everything enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggles {
    pub chat_enabled: bool,
    pub voice_enabled: bool,
    pub allow_screen_share: bool,
    pub video_enabled: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            chat_enabled: true,
            voice_enabled: true,
            allow_screen_share: true,
            video_enabled: true,
        }
    }
}

/// Partial settings update. Absent keys keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_screen_share: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_enabled: Option<bool>,
}

impl SettingsPatch {
    /// Check if the patch carries any key at all.
    pub fn has_changes(&self) -> bool {
        self.chat_enabled.is_some()
            || self.voice_enabled.is_some()
            || self.allow_screen_share.is_some()
            || self.video_enabled.is_some()
    }

    /// Apply only the keys that are present.
    pub fn apply_to(&self, toggles: FeatureToggles) -> FeatureToggles {
        FeatureToggles {
            chat_enabled: self.chat_enabled.unwrap_or(toggles.chat_enabled),
            voice_enabled: self.voice_enabled.unwrap_or(toggles.voice_enabled),
            allow_screen_share: self.allow_screen_share.unwrap_or(toggles.allow_screen_share),
            video_enabled: self.video_enabled.unwrap_or(toggles.video_enabled),
        }
    }
}

/// A room document.
///
/// `participants` is the authoritative membership set. A participant record
/// not listed here is logically removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: RoomId,
    pub title: String,
    /// Original creator. Never changes, even when the host role moves.
    pub host_user_id: UserId,
    pub room_code: String,
    pub status: RoomStatus,
    pub settings: FeatureToggles,
    pub participants: Vec<ParticipantId>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Room {
    pub fn is_active(&self) -> bool {
        self.status == RoomStatus::Active
    }

    /// Whether `participant_id` is part of the authoritative membership set.
    pub fn lists(&self, participant_id: ParticipantId) -> bool {
        self.participants.contains(&participant_id)
    }
}

/// A room together with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub room: Room,
    pub version: i64,
}

// ============================================================================
// Participant
// ============================================================================

/// Participant role within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Host,
    Participant,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Host => "host",
            ParticipantRole::Participant => "participant",
        }
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for role strings outside the two recognized roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl FromStr for ParticipantRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(ParticipantRole::Host),
            "participant" => Ok(ParticipantRole::Participant),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Per-participant media permission flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionFlags {
    pub muted: bool,
    pub video_on: bool,
    pub screen_sharing: bool,
}

/// One (room, user) membership. Re-joining after leaving creates a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: ParticipantId,
    /// Non-owning back-reference; the room's list is authoritative.
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub permissions: PermissionFlags,
    pub joined_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_at: Option<DateTime<Utc>>,
}

impl Participant {
    /// Build a fresh membership record joined now.
    pub fn new(room_id: RoomId, user_id: UserId, role: ParticipantRole) -> Self {
        Self {
            participant_id: ParticipantId::new(),
            room_id,
            user_id,
            role,
            permissions: PermissionFlags::default(),
            joined_at: Utc::now(),
            left_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

/// Profile data owned by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

// ============================================================================
// Read model
// ============================================================================

/// Participant as seen by other room members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedParticipant {
    pub participant_id: ParticipantId,
    pub user_id: UserId,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub role: ParticipantRole,
    pub permissions: PermissionFlags,
    pub joined_at: DateTime<Utc>,
}

/// Room with its membership resolved to user profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub title: String,
    pub host_user_id: UserId,
    pub room_code: String,
    pub status: RoomStatus,
    pub settings: FeatureToggles,
    pub participants: Vec<ResolvedParticipant>,
    pub created_at: DateTime<Utc>,
}

impl RoomSnapshot {
    /// Find the resolved entry for a user, if they are a member.
    pub fn participant_for(&self, user_id: UserId) -> Option<&ResolvedParticipant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }
}

/// Position in a host's history: the last room of a page.
///
/// Rooms are ordered by `(created_at, room_id)` descending, so the pair is
/// unique even when creation times collide. On the wire it is an opaque
/// `{rfc3339}_{room_id}` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HistoryCursor {
    pub created_at: DateTime<Utc>,
    pub room_id: RoomId,
}

impl HistoryCursor {
    /// Cursor pointing just past `room`.
    pub fn after(room: &Room) -> Self {
        Self {
            created_at: room.created_at,
            room_id: room.room_id,
        }
    }

    /// Whether `room` sorts strictly after this cursor in newest-first order.
    pub fn precedes(&self, room: &Room) -> bool {
        (room.created_at, room.room_id) < (self.created_at, self.room_id)
    }
}

impl fmt::Display for HistoryCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.created_at
                .to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            self.room_id
        )
    }
}

/// Error for cursor strings this service did not issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCursor(pub String);

impl fmt::Display for InvalidCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid history cursor '{}'", self.0)
    }
}

impl FromStr for HistoryCursor {
    type Err = InvalidCursor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidCursor(s.to_string());
        let (created_at, room_id) = s.rsplit_once('_').ok_or_else(invalid)?;
        let created_at = DateTime::parse_from_rfc3339(created_at)
            .map_err(|_| invalid())?
            .with_timezone(&Utc);
        let room_id = room_id.parse::<RoomId>().map_err(|_| invalid())?;
        Ok(Self {
            created_at,
            room_id,
        })
    }
}

impl TryFrom<String> for HistoryCursor {
    type Error = InvalidCursor;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HistoryCursor> for String {
    fn from(cursor: HistoryCursor) -> Self {
        cursor.to_string()
    }
}

/// A page of ended rooms, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub rooms: Vec<Room>,
    /// Pass as `before` to fetch the next page; absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_before: Option<HistoryCursor>,
}

// ============================================================================
// HTTP bodies
// ============================================================================

/// Liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Readiness response (`/ready`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: String,

    /// Store connectivity ("healthy" or "unhealthy").
    pub store: String,
}

/// Body of `POST /api/v1/rooms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    pub title: String,
}

/// Body of `PATCH /api/v1/rooms/{code}/participants/{id}/role`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

/// Query of `GET /api/v1/history`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub before: Option<HistoryCursor>,
    pub limit: Option<u32>,
}

impl HistoryQuery {
    /// Effective page size, clamped to `1..=MAX_HISTORY_LIMIT`.
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

/// Response of `DELETE /api/v1/history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeHistoryResponse {
    pub deleted: u64,
}
