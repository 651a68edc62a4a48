//! Authorization policy for room operations.
//!
//! A pure decision function: no I/O, deterministic in its inputs. The
//! coordinator loads the room and the actor's membership record, asks the
//! policy, and only then mutates anything.
//!
//! Host equivalence is defined once in [`is_host_equivalent`]: the room's
//! recorded creator always counts as host, and so does any active member
//! whose record carries role `host`. Role changes are stricter and accept
//! only the recorded creator.

use crate::errors::RoomError;
use crate::models::{Participant, ParticipantRole, Room};
use common::types::UserId;

/// Operation an actor wants to perform on a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Join,
    /// Leave the membership of `member`.
    Leave { member: UserId },
    End,
    UpdateSettings,
    SetRole,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Join => "join",
            Action::Leave { .. } => "leave",
            Action::End => "end",
            Action::UpdateSettings => "update_settings",
            Action::SetRole => "set_role",
        }
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The room has ended; it must look absent to the caller.
    RoomInactive,
    /// Actor is neither the creator nor a member holding role `host`.
    NotHostEquivalent,
    /// Only the recorded creator may change roles.
    NotRoomCreator,
    /// Actors may only leave on their own behalf.
    NotOwnMembership,
}

impl DenyReason {
    /// Client-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::RoomInactive => "Room not found or has ended",
            DenyReason::NotHostEquivalent => "Only a host can perform this action",
            DenyReason::NotRoomCreator => "Only the room creator can change participant roles",
            DenyReason::NotOwnMembership => "Participants can only leave on their own behalf",
        }
    }
}

/// Outcome of a policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Convert into the error taxonomy. Inactive rooms surface as not-found
    /// so ended rooms cannot be probed.
    pub fn into_result(self) -> Result<(), RoomError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::RoomInactive) => Err(RoomError::NotFound(
                DenyReason::RoomInactive.message().to_string(),
            )),
            Decision::Deny(reason) => Err(RoomError::Forbidden(reason.message().to_string())),
        }
    }
}

/// Whether `actor_record` is an active membership of `actor` in `room` that
/// the room still lists.
fn is_live_membership(room: &Room, actor: UserId, actor_record: &Participant) -> bool {
    actor_record.room_id == room.room_id
        && actor_record.user_id == actor
        && actor_record.is_active()
        && room.lists(actor_record.participant_id)
}

/// The single host-equivalence predicate.
pub fn is_host_equivalent(room: &Room, actor: UserId, actor_record: Option<&Participant>) -> bool {
    if room.host_user_id == actor {
        return true;
    }

    actor_record.is_some_and(|record| {
        record.role == ParticipantRole::Host && is_live_membership(room, actor, record)
    })
}

/// Decide whether `actor` may perform `action` on `room`.
///
/// `actor_record` is the actor's active participant record in this room, if
/// any. Records for other rooms, other users, or records the room no longer
/// lists are ignored.
pub fn can_act(
    room: &Room,
    actor: UserId,
    action: Action,
    actor_record: Option<&Participant>,
) -> Decision {
    if !room.is_active() {
        return Decision::Deny(DenyReason::RoomInactive);
    }

    match action {
        Action::Join => Decision::Allow,
        Action::Leave { member } => {
            if member == actor {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotOwnMembership)
            }
        }
        Action::End | Action::UpdateSettings => {
            if is_host_equivalent(room, actor, actor_record) {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotHostEquivalent)
            }
        }
        Action::SetRole => {
            if room.host_user_id == actor {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotRoomCreator)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureToggles, RoomStatus};
    use chrono::Utc;
    use common::types::RoomId;

    fn room_with(host: UserId) -> Room {
        Room {
            room_id: RoomId::new(),
            title: "Standup".to_string(),
            host_user_id: host,
            room_code: "abc123def456".to_string(),
            status: RoomStatus::Active,
            settings: FeatureToggles::default(),
            participants: Vec::new(),
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    fn enroll(room: &mut Room, user: UserId, role: ParticipantRole) -> Participant {
        let record = Participant::new(room.room_id, user, role);
        room.participants.push(record.participant_id);
        record
    }

    #[test]
    fn test_creator_is_host_equivalent_without_record() {
        let host = UserId::new();
        let room = room_with(host);
        assert!(is_host_equivalent(&room, host, None));
        assert_eq!(can_act(&room, host, Action::End, None), Decision::Allow);
        assert_eq!(
            can_act(&room, host, Action::UpdateSettings, None),
            Decision::Allow
        );
    }

    #[test]
    fn test_plain_participant_denied_end_and_settings() {
        let mut room = room_with(UserId::new());
        let member = UserId::new();
        let record = enroll(&mut room, member, ParticipantRole::Participant);

        for action in [Action::End, Action::UpdateSettings] {
            assert_eq!(
                can_act(&room, member, action, Some(&record)),
                Decision::Deny(DenyReason::NotHostEquivalent)
            );
        }
    }

    #[test]
    fn test_promoted_host_may_end_but_not_set_roles() {
        let mut room = room_with(UserId::new());
        let promoted = UserId::new();
        let record = enroll(&mut room, promoted, ParticipantRole::Host);

        assert_eq!(
            can_act(&room, promoted, Action::End, Some(&record)),
            Decision::Allow
        );
        assert_eq!(
            can_act(&room, promoted, Action::SetRole, Some(&record)),
            Decision::Deny(DenyReason::NotRoomCreator)
        );
    }

    #[test]
    fn test_host_record_the_room_no_longer_lists_is_ignored() {
        let room = room_with(UserId::new());
        let former = UserId::new();
        let record = Participant::new(room.room_id, former, ParticipantRole::Host);

        assert!(!is_host_equivalent(&room, former, Some(&record)));
    }

    #[test]
    fn test_host_record_from_another_room_is_ignored() {
        let room = room_with(UserId::new());
        let mut other = room_with(UserId::new());
        let user = UserId::new();
        let record = enroll(&mut other, user, ParticipantRole::Host);

        assert_eq!(
            can_act(&room, user, Action::End, Some(&record)),
            Decision::Deny(DenyReason::NotHostEquivalent)
        );
    }

    #[test]
    fn test_left_host_record_is_ignored() {
        let mut room = room_with(UserId::new());
        let user = UserId::new();
        let mut record = enroll(&mut room, user, ParticipantRole::Host);
        record.left_at = Some(Utc::now());

        assert!(!is_host_equivalent(&room, user, Some(&record)));
    }

    #[test]
    fn test_someone_elses_record_does_not_grant_host() {
        let mut room = room_with(UserId::new());
        let promoted = UserId::new();
        let record = enroll(&mut room, promoted, ParticipantRole::Host);
        let intruder = UserId::new();

        assert!(!is_host_equivalent(&room, intruder, Some(&record)));
    }

    #[test]
    fn test_join_allowed_for_anyone_on_active_room() {
        let room = room_with(UserId::new());
        assert_eq!(
            can_act(&room, UserId::new(), Action::Join, None),
            Decision::Allow
        );
    }

    #[test]
    fn test_leave_only_on_own_behalf() {
        let room = room_with(UserId::new());
        let actor = UserId::new();
        assert_eq!(
            can_act(&room, actor, Action::Leave { member: actor }, None),
            Decision::Allow
        );
        assert_eq!(
            can_act(&room, actor, Action::Leave { member: UserId::new() }, None),
            Decision::Deny(DenyReason::NotOwnMembership)
        );
    }

    #[test]
    fn test_ended_room_denies_everything_as_inactive() {
        let host = UserId::new();
        let mut room = room_with(host);
        room.status = RoomStatus::Ended;

        for action in [
            Action::Join,
            Action::Leave { member: host },
            Action::End,
            Action::UpdateSettings,
            Action::SetRole,
        ] {
            assert_eq!(
                can_act(&room, host, action, None),
                Decision::Deny(DenyReason::RoomInactive)
            );
        }
    }

    #[test]
    fn test_decision_maps_to_error_taxonomy() {
        assert!(Decision::Allow.into_result().is_ok());
        assert!(matches!(
            Decision::Deny(DenyReason::RoomInactive).into_result(),
            Err(RoomError::NotFound(_))
        ));
        assert!(matches!(
            Decision::Deny(DenyReason::NotHostEquivalent).into_result(),
            Err(RoomError::Forbidden(_))
        ));
    }
}
