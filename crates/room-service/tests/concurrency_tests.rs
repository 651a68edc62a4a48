//! Concurrency and fault-injection tests for the room coordinator.
//!
//! Races run on the multi-threaded runtime so attempts genuinely interleave.
//! Faults are injected through the in-memory repository.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use common::types::UserId;
use futures::future::join_all;
use room_service::errors::RoomError;
use room_service::repositories::{InMemoryRoomRepository, RoomRepository};
use room_service::services::{CoordinatorSettings, RandomRoomCodes, RoomCoordinator};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn coordinator_with(
    repo: Arc<InMemoryRoomRepository>,
    settings: CoordinatorSettings,
) -> Arc<RoomCoordinator> {
    Arc::new(RoomCoordinator::new(
        repo,
        Arc::new(RandomRoomCodes::new()),
        settings,
    ))
}

// ============================================================================
// Races
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_by_same_user_create_one_record() -> Result<(), anyhow::Error> {
    let repo = Arc::new(InMemoryRoomRepository::new());
    let coordinator = coordinator_with(repo.clone(), CoordinatorSettings::default());
    let room = coordinator.create_room("Standup", UserId::new()).await?;
    let guest = UserId::new();

    let tasks = (0..8).map(|_| {
        let coordinator = coordinator.clone();
        let code = room.room_code.clone();
        tokio::spawn(async move { coordinator.join_room(&code, guest).await })
    });
    let results = join_all(tasks).await;

    let mut ids = HashSet::new();
    for result in results {
        let snapshot = result??;
        ids.insert(snapshot.participant_for(guest).unwrap().participant_id);
    }
    assert_eq!(ids.len(), 1, "every racer must see the winner's record");

    // Host plus exactly one guest record, no losers persisted.
    assert_eq!(repo.participant_record_count(room.room_id).await, 2);
    let stored = repo.find_room(room.room_id).await?.unwrap();
    assert_eq!(stored.room.participants.len(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_by_different_users_all_land() -> Result<(), anyhow::Error> {
    let repo = Arc::new(InMemoryRoomRepository::new());
    // Each round of the race has a winner, so 5 extra attempts always suffice
    // for 6 racers.
    let settings = CoordinatorSettings {
        conflict_retries: 10,
        ..CoordinatorSettings::default()
    };
    let coordinator = coordinator_with(repo.clone(), settings);
    let room = coordinator.create_room("Standup", UserId::new()).await?;

    let users: Vec<UserId> = (0..6).map(|_| UserId::new()).collect();
    let tasks = users.iter().map(|&user| {
        let coordinator = coordinator.clone();
        let code = room.room_code.clone();
        tokio::spawn(async move { coordinator.join_room(&code, user).await })
    });
    for result in join_all(tasks).await {
        result??;
    }

    let stored = repo.find_room(room.room_id).await?.unwrap();
    assert_eq!(stored.room.participants.len(), users.len() + 1);
    for user in users {
        let record = repo
            .find_active_participant(room.room_id, user)
            .await?
            .expect("user should hold an active record");
        assert!(stored.room.lists(record.participant_id));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_join_racing_end_never_leaves_orphans() -> Result<(), anyhow::Error> {
    for _ in 0..20 {
        let repo = Arc::new(InMemoryRoomRepository::new());
        let coordinator = coordinator_with(repo.clone(), CoordinatorSettings::default());
        let host = UserId::new();
        let guest = UserId::new();
        let room = coordinator.create_room("Standup", host).await?;

        let join = {
            let coordinator = coordinator.clone();
            let code = room.room_code.clone();
            tokio::spawn(async move { coordinator.join_room(&code, guest).await })
        };
        let end = {
            let coordinator = coordinator.clone();
            let code = room.room_code.clone();
            tokio::spawn(async move { coordinator.end_room(&code, host).await })
        };

        let (join, end) = (join.await?, end.await?);
        end?;
        match join {
            Ok(_) | Err(RoomError::NotFound(_)) => {}
            Err(other) => panic!("unexpected join outcome: {other:?}"),
        }

        let stored = repo.find_room(room.room_id).await?.unwrap();
        assert!(stored.room.participants.is_empty());
        assert!(repo
            .find_active_participant(room.room_id, guest)
            .await?
            .is_none());
        assert!(repo
            .find_active_participant(room.room_id, host)
            .await?
            .is_none());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_leave_and_rejoin_keep_ledger_consistent() -> Result<(), anyhow::Error> {
    let repo = Arc::new(InMemoryRoomRepository::new());
    let settings = CoordinatorSettings {
        conflict_retries: 10,
        ..CoordinatorSettings::default()
    };
    let coordinator = coordinator_with(repo.clone(), settings);
    let room = coordinator.create_room("Standup", UserId::new()).await?;
    let guest = UserId::new();
    coordinator.join_room(&room.room_code, guest).await?;

    let leave = {
        let coordinator = coordinator.clone();
        let code = room.room_code.clone();
        tokio::spawn(async move { coordinator.leave_room(&code, guest).await })
    };
    let join = {
        let coordinator = coordinator.clone();
        let code = room.room_code.clone();
        tokio::spawn(async move { coordinator.join_room(&code, guest).await })
    };
    let (leave, join) = (leave.await?, join.await?);
    join?;
    match leave {
        Ok(()) | Err(RoomError::NotFound(_)) => {}
        Err(other) => panic!("unexpected leave outcome: {other:?}"),
    }

    // Whatever the interleaving, an active record is always listed and a
    // listed record is always active.
    let stored = repo.find_room(room.room_id).await?.unwrap();
    let active = repo.find_active_participant(room.room_id, guest).await?;
    match active {
        Some(record) => assert!(stored.room.lists(record.participant_id)),
        None => assert_eq!(stored.room.participants.len(), 1),
    }
    for id in &stored.room.participants {
        assert!(repo.find_participant(*id).await?.unwrap().is_active());
    }
    Ok(())
}

// ============================================================================
// Fault injection
// ============================================================================

#[tokio::test]
async fn test_conflicts_within_budget_are_absorbed() -> Result<(), anyhow::Error> {
    let repo = Arc::new(InMemoryRoomRepository::new());
    let coordinator = coordinator_with(repo.clone(), CoordinatorSettings::default());
    let room = coordinator.create_room("Standup", UserId::new()).await?;
    let guest = UserId::new();

    repo.inject_commit_conflicts(coordinator.settings().conflict_retries);
    let view = coordinator.join_room(&room.room_code, guest).await?;

    assert!(view.participant_for(guest).is_some());
    Ok(())
}

#[tokio::test]
async fn test_exhausted_conflict_retries_surface_conflict() -> Result<(), anyhow::Error> {
    let repo = Arc::new(InMemoryRoomRepository::new());
    let coordinator = coordinator_with(repo.clone(), CoordinatorSettings::default());
    let room = coordinator.create_room("Standup", UserId::new()).await?;
    let guest = UserId::new();
    let before = repo.find_room(room.room_id).await?.unwrap();

    repo.inject_commit_conflicts(coordinator.settings().conflict_retries + 1);
    assert!(matches!(
        coordinator.join_room(&room.room_code, guest).await,
        Err(RoomError::Conflict(_))
    ));

    let after = repo.find_room(room.room_id).await?.unwrap();
    assert_eq!(before, after);
    assert_eq!(repo.participant_record_count(room.room_id).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_store_outage_is_dependency_error_without_changes() -> Result<(), anyhow::Error> {
    let repo = Arc::new(InMemoryRoomRepository::new());
    let coordinator = coordinator_with(repo.clone(), CoordinatorSettings::default());
    let host = UserId::new();
    let room = coordinator.create_room("Standup", host).await?;
    let before = repo.find_room(room.room_id).await?.unwrap();

    repo.inject_unavailable(1);
    assert!(matches!(
        coordinator.end_room(&room.room_code, host).await,
        Err(RoomError::Dependency(_))
    ));

    repo.inject_unavailable(1);
    assert!(matches!(
        coordinator.create_room("Retro", host).await,
        Err(RoomError::Dependency(_))
    ));

    let after = repo.find_room(room.room_id).await?.unwrap();
    assert_eq!(before, after);

    // The outage is over; the caller's retry succeeds.
    coordinator.end_room(&room.room_code, host).await?;
    Ok(())
}

#[tokio::test]
async fn test_slow_store_times_out_without_retry() -> Result<(), anyhow::Error> {
    let repo = Arc::new(InMemoryRoomRepository::new());
    let settings = CoordinatorSettings {
        operation_timeout: Duration::from_millis(50),
        ..CoordinatorSettings::default()
    };
    let coordinator = coordinator_with(repo.clone(), settings);
    let room = coordinator.create_room("Standup", UserId::new()).await?;
    let guest = UserId::new();

    repo.set_commit_delay(Duration::from_millis(500));
    assert!(matches!(
        coordinator.join_room(&room.room_code, guest).await,
        Err(RoomError::Timeout)
    ));

    repo.set_commit_delay(Duration::ZERO);
    assert!(repo
        .find_active_participant(room.room_id, guest)
        .await?
        .is_none());
    assert_eq!(repo.participant_record_count(room.room_id).await, 1);
    Ok(())
}
