//! Scenario tests for the room registry, session commands and draw engine,
//! driven through the library API without a socket in the way.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;
use tokio::time::timeout;

use tombola::protocol::{ClientMsg, ServerMsg, User};
use tombola::server::{CommandError, RoomRegistry, RoomSession};
use tombola::store::Store;

const ROOM: &str = "wheel";
const REVEAL: Duration = Duration::from_millis(40);

/// Seed a room with `(name, is_vacation, has_won)` members and hand back a
/// registry over the same store.
async fn seed(members: &[(&str, bool, bool)]) -> Result<(Store, RoomRegistry, i64)> {
    let store = Store::memory().await?;
    let room_id = store.create_room(ROOM).await?;
    for (name, vacation, won) in members {
        let id = store.insert_member(room_id, name).await?;
        if *vacation {
            store.set_vacation(id, true).await?;
        }
        if *won {
            store.set_won(id, true).await?;
        }
    }
    let registry = RoomRegistry::new(store.clone(), REVEAL);
    Ok((store, registry, room_id))
}

async fn attach(registry: &RoomRegistry) -> (Arc<RoomSession>, Vec<User>, Receiver<ServerMsg>) {
    let (session, users) = registry
        .attach(ROOM)
        .await
        .expect("store reachable")
        .expect("room exists");
    let rx = session.broadcaster.subscribe();
    (session, users, rx)
}

async fn next_event(rx: &mut Receiver<ServerMsg>) -> ServerMsg {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("broadcast channel closed")
}

#[tokio::test]
async fn two_members_yield_exactly_one_winner() -> Result<()> {
    let (store, registry, room_id) = seed(&[("Alice", false, false), ("Bob", false, false)]).await?;
    let (session, users, mut rx) = attach(&registry).await;
    assert_eq!(users.len(), 2);

    session.handle_command(ClientMsg::Draw {}).await?;

    assert!(matches!(next_event(&mut rx).await, ServerMsg::LotteryStarted {}));

    let winner = match next_event(&mut rx).await {
        ServerMsg::WinnerSelected(winner) => winner,
        other => panic!("expected WINNER_SELECTED, got {other:?}"),
    };
    assert!(winner.has_won);
    assert!(["Alice", "Bob"].contains(&winner.name.as_str()));

    match next_event(&mut rx).await {
        ServerMsg::RoomState(users) => {
            assert_eq!(users.iter().filter(|u| u.has_won).count(), 1);
            assert!(users.iter().find(|u| u.id == winner.id).unwrap().has_won);
        }
        other => panic!("expected ROOM_STATE, got {other:?}"),
    }

    // The win is persisted, not just broadcast.
    let rows = store.members(room_id).await?;
    assert_eq!(rows.iter().filter(|m| m.has_won).count(), 1);
    Ok(())
}

#[tokio::test]
async fn exhausted_cycle_resets_before_selecting() -> Result<()> {
    let (store, registry, room_id) =
        seed(&[("Alice", false, true), ("Bob", false, true), ("Cleo", false, true)]).await?;
    let (session, _, mut rx) = attach(&registry).await;

    session.handle_command(ClientMsg::Draw {}).await?;

    // The reset broadcast comes before the lottery starts.
    match next_event(&mut rx).await {
        ServerMsg::RoomState(users) => {
            assert_eq!(users.len(), 3);
            assert!(users.iter().all(|u| !u.has_won));
        }
        other => panic!("expected ROOM_STATE reset, got {other:?}"),
    }

    assert!(matches!(next_event(&mut rx).await, ServerMsg::LotteryStarted {}));
    assert!(matches!(next_event(&mut rx).await, ServerMsg::WinnerSelected(_)));

    // Without the reset all three rows would still be marked; after reset
    // plus one fresh win exactly one is.
    let rows = store.members(room_id).await?;
    assert_eq!(rows.iter().filter(|m| m.has_won).count(), 1);
    Ok(())
}

#[tokio::test]
async fn vacationers_never_win_and_empty_rooms_stay_silent() -> Result<()> {
    let (_store, registry, _) = seed(&[("Alice", true, false), ("Bob", true, false)]).await?;
    let (session, _, mut rx) = attach(&registry).await;

    session.handle_command(ClientMsg::Draw {}).await?;

    // Nobody is present, so nothing happens: no start, no winner, no reset.
    tokio::time::sleep(REVEAL * 3).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    Ok(())
}

#[tokio::test]
async fn second_draw_while_running_is_rejected() -> Result<()> {
    let (_store, registry, _) = seed(&[("Alice", false, false), ("Bob", false, false)]).await?;
    let (session, _, mut rx) = attach(&registry).await;

    session.handle_command(ClientMsg::Draw {}).await?;
    let err = session
        .handle_command(ClientMsg::Draw {})
        .await
        .expect_err("second draw must be rejected");
    assert!(matches!(err, CommandError::Validation(_)));

    // Exactly one lottery runs to completion.
    assert!(matches!(next_event(&mut rx).await, ServerMsg::LotteryStarted {}));
    assert!(matches!(next_event(&mut rx).await, ServerMsg::WinnerSelected(_)));
    assert!(matches!(next_event(&mut rx).await, ServerMsg::RoomState(_)));
    tokio::time::sleep(REVEAL * 2).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    Ok(())
}

#[tokio::test]
async fn eligibility_is_captured_when_the_lottery_starts() -> Result<()> {
    let (_store, registry, _) = seed(&[("Alice", false, false), ("Bob", false, false)]).await?;
    let (session, _, mut rx) = attach(&registry).await;

    session.handle_command(ClientMsg::Draw {}).await?;
    assert!(matches!(next_event(&mut rx).await, ServerMsg::LotteryStarted {}));

    // Carol arrives between start and reveal; she cannot win this draw.
    session
        .handle_command(ClientMsg::AddUser {
            name: "Carol".into(),
        })
        .await?;

    let winner = loop {
        match next_event(&mut rx).await {
            ServerMsg::WinnerSelected(winner) => break winner,
            ServerMsg::RoomState(_) => continue,
            other => panic!("unexpected event {other:?}"),
        }
    };
    assert_ne!(winner.name, "Carol");
    Ok(())
}

#[tokio::test]
async fn eviction_reloads_identical_state_from_the_store() -> Result<()> {
    let (_store, registry, _) = seed(&[]).await?;
    let (session, users, _rx) = attach(&registry).await;
    assert!(users.is_empty());

    session
        .handle_command(ClientMsg::AddUser {
            name: "Alice".into(),
        })
        .await?;
    let before = session.snapshot().await;

    registry.release(&session).await;
    assert!(!registry.is_resident(ROOM).await);

    let (_session, reloaded, _rx) = attach(&registry).await;
    assert_eq!(reloaded, before);
    Ok(())
}

#[tokio::test]
async fn removing_an_unknown_member_is_a_silent_noop() -> Result<()> {
    let (store, registry, room_id) = seed(&[("Alice", false, false)]).await?;
    let (session, _, mut rx) = attach(&registry).await;

    session
        .handle_command(ClientMsg::DeleteUser { id: "999".into() })
        .await?;

    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(store.members(room_id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn memory_mirrors_store_after_a_command_sequence() -> Result<()> {
    let (store, registry, room_id) = seed(&[]).await?;
    let (session, _, _rx) = attach(&registry).await;

    session
        .handle_command(ClientMsg::AddUser { name: "Alice".into() })
        .await?;
    session
        .handle_command(ClientMsg::AddUser { name: "Bob".into() })
        .await?;

    let snapshot = session.snapshot().await;
    let alice = snapshot[0].id.clone();
    session
        .handle_command(ClientMsg::UserVacation {
            id: alice.clone(),
            is_vacation: true,
        })
        .await?;
    session
        .handle_command(ClientMsg::UserWon {
            id: snapshot[1].id.clone(),
            has_won: true,
        })
        .await?;
    session
        .handle_command(ClientMsg::DeleteUser { id: alice })
        .await?;

    let memory: HashSet<String> = session.snapshot().await.into_iter().map(|u| u.id).collect();
    let rows: HashSet<String> = store
        .members(room_id)
        .await?
        .into_iter()
        .map(|m| m.id.to_string())
        .collect();
    assert_eq!(memory, rows);

    let bob = store.members(room_id).await?;
    assert_eq!(bob.len(), 1);
    assert!(bob[0].has_won);
    Ok(())
}

#[tokio::test]
async fn blank_names_are_rejected() -> Result<()> {
    let (_store, registry, _) = seed(&[]).await?;
    let (session, _, mut rx) = attach(&registry).await;

    let err = session
        .handle_command(ClientMsg::AddUser { name: "   ".into() })
        .await
        .expect_err("blank name must be rejected");
    assert!(matches!(err, CommandError::Validation(_)));
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    Ok(())
}
