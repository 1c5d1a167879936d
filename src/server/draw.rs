//! Randomized-selection state machine: eligibility, cycle reset and the
//! timed winner reveal.

use std::sync::Arc;

use anyhow::Context;
use rand::Rng;

use crate::protocol::{ErrorKind, ServerMsg, User};
use crate::server::session::{CommandError, RoomSession};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawPhase {
    Idle,
    Running,
}

/// Begin a draw. Eligibility is decided here, once: the winner is always
/// picked from the set captured now, no matter how membership changes before
/// the reveal fires.
pub(crate) async fn start_draw(session: &Arc<RoomSession>) -> Result<(), CommandError> {
    let mut state = session.state.write().await;
    if state.phase == DrawPhase::Running {
        return Err(CommandError::Validation("A draw is already running".into()));
    }

    let mut eligible: Vec<User> = state
        .users
        .iter()
        .filter(|u| !u.is_vacation && !u.has_won)
        .cloned()
        .collect();
    let present = state.users.iter().filter(|u| !u.is_vacation).count();

    if eligible.is_empty() && present > 0 {
        // Everyone still present has already won: start a new cycle.
        session
            .store
            .reset_wins(session.room_id)
            .await
            .map_err(CommandError::Store)?;
        for user in &mut state.users {
            user.has_won = false;
        }
        eligible = state
            .users
            .iter()
            .filter(|u| !u.is_vacation)
            .cloned()
            .collect();
        tracing::info!(room = %session.slug, "lottery cycle reset");
        session.broadcast(ServerMsg::RoomState(state.users.clone()));
    }

    if eligible.is_empty() {
        // Nobody present at all; nothing to announce.
        return Ok(());
    }

    state.phase = DrawPhase::Running;
    tracing::info!(room = %session.slug, candidates = eligible.len(), "lottery started");
    session.broadcast(ServerMsg::LotteryStarted {});

    let handle = tokio::spawn(reveal_winner(session.clone(), eligible));
    state.reveal = Some(handle);
    Ok(())
}

/// One-shot reveal scheduled by `start_draw`. The session owns the handle and
/// aborts it if the room is evicted before the timer fires.
async fn reveal_winner(session: Arc<RoomSession>, eligible: Vec<User>) {
    tokio::time::sleep(session.reveal_delay).await;

    let mut state = session.state.write().await;
    let idx = rand::rng().random_range(0..eligible.len());
    let mut winner = eligible[idx].clone();
    winner.has_won = true;

    // A winner deleted since the draw started is an UPDATE of zero rows, not
    // an error; the announcement still goes out.
    let persisted = async {
        let member_id: i64 = winner.id.parse().context("member id is not numeric")?;
        session.store.set_won(member_id, true).await
    }
    .await;

    match persisted {
        Ok(()) => {
            if let Some(user) = state.users.iter_mut().find(|u| u.id == winner.id) {
                user.has_won = true;
            }
            tracing::info!(room = %session.slug, winner = %winner.name, "winner selected");
            session.broadcast(ServerMsg::WinnerSelected(winner));
            session.broadcast(ServerMsg::RoomState(state.users.clone()));
        }
        Err(e) => {
            tracing::error!(room = %session.slug, error = %e, "failed to persist winner");
            session.broadcast(ServerMsg::error(ErrorKind::Store, "Database error"));
        }
    }

    state.phase = DrawPhase::Idle;
    state.reveal = None;
}
