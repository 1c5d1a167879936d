//! Per-room session state and command handling.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::protocol::{ClientMsg, ErrorKind, ErrorMsg, ServerMsg, User};
use crate::server::draw::{self, DrawPhase};
use crate::server::state::CHANNEL_BUFFER_SIZE;
use crate::store::{MemberRow, RoomRow, Store};

/// Errors produced at the command-handler boundary. They are reported to the
/// originating connection only; successful commands are observed through
/// broadcasts instead.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("{0}")]
    Validation(String),
    /// Client-facing message stays generic; the cause goes to the log.
    #[error("Database error")]
    Store(anyhow::Error),
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::RoomNotFound => ErrorKind::RoomNotFound,
            CommandError::Validation(_) => ErrorKind::Validation,
            CommandError::Store(_) => ErrorKind::Store,
        }
    }

    pub fn to_msg(&self) -> ServerMsg {
        ServerMsg::Error(ErrorMsg {
            kind: self.kind(),
            message: self.to_string(),
        })
    }
}

/// One room's live state: member list, subscriber accounting and the draw
/// machinery. Command handlers hold the state write lock across their whole
/// validate/persist/mutate/broadcast sequence, which serializes commands per
/// room without any cross-room coordination.
pub struct RoomSession {
    pub slug: String,
    pub(crate) room_id: i64,
    pub(crate) store: Store,
    pub(crate) reveal_delay: Duration,
    pub broadcaster: broadcast::Sender<ServerMsg>,
    pub(crate) state: RwLock<RoomState>,
}

pub(crate) struct RoomState {
    pub users: Vec<User>,
    pub subscribers: usize,
    pub phase: DrawPhase,
    pub reveal: Option<JoinHandle<()>>,
}

impl RoomSession {
    pub(crate) fn new(
        room: RoomRow,
        members: Vec<MemberRow>,
        store: Store,
        reveal_delay: Duration,
    ) -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_BUFFER_SIZE);
        RoomSession {
            slug: room.slug,
            room_id: room.id,
            store,
            reveal_delay,
            broadcaster: tx,
            state: RwLock::new(RoomState {
                users: members.into_iter().map(User::from).collect(),
                subscribers: 0,
                phase: DrawPhase::Idle,
                reveal: None,
            }),
        }
    }

    /// Register one more subscriber and return the snapshot owed to the
    /// joining connection.
    pub(crate) async fn join(&self) -> Vec<User> {
        let mut state = self.state.write().await;
        state.subscribers += 1;
        state.users.clone()
    }

    /// Deregister one subscriber; returns how many remain.
    pub(crate) async fn detach(&self) -> usize {
        let mut state = self.state.write().await;
        state.subscribers = state.subscribers.saturating_sub(1);
        state.subscribers
    }

    /// Abort a pending reveal, if any. Called on eviction so no timer
    /// outlives its session.
    pub(crate) async fn cancel_reveal(&self) {
        let mut state = self.state.write().await;
        if let Some(handle) = state.reveal.take() {
            handle.abort();
        }
        state.phase = DrawPhase::Idle;
    }

    /// Current member list.
    pub async fn snapshot(&self) -> Vec<User> {
        self.state.read().await.users.clone()
    }

    pub(crate) fn broadcast(&self, msg: ServerMsg) {
        // Send only fails when nobody is subscribed, which is fine.
        let _ = self.broadcaster.send(msg);
    }

    /// Apply one client command.
    pub async fn handle_command(self: &Arc<Self>, msg: ClientMsg) -> Result<(), CommandError> {
        match msg {
            ClientMsg::AddUser { name } => self.add_user(name).await,
            ClientMsg::UserVacation { id, is_vacation } => self.set_vacation(id, is_vacation).await,
            ClientMsg::UserWon { id, has_won } => self.set_won(id, has_won).await,
            ClientMsg::DeleteUser { id } => self.delete_user(id).await,
            ClientMsg::Draw {} => draw::start_draw(self).await,
            ClientMsg::Join { .. } => Err(CommandError::Validation(
                "Already joined to a room".into(),
            )),
        }
    }

    async fn add_user(&self, name: String) -> Result<(), CommandError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(CommandError::Validation("Name must not be empty".into()));
        }
        let mut state = self.state.write().await;
        let id = self
            .store
            .insert_member(self.room_id, &name)
            .await
            .map_err(CommandError::Store)?;
        state.users.push(User {
            id: id.to_string(),
            name,
            is_vacation: false,
            has_won: false,
        });
        tracing::info!(room = %self.slug, member = id, "member added");
        self.broadcast(ServerMsg::RoomState(state.users.clone()));
        Ok(())
    }

    async fn set_vacation(&self, id: String, is_vacation: bool) -> Result<(), CommandError> {
        let mut state = self.state.write().await;
        let Some(idx) = state.users.iter().position(|u| u.id == id) else {
            tracing::debug!(room = %self.slug, %id, "vacation toggle for unknown member");
            return Ok(());
        };
        let Ok(member_id) = id.parse::<i64>() else {
            return Ok(());
        };
        self.store
            .set_vacation(member_id, is_vacation)
            .await
            .map_err(CommandError::Store)?;
        state.users[idx].is_vacation = is_vacation;
        self.broadcast(ServerMsg::UserUpdated(state.users[idx].clone()));
        Ok(())
    }

    async fn set_won(&self, id: String, has_won: bool) -> Result<(), CommandError> {
        let mut state = self.state.write().await;
        let Some(idx) = state.users.iter().position(|u| u.id == id) else {
            tracing::debug!(room = %self.slug, %id, "won toggle for unknown member");
            return Ok(());
        };
        let Ok(member_id) = id.parse::<i64>() else {
            return Ok(());
        };
        self.store
            .set_won(member_id, has_won)
            .await
            .map_err(CommandError::Store)?;
        state.users[idx].has_won = has_won;
        self.broadcast(ServerMsg::UserUpdated(state.users[idx].clone()));
        Ok(())
    }

    async fn delete_user(&self, id: String) -> Result<(), CommandError> {
        let mut state = self.state.write().await;
        let Some(idx) = state.users.iter().position(|u| u.id == id) else {
            tracing::debug!(room = %self.slug, %id, "removal of unknown member");
            return Ok(());
        };
        let Ok(member_id) = id.parse::<i64>() else {
            return Ok(());
        };
        self.store
            .delete_member(member_id)
            .await
            .map_err(CommandError::Store)?;
        state.users.remove(idx);
        tracing::info!(room = %self.slug, member = member_id, "member removed");
        self.broadcast(ServerMsg::RoomState(state.users.clone()));
        Ok(())
    }
}
