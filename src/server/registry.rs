//! Slug-to-session map with single-flight loading and idle eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::protocol::User;
use crate::server::session::RoomSession;
use crate::store::Store;

/// Owns every live room session. Loading and eviction both run under one
/// async mutex, so concurrent joins for an unseen slug perform a single store
/// load and observe the same session instance.
pub struct RoomRegistry {
    store: Store,
    reveal_delay: Duration,
    rooms: Mutex<HashMap<String, Arc<RoomSession>>>,
}

impl RoomRegistry {
    pub fn new(store: Store, reveal_delay: Duration) -> Self {
        Self {
            store,
            reveal_delay,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `slug` to its live session, loading it from the store on first
    /// join, and attach one subscriber. Returns the session together with the
    /// member snapshot owed to the joining connection, or `None` when no such
    /// room exists.
    pub async fn attach(&self, slug: &str) -> Result<Option<(Arc<RoomSession>, Vec<User>)>> {
        let mut rooms = self.rooms.lock().await;
        let session = match rooms.get(slug) {
            Some(session) => session.clone(),
            None => {
                let Some(room) = self.store.find_room(slug).await? else {
                    return Ok(None);
                };
                let members = self.store.members(room.id).await?;
                tracing::info!(room = %slug, members = members.len(), "room session loaded");
                let session = Arc::new(RoomSession::new(
                    room,
                    members,
                    self.store.clone(),
                    self.reveal_delay,
                ));
                rooms.insert(slug.to_string(), session.clone());
                session
            }
        };
        let users = session.join().await;
        Ok(Some((session, users)))
    }

    /// Detach one subscriber; evict the session when none remain. Eviction
    /// drops only the in-memory copy; the store keeps the room.
    pub async fn release(&self, session: &Arc<RoomSession>) {
        let mut rooms = self.rooms.lock().await;
        if session.detach().await == 0 {
            session.cancel_reveal().await;
            rooms.remove(&session.slug);
            tracing::info!(room = %session.slug, "idle room session evicted");
        }
    }

    /// Whether a session for `slug` is currently resident in memory.
    pub async fn is_resident(&self, slug: &str) -> bool {
        self.rooms.lock().await.contains_key(slug)
    }
}
