use std::sync::Arc;

use crate::config::Config;
use crate::server::registry::RoomRegistry;
use crate::store::Store;

pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// Shared application state exposed to handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub store: Store,
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState backed by the given store.
    pub fn new(config: Config, store: Store) -> Self {
        let registry = Arc::new(RoomRegistry::new(store.clone(), config.reveal_delay()));
        Self {
            registry,
            store,
            config: Arc::new(config),
        }
    }
}
