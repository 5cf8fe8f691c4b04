//! Wires every component together for a host process.

use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::preferences::DisplayPreferences;
use crate::presence::{DisplayBoard, PresenceCoordinator};
use crate::storage::StorageConfig;
use crate::store::{SessionObserver, SessionStore};
use crate::tracker::ActivityTracker;

pub struct PlaytimeEngine {
    storage: StorageConfig,
    store: Arc<SessionStore>,
    tracker: Arc<ActivityTracker>,
    presence: PresenceCoordinator,
}

impl PlaytimeEngine {
    /// Loads persisted state from `storage` and starts the autosave and
    /// display refresh timers.
    pub fn start(storage: StorageConfig, config: &RuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        if let Err(err) = storage.ensure_root() {
            warn!(error = %err, root = %storage.root().display(), "Data directory unavailable");
        }

        let board = Arc::new(DisplayBoard::new());
        let store = Arc::new(SessionStore::open(
            storage.playtime_file(),
            clock,
            Some(Arc::clone(&board) as Arc<dyn SessionObserver>),
        ));
        let preferences = Arc::new(DisplayPreferences::open(storage.preferences_file()));
        let tracker = Arc::new(ActivityTracker::start(
            Arc::clone(&store),
            config.autosave_interval(),
            config.shutdown_grace(),
        ));
        let presence = PresenceCoordinator::start(
            Arc::clone(&tracker),
            Arc::clone(&store),
            board,
            preferences,
            config.refresh_interval(),
            config.shutdown_grace(),
        );

        info!(root = %storage.root().display(), "Playtime engine started");
        Self {
            storage,
            store,
            tracker,
            presence,
        }
    }

    pub fn presence(&self) -> &PresenceCoordinator {
        &self.presence
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// Coordinator first, then tracker, then a final save. Safe to call twice.
    pub fn shutdown(&self) {
        self.presence.shutdown();
        self.tracker.shutdown();
        self.store.save();
        info!(saves = self.store.save_count(), "Playtime engine stopped");
    }
}
