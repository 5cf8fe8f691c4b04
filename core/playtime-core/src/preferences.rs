//! Persisted live-display opt-in, one flag per subject.
//!
//! Stored in its own file, separate from playtime totals, so the choice
//! survives restarts even though live display handles do not.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::ids::SubjectId;
use crate::snapshot;
use crate::sync::lock;

pub struct DisplayPreferences {
    flags: DashMap<SubjectId, bool>,
    path: Option<PathBuf>,
    save_lock: Mutex<()>,
}

impl DisplayPreferences {
    /// Loads preferences from `path`. Missing or unreadable files start empty.
    pub fn open(path: PathBuf) -> Self {
        let prefs = Self {
            flags: DashMap::new(),
            path: Some(path),
            save_lock: Mutex::new(()),
        };
        prefs.load();
        prefs
    }

    pub fn new_in_memory() -> Self {
        Self {
            flags: DashMap::new(),
            path: None,
            save_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn load(&self) {
        let Some(path) = self.path.as_deref() else {
            return;
        };

        let object = match snapshot::read_object(path) {
            Ok(Some(object)) => object,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, path = %path.display(), "Failed to load display preferences");
                return;
            }
        };

        let (flags, skipped) = snapshot::decode_preferences(object);
        if skipped > 0 {
            warn!(skipped, path = %path.display(), "Skipped malformed display preferences");
        }
        info!(subjects = flags.len(), "Display preferences loaded");
        for (subject, enabled) in flags {
            self.flags.insert(subject, enabled);
        }
    }

    /// Unknown subjects default to disabled.
    pub fn is_enabled(&self, subject: SubjectId) -> bool {
        self.flags.get(&subject).map(|flag| *flag).unwrap_or(false)
    }

    /// Records the flag and writes the whole document. Write failures are
    /// logged; the in-memory value still changes.
    pub fn set_enabled(&self, subject: SubjectId, enabled: bool) {
        self.flags.insert(subject, enabled);
        debug!(subject = %subject, enabled, "Display preference updated");
        self.save();
    }

    fn save(&self) {
        let Some(path) = self.path.as_deref() else {
            return;
        };

        let _serialized = lock(&self.save_lock);
        let document: BTreeMap<String, bool> = self
            .flags
            .iter()
            .map(|entry| (entry.key().to_string(), *entry.value()))
            .collect();

        if let Err(err) = snapshot::write_atomic(path, &document) {
            warn!(error = %err, path = %path.display(), "Failed to save display preferences");
        }
    }
}
