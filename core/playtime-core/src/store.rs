//! Process-wide session store.
//!
//! Maps each subject to its [`SessionRecord`], creating records lazily on
//! first reference. Records are never removed.
//!
//! # Concurrency
//!
//! The map is a [`DashMap`], so unrelated subjects never contend on a global
//! lock and "create if absent" is atomic per key. Each record sits behind its
//! own `Mutex`; every read-modify-write of a record happens under that lock,
//! which serializes concurrent operations on the same subject.
//!
//! Lock order is always map shard → (released) → record. No code path holds a
//! record lock while touching the map, so the two can never deadlock.
//!
//! # Persistence
//!
//! Only closed playtime is written. Ending a session persists the whole store
//! immediately; the tracker's autosave and shutdown cover the rest. Saves are
//! serialized among themselves so a later save never writes older data than
//! an earlier one. Saves are not linearizable with concurrent session
//! mutations; the on-disk snapshot is eventually consistent.
//!
//! I/O failures are logged and swallowed: in-memory state stays authoritative.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::ids::{PartitionId, SubjectId};
use crate::record::SessionRecord;
use crate::snapshot;
use crate::sync::lock;

/// Receives a callback whenever a session ends.
///
/// A store has at most one observer, fixed at construction. The callback runs
/// after the record lock has been released. On [`SessionStore::end_session`]
/// the snapshot has already been written; on
/// [`SessionStore::close_all_sessions`] nothing is written and the caller
/// saves later.
pub trait SessionObserver: Send + Sync {
    /// `live_total_ms` is the subject's closed time plus any still-open sessions.
    fn session_ended(&self, subject: SubjectId, live_total_ms: u64);
}

/// Playtime for one partition as shown to the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionReport {
    pub partition: PartitionId,
    /// Closed time plus the live session, if any.
    pub total_ms: u64,
    /// Elapsed time of the open session only.
    pub session_ms: u64,
}

type SharedRecord = Arc<Mutex<SessionRecord>>;

pub struct SessionStore {
    records: DashMap<SubjectId, SharedRecord>,
    snapshot_path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    observer: Option<Arc<dyn SessionObserver>>,
    save_lock: Mutex<()>,
    saves: AtomicU64,
}

impl SessionStore {
    /// Creates a store backed by `snapshot_path` and loads any prior snapshot.
    pub fn open(
        snapshot_path: PathBuf,
        clock: Arc<dyn Clock>,
        observer: Option<Arc<dyn SessionObserver>>,
    ) -> Self {
        let store = Self {
            records: DashMap::new(),
            snapshot_path: Some(snapshot_path),
            clock,
            observer,
            save_lock: Mutex::new(()),
            saves: AtomicU64::new(0),
        };
        store.load();
        store
    }

    /// Creates a store that never touches the filesystem.
    pub fn new_in_memory(clock: Arc<dyn Clock>, observer: Option<Arc<dyn SessionObserver>>) -> Self {
        Self {
            records: DashMap::new(),
            snapshot_path: None,
            clock,
            observer,
            save_lock: Mutex::new(()),
            saves: AtomicU64::new(0),
        }
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Returns the subject's record, creating it if absent.
    ///
    /// Concurrent first access from many threads still yields a single record.
    pub fn get(&self, subject: SubjectId) -> Arc<Mutex<SessionRecord>> {
        Arc::clone(self.records.entry(subject).or_default().value())
    }

    fn existing(&self, subject: SubjectId) -> Option<SharedRecord> {
        self.records
            .get(&subject)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Runs `read` under the record lock, if the record exists.
    fn read<R>(&self, subject: SubjectId, read: impl FnOnce(&SessionRecord) -> R) -> Option<R> {
        let record = self.existing(subject)?;
        let guard = lock(&record);
        Some(read(&guard))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Opens a session for `subject` in `partition`. No-op if one is already open.
    pub fn start_session(&self, subject: SubjectId, partition: PartitionId) -> bool {
        let now = self.clock.now_ms();
        let record = self.get(subject);
        let started = lock(&record).start_session(partition, now);
        if started {
            debug!(subject = %subject, partition = %partition, "Session started");
        }
        started
    }

    /// Closes the subject's session in `partition`, then persists the store
    /// and notifies the observer.
    ///
    /// Returns `false` (and does nothing else) when no session was open.
    pub fn end_session(&self, subject: SubjectId, partition: PartitionId) -> bool {
        let Some(record) = self.existing(subject) else {
            return false;
        };

        let now = self.clock.now_ms();
        let (credited, live_total) = {
            let mut guard = lock(&record);
            let credited = guard.end_session(partition, now);
            (credited, guard.live_total(now))
        };

        let Some(elapsed_ms) = credited else {
            return false;
        };
        debug!(subject = %subject, partition = %partition, elapsed_ms, "Session ended");

        self.save();
        self.notify(subject, live_total);
        true
    }

    /// Closes every open session for `subject` without persisting.
    ///
    /// Used by shutdown paths that end many sessions and then save once.
    /// The observer is still notified when anything was closed.
    pub fn close_all_sessions(&self, subject: SubjectId) -> usize {
        let Some(record) = self.existing(subject) else {
            return 0;
        };

        let now = self.clock.now_ms();
        let (closed, live_total) = {
            let mut guard = lock(&record);
            let closed = guard.end_all_sessions(now);
            (closed, guard.live_total(now))
        };

        if closed > 0 {
            debug!(subject = %subject, closed, "Closed open sessions");
            self.notify(subject, live_total);
        }
        closed
    }

    fn notify(&self, subject: SubjectId, live_total_ms: u64) {
        if let Some(observer) = &self.observer {
            observer.session_ended(subject, live_total_ms);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn has_open_session(&self, subject: SubjectId, partition: PartitionId) -> bool {
        self.read(subject, |record| record.has_open_session(partition))
            .unwrap_or(false)
    }

    /// Closed playtime across all partitions.
    pub fn total_playtime(&self, subject: SubjectId) -> u64 {
        self.read(subject, SessionRecord::total_playtime)
            .unwrap_or(0)
    }

    /// Closed playtime plus the live elapsed time of any open sessions.
    pub fn live_total(&self, subject: SubjectId) -> u64 {
        let now = self.clock.now_ms();
        self.read(subject, |record| record.live_total(now))
            .unwrap_or(0)
    }

    /// Closed playtime per partition.
    pub fn totals(&self, subject: SubjectId) -> HashMap<PartitionId, u64> {
        self.read(subject, |record| record.cumulative().clone())
            .unwrap_or_default()
    }

    pub fn partition_report(&self, subject: SubjectId, partition: PartitionId) -> PartitionReport {
        let now = self.clock.now_ms();
        let (closed, session_ms) = self
            .read(subject, |record| {
                (
                    record.playtime_in(partition),
                    record.current_session_elapsed(partition, now),
                )
            })
            .unwrap_or((0, 0));

        PartitionReport {
            partition,
            total_ms: closed.saturating_add(session_ms),
            session_ms,
        }
    }

    pub fn subjects(&self) -> Vec<SubjectId> {
        self.records.iter().map(|entry| *entry.key()).collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────

    /// Number of snapshots successfully written by this store.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Writes every subject's closed playtime to the snapshot file.
    ///
    /// Open sessions are not included. Failures are logged, never returned.
    pub fn save(&self) {
        let Some(path) = self.snapshot_path.as_deref() else {
            return;
        };

        let _serialized = lock(&self.save_lock);

        let records: Vec<(SubjectId, SharedRecord)> = self
            .records
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        let cumulative: Vec<(SubjectId, HashMap<PartitionId, u64>)> = records
            .iter()
            .map(|(subject, record)| (*subject, lock(record).cumulative().clone()))
            .collect();
        let document =
            snapshot::encode_playtime(cumulative.iter().map(|(subject, totals)| (*subject, totals)));

        match snapshot::write_atomic(path, &document) {
            Ok(()) => {
                let count = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(subjects = document.len(), saves = count, "Playtime snapshot saved");
            }
            Err(err) => {
                warn!(error = %err, path = %path.display(), "Failed to save playtime data");
            }
        }
    }

    /// Reads the snapshot file into the store.
    ///
    /// Persisted totals replace the in-memory closed time for each listed
    /// partition, so loading twice never credits anything twice. Open
    /// sessions are kept. A missing file means no prior data. Malformed
    /// entries are skipped individually.
    pub fn load(&self) {
        let Some(path) = self.snapshot_path.as_deref() else {
            return;
        };

        let object = match snapshot::read_object(path) {
            Ok(Some(object)) => object,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, path = %path.display(), "Failed to load playtime data");
                return;
            }
        };

        let (decoded, skipped) = snapshot::decode_playtime(object);
        if skipped > 0 {
            warn!(skipped, path = %path.display(), "Skipped malformed playtime entries");
        }

        let subjects = decoded.len();
        for (subject, totals) in decoded {
            let record = self.get(subject);
            let mut guard = lock(&record);
            for (partition, millis) in totals {
                guard.set_playtime(partition, millis);
            }
        }
        info!(subjects, path = %path.display(), "Playtime data loaded");
    }
}
