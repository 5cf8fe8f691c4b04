//! Which partition each active subject is in right now.
//!
//! Activity reports drive session transitions through the [`SessionStore`]:
//!
//! | Current assignment | Report for `P`             | Effect                               |
//! |--------------------|----------------------------|--------------------------------------|
//! | none               | `P`                        | assign `P`, start session in `P`     |
//! | `P`                | `P`                        | nothing                              |
//! | `Q` (≠ `P`)        | `P`                        | end session in `Q`, assign and start `P` |
//!
//! The old session is always closed before the new one opens, so a subject is
//! never credited in two partitions at once and the tail of the old session is
//! never dropped.
//!
//! Each subject has its own assignment slot behind a mutex; the whole
//! transition runs under that lock, so two near-simultaneous reports for the
//! same subject are applied one after the other.
//!
//! An autosave timer persists the store every `autosave_interval`, independent
//! of the save that happens when a session ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::ids::{PartitionId, SubjectId};
use crate::periodic::PeriodicTask;
use crate::store::SessionStore;
use crate::sync::lock;

type AssignmentSlot = Arc<Mutex<Option<PartitionId>>>;

pub struct ActivityTracker {
    store: Arc<SessionStore>,
    assignments: DashMap<SubjectId, AssignmentSlot>,
    autosave: PeriodicTask,
    shutdown_grace: Duration,
    shut_down: AtomicBool,
}

impl ActivityTracker {
    /// Creates the tracker and starts its autosave timer.
    pub fn start(
        store: Arc<SessionStore>,
        autosave_interval: Duration,
        shutdown_grace: Duration,
    ) -> Self {
        let autosave_store = Arc::clone(&store);
        let autosave = PeriodicTask::spawn("autosave", autosave_interval, move || {
            autosave_store.save();
        });

        Self {
            store,
            assignments: DashMap::new(),
            autosave,
            shutdown_grace,
            shut_down: AtomicBool::new(false),
        }
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Number of subjects with an assignment slot, assigned or not.
    pub fn known_subjects(&self) -> usize {
        self.assignments.len()
    }

    fn slot(&self, subject: SubjectId) -> AssignmentSlot {
        Arc::clone(self.assignments.entry(subject).or_default().value())
    }

    /// Reports that `subject` is active in `partition`.
    ///
    /// Ignored after [`shutdown`](Self::shutdown).
    pub fn register_player(&self, subject: SubjectId, partition: PartitionId) {
        if self.is_shut_down() {
            debug!(subject = %subject, "Ignoring activity after shutdown");
            return;
        }

        let slot = self.slot(subject);
        let mut current = lock(&slot);

        // Shutdown may have started while we waited for the slot.
        if self.is_shut_down() {
            debug!(subject = %subject, "Ignoring activity after shutdown");
            return;
        }

        match *current {
            Some(existing) if existing == partition => return,
            Some(previous) => {
                debug!(
                    subject = %subject,
                    from = %previous,
                    to = %partition,
                    "Partition transition"
                );
                self.store.end_session(subject, previous);
            }
            None => {
                debug!(subject = %subject, partition = %partition, "Subject registered");
            }
        }

        *current = Some(partition);
        self.store.start_session(subject, partition);
    }

    /// Stops tracking `subject`, crediting its current session.
    pub fn unregister_player(&self, subject: SubjectId) {
        let Some(slot) = self
            .assignments
            .get(&subject)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return;
        };

        let mut current = lock(&slot);
        if let Some(partition) = current.take() {
            debug!(subject = %subject, partition = %partition, "Subject unregistered");
            self.store.end_session(subject, partition);
        }
    }

    pub fn current_partition(&self, subject: SubjectId) -> Option<PartitionId> {
        let slot = self
            .assignments
            .get(&subject)
            .map(|entry| Arc::clone(entry.value()))?;
        let current = *lock(&slot);
        current
    }

    /// Every subject that currently has a partition assignment.
    pub fn active_players(&self) -> HashMap<SubjectId, PartitionId> {
        self.slots()
            .into_iter()
            .filter_map(|(subject, slot)| {
                let current = *lock(&slot);
                current.map(|partition| (subject, partition))
            })
            .collect()
    }

    fn slots(&self) -> Vec<(SubjectId, AssignmentSlot)> {
        self.assignments
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    /// Ends every open session of every assigned subject, clears all
    /// assignments, saves once, and stops the autosave timer.
    ///
    /// Idempotent. Activity reported afterwards is ignored.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut closed = 0;
        for (subject, slot) in self.slots() {
            let mut current = lock(&slot);
            if current.take().is_some() {
                closed += self.store.close_all_sessions(subject);
            }
        }

        self.store.save();
        self.autosave.stop(self.shutdown_grace);
        info!(closed_sessions = closed, "Activity tracker shut down");
    }
}
