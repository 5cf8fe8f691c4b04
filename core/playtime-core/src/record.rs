//! Per-subject session bookkeeping.
//!
//! A record holds closed time per partition plus at most one open session per
//! partition. It has no synchronization of its own; [`SessionStore`] keeps
//! each record behind its own mutex.
//!
//! Invariants:
//! - `open_since` has at most one entry per partition and an open partition is
//!   never re-opened (starting is idempotent).
//! - `cumulative` only holds closed time. Live time is computed on demand.
//! - Closing credits the elapsed time exactly once and removes the open entry.
//!
//! [`SessionStore`]: crate::store::SessionStore

use std::collections::HashMap;

use crate::ids::PartitionId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    cumulative: HashMap<PartitionId, u64>,
    open_since: HashMap<PartitionId, u64>,
}

impl SessionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session in `partition` at `now`. Returns `false` if one was already open.
    pub fn start_session(&mut self, partition: PartitionId, now: u64) -> bool {
        if self.open_since.contains_key(&partition) {
            return false;
        }
        self.open_since.insert(partition, now);
        true
    }

    /// Closes the session in `partition`, crediting the elapsed time.
    ///
    /// Returns the credited duration, or `None` when nothing was open.
    /// A clock that moved backwards credits zero.
    pub fn end_session(&mut self, partition: PartitionId, now: u64) -> Option<u64> {
        let started = self.open_since.remove(&partition)?;
        let elapsed = now.saturating_sub(started);
        self.add_playtime(partition, elapsed);
        Some(elapsed)
    }

    /// Closes every open session. Returns how many were closed.
    pub fn end_all_sessions(&mut self, now: u64) -> usize {
        let open: Vec<PartitionId> = self.open_since.keys().copied().collect();
        let mut closed = 0;
        for partition in open {
            if self.end_session(partition, now).is_some() {
                closed += 1;
            }
        }
        closed
    }

    /// Credits closed time directly.
    pub fn add_playtime(&mut self, partition: PartitionId, duration_ms: u64) {
        let entry = self.cumulative.entry(partition).or_insert(0);
        *entry = entry.saturating_add(duration_ms);
    }

    /// Overwrites the closed time for `partition`. Open sessions are untouched.
    pub fn set_playtime(&mut self, partition: PartitionId, duration_ms: u64) {
        self.cumulative.insert(partition, duration_ms);
    }

    /// Sum of closed time across all partitions.
    pub fn total_playtime(&self) -> u64 {
        self.cumulative
            .values()
            .fold(0u64, |acc, value| acc.saturating_add(*value))
    }

    pub fn playtime_in(&self, partition: PartitionId) -> u64 {
        self.cumulative.get(&partition).copied().unwrap_or(0)
    }

    /// Live elapsed time of the open session in `partition`, zero if none.
    pub fn current_session_elapsed(&self, partition: PartitionId, now: u64) -> u64 {
        self.open_since
            .get(&partition)
            .map(|started| now.saturating_sub(*started))
            .unwrap_or(0)
    }

    /// Closed time plus the live elapsed time of every open session.
    pub fn live_total(&self, now: u64) -> u64 {
        self.open_since
            .values()
            .map(|started| now.saturating_sub(*started))
            .fold(self.total_playtime(), u64::saturating_add)
    }

    pub fn has_open_session(&self, partition: PartitionId) -> bool {
        self.open_since.contains_key(&partition)
    }

    pub fn open_partitions(&self) -> impl Iterator<Item = PartitionId> + '_ {
        self.open_since.keys().copied()
    }

    /// Closed time per partition; this is what gets persisted.
    pub fn cumulative(&self) -> &HashMap<PartitionId, u64> {
        &self.cumulative
    }
}
