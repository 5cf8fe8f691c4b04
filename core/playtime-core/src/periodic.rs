//! Fixed-delay background timers.
//!
//! Each [`PeriodicTask`] owns one thread that sleeps on a stop channel and runs
//! its tick whenever the wait times out. Stopping closes the channel, which
//! wakes the thread immediately; an in-flight tick is allowed to finish
//! within a grace period. A thread still busy after the grace period is
//! detached and left to exit on its own (threads cannot be killed).

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::sync::lock;

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct PeriodicTask {
    name: &'static str,
    stop_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    /// Starts a thread that calls `tick` every `interval`. The first tick runs
    /// one interval after spawning.
    pub fn spawn<F>(name: &'static str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let spawned = thread::Builder::new()
            .name(format!("playtime-{name}"))
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if panic::catch_unwind(AssertUnwindSafe(&mut tick)).is_err() {
                            warn!(task = name, "Periodic tick panicked; continuing");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        let handle = match spawned {
            Ok(handle) => {
                debug!(task = name, interval_ms = interval.as_millis() as u64, "Periodic task started");
                Some(handle)
            }
            Err(err) => {
                warn!(task = name, error = %err, "Failed to spawn periodic task");
                None
            }
        };

        Self {
            name,
            stop_tx: Mutex::new(Some(stop_tx)),
            handle: Mutex::new(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.handle)
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stops scheduling ticks and waits up to `grace` for the thread to exit.
    ///
    /// Returns `true` if the thread finished in time (or was never running).
    /// Calling this again after a stop is a no-op.
    pub fn stop(&self, grace: Duration) -> bool {
        drop(lock(&self.stop_tx).take());

        let Some(handle) = lock(&self.handle).take() else {
            return true;
        };

        let deadline = Instant::now() + grace;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    task = self.name,
                    grace_ms = grace.as_millis() as u64,
                    "Periodic task did not stop within grace period; detaching"
                );
                return false;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        if handle.join().is_err() {
            warn!(task = self.name, "Periodic task thread panicked");
        }
        debug!(task = self.name, "Periodic task stopped");
        true
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        // Signal only; never block in drop.
        if let Ok(stop_tx) = self.stop_tx.get_mut() {
            stop_tx.take();
        }
    }
}
