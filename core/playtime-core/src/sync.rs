//! Poison-tolerant locking.
//!
//! A panic while holding one of our locks leaves plain data behind (maps of
//! integers and strings), so recovering the guard is always safe.

use std::sync::{Mutex, MutexGuard};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
