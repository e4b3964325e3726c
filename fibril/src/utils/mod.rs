//! Small helpers shared across the crate.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, ignoring poisoning.
///
/// Task bodies run under `catch_unwind`, so a poisoned lock only means a
/// panic was already recorded somewhere else; the protected data is still
/// consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
