//! Global metrics state.
//!
//! Nothing outside `obs` touches this directly; all writes flow through
//! the sink boundary.

use std::sync::{Mutex, PoisonError};

///
/// Counters
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Counters {
    pub sync_jobs: u64,
    pub sync_failures: u64,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_deleted: u64,
    pub statement_failures: u64,
    pub savepoint_rollbacks: u64,
    pub segment_fetches: u64,
    pub rows_fetched: u64,
}

impl Counters {
    pub(crate) const fn new() -> Self {
        Self {
            sync_jobs: 0,
            sync_failures: 0,
            rows_inserted: 0,
            rows_updated: 0,
            rows_deleted: 0,
            statement_failures: 0,
            savepoint_rollbacks: 0,
            segment_fetches: 0,
            rows_fetched: 0,
        }
    }
}

static STATE: Mutex<Counters> = Mutex::new(Counters::new());

pub(crate) fn with_state_mut<T>(f: impl FnOnce(&mut Counters) -> T) -> T {
    let mut guard = STATE.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

/// Snapshot the current counters for endpoint/test plumbing.
#[must_use]
pub(crate) fn snapshot() -> Counters {
    STATE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Reset all counters.
pub(crate) fn reset_all() {
    with_state_mut(|c| *c = Counters::new());
}
