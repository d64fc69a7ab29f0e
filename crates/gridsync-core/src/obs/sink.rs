//! Metrics sink boundary.
//!
//! Engine logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
//!
//! This module is the only allowed bridge between job execution
//! and the global metrics state.
use crate::obs::metrics;
use std::cell::RefCell;

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<*const dyn MetricsSink>> = const { RefCell::new(None) };
}

///
/// JobKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobKind {
    Sync,
    Fetch,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent {
    JobStart {
        kind: JobKind,
    },
    JobFinish {
        kind: JobKind,
        rows_touched: u64,
    },
    RowsSynchronized {
        inserted: u64,
        updated: u64,
        deleted: u64,
    },
    StatementFailure,
    SavepointRollback,
    SyncFailed,
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent);
}

/// GlobalMetricsSink
/// Default process-local sink that writes into global metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        match event {
            MetricsEvent::JobStart { kind } => metrics::with_state_mut(|m| match kind {
                JobKind::Sync => m.sync_jobs = m.sync_jobs.saturating_add(1),
                JobKind::Fetch => m.segment_fetches = m.segment_fetches.saturating_add(1),
            }),

            MetricsEvent::JobFinish { kind, rows_touched } => {
                metrics::with_state_mut(|m| match kind {
                    JobKind::Fetch => {
                        m.rows_fetched = m.rows_fetched.saturating_add(rows_touched);
                    }
                    JobKind::Sync => {}
                });
            }

            MetricsEvent::RowsSynchronized {
                inserted,
                updated,
                deleted,
            } => {
                metrics::with_state_mut(|m| {
                    m.rows_inserted = m.rows_inserted.saturating_add(inserted);
                    m.rows_updated = m.rows_updated.saturating_add(updated);
                    m.rows_deleted = m.rows_deleted.saturating_add(deleted);
                });
            }

            MetricsEvent::StatementFailure => {
                metrics::with_state_mut(|m| {
                    m.statement_failures = m.statement_failures.saturating_add(1);
                });
            }

            MetricsEvent::SavepointRollback => {
                metrics::with_state_mut(|m| {
                    m.savepoint_rollbacks = m.savepoint_rollbacks.saturating_add(1);
                });
            }

            MetricsEvent::SyncFailed => {
                metrics::with_state_mut(|m| {
                    m.sync_failures = m.sync_failures.saturating_add(1);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent) {
    let override_ptr = SINK_OVERRIDE.with(|cell| *cell.borrow());
    if let Some(ptr) = override_ptr {
        // SAFETY:
        // - `ptr` was produced from a valid `&dyn MetricsSink` in
        //   `with_metrics_sink`, which always restores the previous pointer
        //   before returning, including unwind paths via `Guard::drop`.
        // - `record` is synchronous and never stores `ptr` beyond this call.
        // - Only a shared reference is materialized, matching the shared
        //   borrow used to install the override.
        unsafe { (&*ptr).record(event) };
    } else {
        GLOBAL_METRICS_SINK.record(event);
    }
}

/// Snapshot the current metrics counters for endpoint/test plumbing.
#[must_use]
pub fn metrics_snapshot() -> metrics::Counters {
    metrics::snapshot()
}

/// Reset all metrics counters.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override on this thread.
pub(crate) fn with_metrics_sink<T>(sink: &dyn MetricsSink, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<*const dyn MetricsSink>);

    impl Drop for Guard {
        fn drop(&mut self) {
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = self.0;
            });
        }
    }

    // SAFETY:
    // - `sink_ptr` is installed only for this dynamic scope; `Guard` restores
    //   the previous slot on all exits, including panic.
    // - `record` only dereferences synchronously and never persists the
    //   pointer, so it cannot outlive the borrowed sink.
    let sink_ptr = unsafe { std::mem::transmute::<&dyn MetricsSink, *const dyn MetricsSink>(sink) };
    let prev = SINK_OVERRIDE.with(|cell| {
        let mut slot = cell.borrow_mut();
        slot.replace(sink_ptr)
    });
    let _guard = Guard(prev);

    f()
}

/// Span
/// RAII guard that emits start/finish metrics events for one job.
/// Ensures finish accounting happens even on unwind.

pub(crate) struct Span {
    kind: JobKind,
    rows: u64,
}

impl Span {
    #[must_use]
    pub(crate) fn new(kind: JobKind) -> Self {
        record(MetricsEvent::JobStart { kind });

        Self { kind, rows: 0 }
    }

    pub(crate) const fn set_rows(&mut self, rows: u64) {
        self.rows = rows;
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        record(MetricsEvent::JobFinish {
            kind: self.kind,
            rows_touched: self.rows,
        });
    }
}
