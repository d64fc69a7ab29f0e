use crate::{
    error::{ErrorOrigin, GridError},
    grid::synthesize::{StatementBatch, StatementDescriptor, StatementKind},
    model::{Bindings, SourceEntity},
    obs::sink::{self, JobKind, MetricsEvent, Span},
    traits::{
        ContextFactory, ContextPurpose, DataContainer, ExecutionContext, GeneratedKeyReceiver,
        SavepointId,
    },
    value::Value,
};
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{debug, warn};

///
/// SyncState
/// Session-level latch; only one job may be in flight per row store.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncState {
    Idle,
    Running,
}

///
/// SyncOutcome
///
/// Aggregate result of one synchronization job. The guarantee is
/// best-effort, not strictly atomic: statements from earlier phases that
/// already executed remain applied at the store unless a savepoint rollback
/// undid the whole batch (`rolled_back`).
///

#[derive(Clone, Debug, Default)]
pub struct SyncOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    pub cancelled: bool,
    pub rolled_back: bool,
    pub error: Option<GridError>,
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none() && !self.cancelled
    }
}

///
/// SyncTask
///
/// The work unit executed on the worker thread. Owns everything it touches:
/// the statement batch, handles to the injected collaborators, and the
/// cancellation flag. The grid model itself never crosses the thread
/// boundary; the finished batch travels back for reconciliation.
///

pub(crate) struct SyncTask {
    container: Arc<dyn DataContainer>,
    contexts: Arc<dyn ContextFactory>,
    bindings: Bindings,
    batch: StatementBatch,
    cancel: Arc<AtomicBool>,
}

enum PhaseFlow {
    Continue,
    Halt,
}

impl SyncTask {
    pub(crate) const fn new(
        container: Arc<dyn DataContainer>,
        contexts: Arc<dyn ContextFactory>,
        bindings: Bindings,
        batch: StatementBatch,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            container,
            contexts,
            bindings,
            batch,
            cancel,
        }
    }

    pub(crate) fn run(self) -> (StatementBatch, SyncOutcome) {
        let Self {
            container,
            contexts,
            bindings,
            mut batch,
            cancel,
        } = self;

        let mut span = Span::new(JobKind::Sync);
        let mut outcome = SyncOutcome::default();

        let ctx = match contexts.open_context(ContextPurpose::Sync) {
            Ok(ctx) => ctx,
            Err(err) => {
                outcome.error = Some(GridError::resource(
                    ErrorOrigin::Sync,
                    format!("could not open execution context: {err}"),
                ));
                sink::record(MetricsEvent::SyncFailed);
                return (batch, outcome);
            }
        };
        let mut guard = ContextGuard::new(ctx);

        let auto_commit = match guard.ctx().transactions().is_auto_commit() {
            Ok(auto_commit) => auto_commit,
            Err(err) => {
                warn!(%err, "could not determine autocommit state");
                true
            }
        };

        // Savepoints are best-effort; a failed set degrades to "no partial
        // rollback", never to an aborted job.
        let savepoint = if !auto_commit && guard.ctx().transactions().supports_savepoints() {
            match guard.ctx().transactions().set_savepoint() {
                Ok(savepoint) => Some(savepoint),
                Err(err) => {
                    debug!(%err, "could not set savepoint");
                    None
                }
            }
        } else {
            None
        };

        // Deletes, then inserts, then updates. A failed or cancelled phase
        // halts that phase and everything after it.
        let phases: [&mut Vec<StatementDescriptor>; 3] =
            [&mut batch.deletes, &mut batch.inserts, &mut batch.updates];
        for phase in phases {
            let flow = execute_phase(
                phase,
                container.as_ref(),
                &bindings,
                guard.ctx(),
                &cancel,
                savepoint,
                &mut outcome,
            );
            if matches!(flow, PhaseFlow::Halt) {
                break;
            }
        }

        if let Some(savepoint) = savepoint {
            if let Err(err) = guard.ctx().transactions().release_savepoint(savepoint) {
                debug!(%err, "could not release savepoint");
            }
        }

        // A successful rollback undid every statement of this batch at the
        // store; their executed marks no longer describe durable state.
        if outcome.rolled_back {
            batch.clear_executed();
        }

        if outcome.error.is_some() {
            sink::record(MetricsEvent::SyncFailed);
        }
        sink::record(MetricsEvent::RowsSynchronized {
            inserted: outcome.inserted,
            updated: outcome.updated,
            deleted: outcome.deleted,
        });
        span.set_rows(outcome.deleted + outcome.inserted + outcome.updated);
        guard.close();

        (batch, outcome)
    }
}

fn execute_phase(
    phase: &mut [StatementDescriptor],
    container: &dyn DataContainer,
    bindings: &Bindings,
    ctx: &mut dyn ExecutionContext,
    cancel: &AtomicBool,
    savepoint: Option<SavepointId>,
    outcome: &mut SyncOutcome,
) -> PhaseFlow {
    for stmt in phase {
        if cancel.load(Ordering::SeqCst) {
            outcome.cancelled = true;
            return PhaseFlow::Halt;
        }

        match execute_statement(container, bindings, ctx, stmt) {
            Ok(count) => {
                stmt.executed = true;
                match stmt.kind {
                    StatementKind::Delete => outcome.deleted += count,
                    StatementKind::Insert => outcome.inserted += count,
                    StatementKind::Update => outcome.updated += count,
                }
            }
            Err(err) => {
                sink::record(MetricsEvent::StatementFailure);
                if let Some(savepoint) = savepoint {
                    match ctx.transactions().rollback_to(savepoint) {
                        Ok(()) => {
                            outcome.rolled_back = true;
                            sink::record(MetricsEvent::SavepointRollback);
                        }
                        Err(rollback_err) => {
                            debug!(%rollback_err, "error during savepoint rollback");
                        }
                    }
                }
                outcome.error = Some(GridError::execution(
                    ErrorOrigin::Sync,
                    format!("{} for row {} failed: {err}", stmt.kind, stmt.row),
                ));
                return PhaseFlow::Halt;
            }
        }
    }

    PhaseFlow::Continue
}

fn execute_statement(
    container: &dyn DataContainer,
    bindings: &Bindings,
    ctx: &mut dyn ExecutionContext,
    stmt: &mut StatementDescriptor,
) -> Result<u64, crate::error::ContainerError> {
    match stmt.kind {
        StatementKind::Delete => container.delete_row(ctx, &stmt.key_values),
        StatementKind::Insert => {
            let mut keys = KeyCollector::new(bindings, stmt.entity.clone());
            let count = container.insert_row(ctx, &stmt.change_values, &mut keys)?;
            stmt.generated_keys = keys.keys;
            Ok(count)
        }
        StatementKind::Update => {
            let mut keys = KeyCollector::new(bindings, stmt.entity.clone());
            let count =
                container.update_row(ctx, &stmt.key_values, &stmt.change_values, &mut keys)?;
            stmt.generated_keys = keys.keys;
            Ok(count)
        }
    }
}

///
/// ContextGuard
///
/// Scoped ownership of the job's execution context; closed on every exit
/// path including unwind. Close failures are logged, never propagated: by
/// the time the context closes, the main result is already known.
///

pub(crate) struct ContextGuard {
    ctx: Box<dyn ExecutionContext>,
    closed: bool,
}

impl ContextGuard {
    pub(crate) fn new(ctx: Box<dyn ExecutionContext>) -> Self {
        Self { ctx, closed: false }
    }

    pub(crate) fn ctx(&mut self) -> &mut dyn ExecutionContext {
        &mut *self.ctx
    }

    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.ctx.close() {
            warn!(%err, "error closing execution context");
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.close();
    }
}

///
/// KeyCollector
///
/// Routes store-reported generated key values onto grid columns: by
/// attribute name when one matches, otherwise onto the first sequence
/// column. Unroutable keys are logged and skipped.
///

struct KeyCollector<'a> {
    bindings: &'a Bindings,
    entity: SourceEntity,
    keys: BTreeMap<usize, Value>,
}

impl<'a> KeyCollector<'a> {
    const fn new(bindings: &'a Bindings, entity: SourceEntity) -> Self {
        Self {
            bindings,
            entity,
            keys: BTreeMap::new(),
        }
    }
}

impl GeneratedKeyReceiver for KeyCollector<'_> {
    fn push_key(&mut self, attribute_name: &str, value: Value) {
        // Some drivers report empty generated keys on plain updates of
        // auto-increment tables; nothing can be done with those.
        if value.is_null() {
            return;
        }

        let by_name = if attribute_name.is_empty() {
            None
        } else {
            self.bindings
                .column_by_name(Some(&self.entity), attribute_name)
        };

        match by_name.or_else(|| self.bindings.first_sequence_column()) {
            Some(col) => {
                self.keys.insert(col, value);
            }
            None => {
                debug!(key = attribute_name, "no target column for generated key");
            }
        }
    }
}
