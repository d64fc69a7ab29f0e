use crate::{
    error::{ErrorOrigin, GridError},
    grid::{
        model::GridModel,
        pager::{Pager, PagerConfig, ReorderStrategy, local_sort},
        reconcile::reconcile,
        sync::{ContextGuard, SyncOutcome, SyncState, SyncTask},
        synthesize::{StatementBatch, synthesize},
    },
    model::{Bindings, CellPos, ColumnSort, Row, SortSpec},
    obs::sink::{JobKind, Span},
    traits::{ContextFactory, ContextPurpose, DataContainer},
    value::Value,
};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

///
/// GridEvent
/// Completion notifications surfaced to the session's single consumer.
///

#[derive(Debug)]
pub enum GridEvent {
    SyncFinished {
        inserted: u64,
        updated: u64,
        deleted: u64,
        rows_changed: bool,
        cancelled: bool,
        rolled_back: bool,
        error: Option<GridError>,
    },
    SegmentFetched {
        rows: usize,
        replaced: bool,
        has_more: bool,
    },
    FetchFailed {
        error: GridError,
    },
}

///
/// SortOutcome
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortOutcome {
    /// The new order was applied with a local stable sort. Pending edits
    /// were rejected first; the sort runs over the fetched baseline.
    Sorted(ColumnSort),
    /// The source must re-deliver the data in the new order. Refetching
    /// discards pending edits, so the caller confirms before invoking
    /// [`GridSession::refetch`] with this limit.
    RefetchRequired { sort: ColumnSort, limit: usize },
}

pub(crate) struct SyncNotice {
    batch: StatementBatch,
    outcome: SyncOutcome,
}

pub(crate) struct FetchNotice {
    result: Result<Vec<Row>, GridError>,
    replace: bool,
    requested: usize,
}

pub(crate) enum GridNotice {
    Sync(SyncNotice),
    Fetch(FetchNotice),
}

enum InFlight {
    Sync { cancel: Arc<AtomicBool> },
    Fetch,
}

///
/// GridSession
///
/// The coordinating owner of one result grid: the model, the pager, and
/// the injected store collaborators. All mutation enters on the owning
/// thread; background jobs receive owned data and report back through the
/// notice channel, which `process_notices` drains on this thread. Only one
/// background unit may be in flight at a time.
///

pub struct GridSession {
    model: GridModel,
    container: Arc<dyn DataContainer>,
    contexts: Arc<dyn ContextFactory>,
    pager: Pager,
    sort: SortSpec,
    tx: Sender<GridNotice>,
    rx: Receiver<GridNotice>,
    busy: Option<InFlight>,
}

impl GridSession {
    #[must_use]
    pub fn new(
        bindings: Bindings,
        container: Arc<dyn DataContainer>,
        contexts: Arc<dyn ContextFactory>,
        config: PagerConfig,
    ) -> Self {
        let (tx, rx) = unbounded();

        Self {
            model: GridModel::new(bindings),
            container,
            contexts,
            pager: Pager::new(config),
            sort: SortSpec::new(),
            tx,
            rx,
            busy: None,
        }
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    #[must_use]
    pub const fn model(&self) -> &GridModel {
        &self.model
    }

    #[must_use]
    pub const fn pager(&self) -> &Pager {
        &self.pager
    }

    #[must_use]
    pub const fn sort(&self) -> &SortSpec {
        &self.sort
    }

    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    #[must_use]
    pub const fn sync_state(&self) -> SyncState {
        match self.busy {
            Some(InFlight::Sync { .. }) => SyncState::Running,
            _ => SyncState::Idle,
        }
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.model.has_changes()
    }

    // ---------------------------------------------------------------------
    // Model mutation (delegated; rejected at the call site when the
    // dataset is not editable)
    // ---------------------------------------------------------------------

    pub fn update_cell(&mut self, pos: CellPos, value: Value) -> Result<bool, GridError> {
        self.model.update_cell(pos, value)
    }

    pub fn revert_cell(&mut self, pos: CellPos) -> Result<bool, GridError> {
        self.model.revert_cell(pos)
    }

    pub fn set_cell_null(&mut self, pos: CellPos) -> Result<bool, GridError> {
        self.model.set_cell_null(pos)
    }

    pub fn paste_cell(&mut self, pos: CellPos, text: &str) -> Result<bool, GridError> {
        self.model.paste_cell(pos, text)
    }

    pub fn add_row(&mut self, at: usize, copy_current: bool) -> Result<usize, GridError> {
        self.model.add_row(at, copy_current)
    }

    pub fn delete_rows(&mut self, rows: &[usize]) -> Result<usize, GridError> {
        self.model.delete_rows(rows)
    }

    /// Seed the model from an externally driven fetch.
    pub fn set_data(&mut self, rows: Vec<Row>, has_more: bool) -> Result<(), GridError> {
        self.check_not_busy()?;
        self.model.set_data(rows);
        self.pager.set_has_more(has_more);
        Ok(())
    }

    /// Revert every pending change in memory. Returns whether the row set
    /// changed.
    pub fn reject_changes(&mut self) -> Result<bool, GridError> {
        self.check_not_busy()?;
        Ok(self.model.reject_changes())
    }

    // ---------------------------------------------------------------------
    // Commit
    // ---------------------------------------------------------------------

    /// Synthesize the pending edits into statements and execute them on a
    /// background job. Returns whether a job was spawned (`false` when
    /// there was nothing to commit).
    ///
    /// Validation failures (multi-source dataset, missing key identifier)
    /// surface here synchronously, before any statement is built. A second
    /// call while a job is in flight is rejected with a busy error.
    pub fn apply_changes(&mut self) -> Result<bool, GridError> {
        self.check_not_busy()?;
        self.model.check_editable()?;
        self.model.check_entity_identifier()?;

        let batch = synthesize(&self.model)?;
        if batch.is_empty() {
            return Ok(false);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let task = SyncTask::new(
            Arc::clone(&self.container),
            Arc::clone(&self.contexts),
            self.model.bindings().clone(),
            batch,
            Arc::clone(&cancel),
        );
        let tx = self.tx.clone();

        thread::Builder::new()
            .name("gridsync-sync".into())
            .spawn(move || {
                let (batch, outcome) = task.run();
                let _ = tx.send(GridNotice::Sync(SyncNotice { batch, outcome }));
            })
            .map_err(|err| {
                GridError::resource(
                    ErrorOrigin::Sync,
                    format!("could not spawn sync worker: {err}"),
                )
            })?;

        self.busy = Some(InFlight::Sync { cancel });

        Ok(true)
    }

    /// Request cancellation of the in-flight sync job. The flag is checked
    /// between statements, never mid-statement; whatever executed before
    /// the check still reconciles.
    pub fn cancel_sync(&self) -> bool {
        if let Some(InFlight::Sync { cancel }) = &self.busy {
            cancel.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    // ---------------------------------------------------------------------
    // Sorting and paging
    // ---------------------------------------------------------------------

    /// Cycle the sort state of `attribute` and serve the new order.
    ///
    /// When the source can order server-side and rows beyond the fetched
    /// window may exist, the new order requires a refetch; the sort spec is
    /// already updated and the caller confirms with [`Self::refetch`].
    pub fn toggle_sort(
        &mut self,
        attribute: &str,
        exclusive: bool,
        visible_row: usize,
    ) -> Result<SortOutcome, GridError> {
        self.check_not_busy()?;

        let sort = self.sort.toggle(attribute, exclusive);

        match self
            .pager
            .reorder_strategy(self.container.features(), visible_row)
        {
            ReorderStrategy::Refetch { limit } => Ok(SortOutcome::RefetchRequired { sort, limit }),
            ReorderStrategy::LocalSort => {
                local_sort(&mut self.model, &self.sort);
                Ok(SortOutcome::Sorted(sort))
            }
        }
    }

    /// Re-fetch the data from offset zero with the current sort order.
    /// Discards pending edits.
    pub fn refetch(&mut self, limit: usize) -> Result<(), GridError> {
        self.check_not_busy()?;
        self.model.reject_changes();
        self.spawn_fetch(0, limit, true)
    }

    /// Fetch the next segment when more data may exist. Returns whether a
    /// fetch was started.
    pub fn read_next_segment(&mut self) -> Result<bool, GridError> {
        if !self.pager.has_more_data() || self.busy.is_some() {
            return Ok(false);
        }

        let offset = self.model.row_count();
        let limit = self.pager.segment_size();
        self.pager.set_has_more(false);
        self.spawn_fetch(offset, limit, false)?;

        Ok(true)
    }

    fn spawn_fetch(&mut self, offset: usize, limit: usize, replace: bool) -> Result<(), GridError> {
        let container = Arc::clone(&self.container);
        let contexts = Arc::clone(&self.contexts);
        let order = self.sort.clone();
        let tx = self.tx.clone();

        thread::Builder::new()
            .name("gridsync-fetch".into())
            .spawn(move || {
                let mut span = Span::new(JobKind::Fetch);
                let result =
                    fetch_segment(container.as_ref(), contexts.as_ref(), &order, offset, limit);
                if let Ok(rows) = &result {
                    span.set_rows(rows.len() as u64);
                }
                let _ = tx.send(GridNotice::Fetch(FetchNotice {
                    result,
                    replace,
                    requested: limit,
                }));
            })
            .map_err(|err| {
                GridError::resource(
                    ErrorOrigin::Pager,
                    format!("could not spawn fetch worker: {err}"),
                )
            })?;

        self.busy = Some(InFlight::Fetch);

        Ok(())
    }

    // ---------------------------------------------------------------------
    // Notice processing (coordinating thread only)
    // ---------------------------------------------------------------------

    /// Drain completion notices and apply them to the model. Must be called
    /// from the thread that owns this session; it is the only place where
    /// job results touch the row store and the ledger.
    pub fn process_notices(&mut self) -> Vec<GridEvent> {
        let mut events = Vec::new();
        while let Ok(notice) = self.rx.try_recv() {
            events.push(self.handle_notice(notice));
        }

        events
    }

    /// Block up to `timeout` for the next notice, then drain the rest.
    /// Intended for headless callers without an event loop.
    pub fn wait_for_notices(&mut self, timeout: Duration) -> Vec<GridEvent> {
        let Ok(notice) = self.rx.recv_timeout(timeout) else {
            return Vec::new();
        };

        let mut events = vec![self.handle_notice(notice)];
        events.extend(self.process_notices());

        events
    }

    fn handle_notice(&mut self, notice: GridNotice) -> GridEvent {
        match notice {
            GridNotice::Sync(SyncNotice { batch, outcome }) => {
                self.busy = None;
                let rows_changed = reconcile(&mut self.model, &batch);

                GridEvent::SyncFinished {
                    inserted: outcome.inserted,
                    updated: outcome.updated,
                    deleted: outcome.deleted,
                    rows_changed,
                    cancelled: outcome.cancelled,
                    rolled_back: outcome.rolled_back,
                    error: outcome.error,
                }
            }
            GridNotice::Fetch(FetchNotice {
                result,
                replace,
                requested,
            }) => {
                self.busy = None;
                match result {
                    Ok(rows) => {
                        let fetched = rows.len();
                        self.pager.note_segment(fetched, requested);
                        if replace {
                            self.model.set_data(rows);
                        } else {
                            self.model.append_rows(rows);
                        }

                        GridEvent::SegmentFetched {
                            rows: fetched,
                            replaced: replace,
                            has_more: self.pager.has_more_data(),
                        }
                    }
                    Err(error) => GridEvent::FetchFailed { error },
                }
            }
        }
    }

    fn check_not_busy(&self) -> Result<(), GridError> {
        if self.busy.is_some() {
            return Err(GridError::busy(
                "a synchronization or fetch is already in flight",
            ));
        }

        Ok(())
    }
}

fn fetch_segment(
    container: &dyn DataContainer,
    contexts: &dyn ContextFactory,
    order: &SortSpec,
    offset: usize,
    limit: usize,
) -> Result<Vec<Row>, GridError> {
    let ctx = contexts.open_context(ContextPurpose::Fetch).map_err(|err| {
        GridError::resource(
            ErrorOrigin::Pager,
            format!("could not open execution context: {err}"),
        )
    })?;
    let mut guard = ContextGuard::new(ctx);

    let rows = container
        .read_segment(guard.ctx(), order, offset, limit)
        .map_err(GridError::from)?;
    guard.close();

    Ok(rows)
}
