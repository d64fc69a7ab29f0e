use crate::{
    error::{ErrorOrigin, GridError},
    grid::{ledger::EditLedger, store::RowStore},
    model::{Bindings, CellPos, Row, RowIdentifier, SourceEntity},
    value::Value,
};
use std::collections::BTreeSet;
use tracing::warn;

///
/// GridModel
///
/// Owns the row store and the edit ledger together so every row splice and
/// its ledger index shift happen inside one call; no caller can observe the
/// two out of step. All user mutations enter through here and are rejected
/// at the call site when the dataset is not editable.
///

#[derive(Debug)]
pub struct GridModel {
    bindings: Bindings,
    store: RowStore,
    ledger: EditLedger,
    single_source: Option<SourceEntity>,
}

impl GridModel {
    #[must_use]
    pub fn new(bindings: Bindings) -> Self {
        let single_source = bindings.single_source().cloned();

        Self {
            bindings,
            store: RowStore::new(),
            ledger: EditLedger::new(),
            single_source,
        }
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    #[must_use]
    pub const fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    #[must_use]
    pub const fn store(&self) -> &RowStore {
        &self.store
    }

    #[must_use]
    pub const fn ledger(&self) -> &EditLedger {
        &self.ledger
    }

    #[must_use]
    pub const fn single_source(&self) -> Option<&SourceEntity> {
        self.single_source.as_ref()
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.store.row_count()
    }

    #[must_use]
    pub fn cell(&self, pos: CellPos) -> Option<&Value> {
        self.store.cell(pos)
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.ledger.has_changes()
    }

    #[must_use]
    pub fn is_row_added(&self, row: usize) -> bool {
        self.ledger.is_row_added(row)
    }

    #[must_use]
    pub fn is_row_removed(&self, row: usize) -> bool {
        self.ledger.is_row_removed(row)
    }

    #[must_use]
    pub fn is_cell_edited(&self, pos: CellPos) -> bool {
        self.ledger.is_cell_edited(pos)
    }

    /// The row identifier addressing this grid's source entity.
    #[must_use]
    pub fn row_identifier(&self) -> Option<&RowIdentifier> {
        self.bindings.get(0).and_then(|b| b.row_identifier())
    }

    #[must_use]
    pub fn uses_virtual_identifier(&self) -> bool {
        self.row_identifier()
            .is_some_and(|id| id.identifier().is_virtual())
    }

    // ---------------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------------

    /// All visible columns must trace back to one updatable source entity.
    pub fn check_editable(&self) -> Result<(), GridError> {
        if self.single_source.is_none() {
            return Err(GridError::validation(
                ErrorOrigin::Model,
                "result set does not map to a single updatable source; editing is disabled",
            ));
        }

        Ok(())
    }

    fn check_cell_editable(&self, col: usize) -> Result<(), GridError> {
        self.check_editable()?;

        let binding = self.bindings.get(col).ok_or_else(|| {
            GridError::validation(ErrorOrigin::Model, format!("no column at index {col}"))
        })?;
        if binding.is_read_only() {
            return Err(GridError::validation(
                ErrorOrigin::Model,
                format!("column '{}' is read-only", binding.name()),
            ));
        }

        Ok(())
    }

    /// Editing and deleting require a non-empty identifier attribute set.
    pub fn check_entity_identifier(&self) -> Result<(), GridError> {
        let identifier = self.row_identifier().ok_or_else(|| {
            GridError::validation(ErrorOrigin::Model, "result set has no row identifier")
        })?;

        if identifier.key_attributes().is_empty() {
            return Err(GridError::validation(
                ErrorOrigin::Model,
                format!(
                    "no unique identifier defined for '{}'; a key must be declared before editing",
                    identifier.entity()
                ),
            ));
        }

        Ok(())
    }

    // ---------------------------------------------------------------------
    // Dataset lifecycle
    // ---------------------------------------------------------------------

    /// Rebuild the store wholesale from a fresh fetch; the ledger starts
    /// empty again.
    pub fn set_data(&mut self, rows: Vec<Row>) {
        self.release_all();
        self.store.replace(rows);
        self.ledger.clear();
    }

    /// Append a fetched segment without touching pending edits.
    pub fn append_rows(&mut self, rows: Vec<Row>) {
        self.store.append(rows);
    }

    // ---------------------------------------------------------------------
    // Cell edits
    // ---------------------------------------------------------------------

    /// Overwrite one cell, tracking the prior value as the revert target.
    ///
    /// Re-editing an already-tracked cell keeps the original pre-first-edit
    /// value and releases the intermediate one. Replacing one null-equivalent
    /// value with another is a no-op. Returns whether the cell changed.
    pub fn update_cell(&mut self, pos: CellPos, value: Value) -> Result<bool, GridError> {
        self.check_cell_editable(pos.col)?;

        let old = self.store.cell(pos).ok_or_else(|| {
            GridError::validation(ErrorOrigin::Store, format!("no cell at {pos}"))
        })?;
        if *old == value {
            return Ok(false);
        }

        let handler = self
            .bindings
            .get(pos.col)
            .map(|b| b.handler())
            .ok_or_else(|| GridError::invariant(ErrorOrigin::Model, "binding vanished"))?;
        if handler.is_null(old) && handler.is_null(&value) {
            return Ok(false);
        }

        let mut prior = self
            .store
            .swap_cell(pos, value)
            .ok_or_else(|| GridError::invariant(ErrorOrigin::Store, "cell vanished mid-edit"))?;

        // Rows not yet persisted (or already condemned) carry no per-cell
        // history; their statements read the full current row anyway.
        if self.ledger.is_row_added(pos.row) || self.ledger.is_row_removed(pos.row) {
            self.release_value(pos.col, &mut prior);
            return Ok(true);
        }

        let tracked = self.ledger.prior_value(pos).map(|v| *v == prior);
        match tracked {
            None => {
                self.ledger.insert_edit(pos, prior);
            }
            Some(false) => {
                // Re-edit: the intermediate value is discarded, the original
                // revert target stays.
                self.release_value(pos.col, &mut prior);
            }
            Some(true) => {}
        }

        Ok(true)
    }

    /// Restore one cell to its tracked prior value and drop the ledger
    /// entry. Returns false when the cell had no pending edit.
    pub fn revert_cell(&mut self, pos: CellPos) -> Result<bool, GridError> {
        let Some(prior) = self.ledger.take_edit(pos) else {
            return Ok(false);
        };

        let mut discarded = self
            .store
            .swap_cell(pos, prior)
            .ok_or_else(|| GridError::invariant(ErrorOrigin::Store, "cell vanished mid-revert"))?;
        self.release_value(pos.col, &mut discarded);

        Ok(true)
    }

    /// Null out an editable cell.
    pub fn set_cell_null(&mut self, pos: CellPos) -> Result<bool, GridError> {
        self.update_cell(pos, Value::Null)
    }

    /// Replace a cell with a value converted from clipboard text.
    pub fn paste_cell(&mut self, pos: CellPos, text: &str) -> Result<bool, GridError> {
        self.check_cell_editable(pos.col)?;

        let value = self
            .bindings
            .get(pos.col)
            .ok_or_else(|| GridError::invariant(ErrorOrigin::Model, "binding vanished"))?
            .handler()
            .value_from_clipboard(text)?;

        self.update_cell(pos, value)
    }

    // ---------------------------------------------------------------------
    // Row additions and removals
    // ---------------------------------------------------------------------

    /// Insert a new, not-yet-persisted row at `at` (clamped to the row
    /// count). With `copy_current`, values are copied from the row at that
    /// position with sequence columns forced to null. Returns the insert
    /// position.
    pub fn add_row(&mut self, at: usize, copy_current: bool) -> Result<usize, GridError> {
        self.check_editable()?;

        let at = at.min(self.store.row_count());
        let values = self.new_row_values(at, copy_current);

        self.ledger.splice_in(at);
        self.store.insert_current(at, Row::new(values));
        self.ledger.mark_added(at);

        Ok(at)
    }

    fn new_row_values(&self, at: usize, copy_current: bool) -> Vec<Value> {
        let arity = self.bindings.len();

        if copy_current && at < self.store.row_count() {
            let Some(source) = self.store.current_row(at) else {
                return vec![Value::Null; arity];
            };
            return self
                .bindings
                .iter()
                .enumerate()
                .map(|(col, binding)| {
                    if binding.is_sequence() {
                        // Store-assigned identity columns start out null.
                        return Value::Null;
                    }
                    let source_value = source.get(col).cloned().unwrap_or_default();
                    binding
                        .handler()
                        .value_from_object(&source_value)
                        .unwrap_or_else(|err| {
                            warn!(column = binding.name(), %err, "could not copy cell value");
                            Value::Null
                        })
                })
                .collect();
        }

        vec![Value::Null; arity]
    }

    /// Mark rows for deletion. Rows still pending insertion are discarded
    /// outright (pure memory operation, never a delete statement). Returns
    /// the number of rows discarded that way.
    pub fn delete_rows(&mut self, rows: &[usize]) -> Result<usize, GridError> {
        self.check_editable()?;

        let targets: BTreeSet<usize> = rows
            .iter()
            .copied()
            .filter(|&row| row < self.store.row_count())
            .collect();

        let mut discarded = 0;
        for &row in targets.iter().rev() {
            if self.ledger.unmark_added(row) {
                self.splice_out_row(row);
                discarded += 1;
            } else {
                self.ledger.mark_removed(row);
            }
        }

        Ok(discarded)
    }

    /// Revert every pending edit: restore edited cells, discard added rows,
    /// clear removal marks. Returns whether the row set changed.
    pub fn reject_changes(&mut self) -> bool {
        for (pos, prior) in self.ledger.drain_edits() {
            if let Some(mut discarded) = self.store.swap_cell(pos, prior) {
                self.release_value(pos.col, &mut discarded);
            }
        }

        let added: Vec<usize> = self.ledger.added().iter().rev().copied().collect();
        let rows_changed = !added.is_empty();
        for row in added {
            self.splice_out_row(row);
        }

        self.ledger.clear_removed();

        rows_changed
    }

    // ---------------------------------------------------------------------
    // Crate-internal surface for the Reconciler and Pager
    // ---------------------------------------------------------------------

    /// Remove one row from `current` and drop its ledger entries, shifting
    /// subsequent indices. The splice and the shift are one operation.
    pub(crate) fn splice_out_row(&mut self, row: usize) {
        let mut removed = self.store.remove_current(row);
        self.release_row(&mut removed);
        self.ledger.splice_out(row);
    }

    pub(crate) fn clear_edit(&mut self, pos: CellPos) -> bool {
        self.ledger.take_edit(pos).is_some()
    }

    pub(crate) fn unmark_added(&mut self, row: usize) -> bool {
        self.ledger.unmark_added(row)
    }

    pub(crate) fn unmark_removed(&mut self, row: usize) -> bool {
        self.ledger.unmark_removed(row)
    }

    /// Apply store-generated key values onto `current`, releasing the
    /// overwritten values.
    pub(crate) fn apply_generated_keys(
        &mut self,
        row: usize,
        keys: &std::collections::BTreeMap<usize, Value>,
    ) {
        for (&col, value) in keys {
            let pos = CellPos::new(row, col);
            if let Some(mut overwritten) = self.store.swap_cell(pos, value.clone()) {
                self.release_value(col, &mut overwritten);
            }
        }
    }

    pub(crate) fn reset_current_to_baseline(&mut self) {
        self.store.reset_current_to_original();
    }

    pub(crate) fn sort_current_by<F>(&mut self, cmp: F)
    where
        F: FnMut(&Row, &Row) -> std::cmp::Ordering,
    {
        self.store.sort_current_by(cmp);
    }

    // ---------------------------------------------------------------------
    // Resource release
    // ---------------------------------------------------------------------

    fn release_value(&self, col: usize, value: &mut Value) {
        if let Some(binding) = self.bindings.get(col) {
            binding.handler().release(value);
        }
    }

    fn release_row(&self, row: &mut Row) {
        for (col, value) in row.iter_mut().enumerate() {
            self.release_value(col, value);
        }
    }

    fn release_all(&mut self) {
        let mut rows = self.store.take_current();
        for row in &mut rows {
            self.release_row(row);
        }
        for (pos, mut prior) in self.ledger.drain_edits() {
            self.release_value(pos.col, &mut prior);
        }
    }
}
