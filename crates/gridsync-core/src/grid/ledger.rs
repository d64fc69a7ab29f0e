use crate::{model::CellPos, value::Value};
use std::collections::{BTreeSet, HashMap};

///
/// EditLedger
///
/// Records, per grid coordinate, the prior value of an edited cell and the
/// identity of rows newly inserted or marked for removal. Positions track
/// the *current* row sequence; `GridModel` owns both structures and applies
/// index shifts atomically with every row splice, so ledger positions can
/// never skew against the rows they describe.
///
/// Invariant: a row is never simultaneously in `added` and `removed`.
/// Removal of an uncommitted insert discards the row outright instead of
/// queuing a delete.
///

#[derive(Debug, Default)]
pub struct EditLedger {
    edited: HashMap<CellPos, Value>,
    added: BTreeSet<usize>,
    removed: BTreeSet<usize>,
}

impl EditLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.edited.is_empty() || !self.added.is_empty() || !self.removed.is_empty()
    }

    #[must_use]
    pub fn is_cell_edited(&self, pos: CellPos) -> bool {
        self.edited.contains_key(&pos)
    }

    #[must_use]
    pub fn prior_value(&self, pos: CellPos) -> Option<&Value> {
        self.edited.get(&pos)
    }

    #[must_use]
    pub fn is_row_added(&self, row: usize) -> bool {
        self.added.contains(&row)
    }

    #[must_use]
    pub fn is_row_removed(&self, row: usize) -> bool {
        self.removed.contains(&row)
    }

    pub fn edited(&self) -> impl Iterator<Item = (CellPos, &Value)> {
        self.edited.iter().map(|(pos, value)| (*pos, value))
    }

    #[must_use]
    pub const fn added(&self) -> &BTreeSet<usize> {
        &self.added
    }

    #[must_use]
    pub const fn removed(&self) -> &BTreeSet<usize> {
        &self.removed
    }

    #[must_use]
    pub fn edited_cells_of_row(&self, row: usize) -> Vec<CellPos> {
        let mut cells: Vec<CellPos> = self
            .edited
            .keys()
            .filter(|pos| pos.row == row)
            .copied()
            .collect();
        cells.sort_unstable();
        cells
    }

    #[must_use]
    pub fn edited_rows(&self) -> BTreeSet<usize> {
        self.edited.keys().map(|pos| pos.row).collect()
    }

    // ---------------------------------------------------------------------
    // Mutation (crate-internal; GridModel is the call site)
    // ---------------------------------------------------------------------

    /// Track the revert target for a cell if the cell is not yet tracked.
    /// Returns false when an entry already existed.
    pub(crate) fn insert_edit(&mut self, pos: CellPos, prior: Value) -> bool {
        if self.edited.contains_key(&pos) {
            return false;
        }
        self.edited.insert(pos, prior);
        true
    }

    pub(crate) fn take_edit(&mut self, pos: CellPos) -> Option<Value> {
        self.edited.remove(&pos)
    }

    pub(crate) fn mark_added(&mut self, row: usize) {
        self.added.insert(row);
    }

    pub(crate) fn unmark_added(&mut self, row: usize) -> bool {
        self.added.remove(&row)
    }

    pub(crate) fn mark_removed(&mut self, row: usize) {
        self.removed.insert(row);
    }

    pub(crate) fn unmark_removed(&mut self, row: usize) -> bool {
        self.removed.remove(&row)
    }

    pub(crate) fn drain_edits(&mut self) -> Vec<(CellPos, Value)> {
        self.edited.drain().collect()
    }

    pub(crate) fn clear_removed(&mut self) {
        self.removed.clear();
    }

    pub(crate) fn clear(&mut self) {
        self.edited.clear();
        self.added.clear();
        self.removed.clear();
    }

    // ---------------------------------------------------------------------
    // Index-shift bookkeeping
    // ---------------------------------------------------------------------

    /// A row was inserted at `row`: every entry at position >= `row`
    /// shifts down by one.
    pub(crate) fn splice_in(&mut self, row: usize) {
        self.shift(row, 1);
    }

    /// A row was removed at `row`: entries exactly at `row` are dropped,
    /// every entry below shifts up by one.
    pub(crate) fn splice_out(&mut self, row: usize) {
        self.edited.retain(|pos, _| pos.row != row);
        self.added.remove(&row);
        self.removed.remove(&row);
        self.shift(row + 1, -1);
    }

    fn shift(&mut self, from_row: usize, delta: isize) {
        let shift = |row: usize| -> usize {
            if row >= from_row {
                row.checked_add_signed(delta).unwrap_or(row)
            } else {
                row
            }
        };

        let edited = std::mem::take(&mut self.edited);
        self.edited = edited
            .into_iter()
            .map(|(pos, value)| (CellPos::new(shift(pos.row), pos.col), value))
            .collect();
        self.added = self.added.iter().map(|&row| shift(row)).collect();
        self.removed = self.removed.iter().map(|&row| shift(row)).collect();
    }
}
