use crate::{
    model::{CellPos, Row},
    value::Value,
};

///
/// RowStore
///
/// Parallel `original`/`current` row sequences. `current` is the only
/// sequence the grid renders and the only one user actions mutate;
/// `original` is the last-known-fetched baseline kept for local
/// reordering. On commit success the Reconciler touches only the
/// cells/rows whose statements executed; `original` is never resynced
/// wholesale outside a fresh fetch.
///

#[derive(Debug, Default)]
pub struct RowStore {
    original: Vec<Row>,
    current: Vec<Row>,
}

impl RowStore {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            original: Vec::new(),
            current: Vec::new(),
        }
    }

    /// Rebuild both sequences wholesale from a fresh fetch.
    pub fn replace(&mut self, rows: Vec<Row>) {
        self.original = rows.clone();
        self.current = rows;
    }

    /// Append a fetched segment to both sequences.
    pub fn append(&mut self, rows: Vec<Row>) {
        self.original.extend(rows.iter().cloned());
        self.current.extend(rows);
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.current.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    #[must_use]
    pub fn current(&self) -> &[Row] {
        &self.current
    }

    #[must_use]
    pub fn original(&self) -> &[Row] {
        &self.original
    }

    #[must_use]
    pub fn current_row(&self, row: usize) -> Option<&Row> {
        self.current.get(row)
    }

    #[must_use]
    pub fn cell(&self, pos: CellPos) -> Option<&Value> {
        self.current.get(pos.row).and_then(|row| row.get(pos.col))
    }

    /// Overwrite one current cell, returning the previous value.
    pub(crate) fn swap_cell(&mut self, pos: CellPos, value: Value) -> Option<Value> {
        let slot = self.current.get_mut(pos.row)?.get_mut(pos.col)?;
        Some(std::mem::replace(slot, value))
    }

    pub(crate) fn insert_current(&mut self, row: usize, values: Row) {
        self.current.insert(row, values);
    }

    pub(crate) fn remove_current(&mut self, row: usize) -> Row {
        self.current.remove(row)
    }

    /// Take ownership of the current rows, leaving the sequence empty.
    pub(crate) fn take_current(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.current)
    }

    /// Reset `current` to the fetched baseline (local reorder support).
    pub(crate) fn reset_current_to_original(&mut self) {
        self.current = self.original.clone();
    }

    pub(crate) fn sort_current_by<F>(&mut self, cmp: F)
    where
        F: FnMut(&Row, &Row) -> std::cmp::Ordering,
    {
        self.current.sort_by(cmp);
    }

    pub(crate) fn clear(&mut self) {
        self.original.clear();
        self.current.clear();
    }
}
