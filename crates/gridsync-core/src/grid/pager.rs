use crate::{
    grid::model::GridModel,
    model::{Row, SortSpec},
    traits::ContainerFeatures,
    value::canonical_cmp,
};
use std::cmp::Ordering;

///
/// PagerConfig
///

#[derive(Clone, Copy, Debug)]
pub struct PagerConfig {
    /// Rows fetched per segment.
    pub segment_size: usize,
    /// Distance (in rows) from the end of loaded data at which the next
    /// segment fetch is triggered.
    pub fetch_ahead: usize,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            segment_size: 200,
            fetch_ahead: 1,
        }
    }
}

///
/// ReorderStrategy
///
/// Sort/filter changes either require a full server-side refetch (which
/// discards pending edits and therefore needs caller confirmation) or can
/// be satisfied with a local stable sort of the fetched baseline.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReorderStrategy {
    Refetch { limit: usize },
    LocalSort,
}

///
/// Pager
///
/// Tracks whether the source may hold rows beyond what was fetched and
/// decides how sort changes and incremental fetches are served.
///

#[derive(Clone, Copy, Debug)]
pub struct Pager {
    config: PagerConfig,
    has_more: bool,
}

impl Pager {
    #[must_use]
    pub const fn new(config: PagerConfig) -> Self {
        Self {
            config,
            has_more: false,
        }
    }

    #[must_use]
    pub const fn has_more_data(&self) -> bool {
        self.has_more
    }

    pub const fn set_has_more(&mut self, has_more: bool) {
        self.has_more = has_more;
    }

    #[must_use]
    pub const fn segment_size(&self) -> usize {
        self.config.segment_size
    }

    /// A fetched segment shorter than requested means the source is drained.
    pub const fn note_segment(&mut self, fetched: usize, requested: usize) {
        self.has_more = requested > 0 && fetched >= requested;
    }

    /// Whether the cursor is close enough to the end of loaded rows to
    /// warrant fetching the next segment.
    #[must_use]
    pub const fn should_fetch_ahead(&self, cursor_row: usize, loaded_rows: usize) -> bool {
        self.has_more && cursor_row + self.config.fetch_ahead >= loaded_rows.saturating_sub(1)
    }

    /// Row count for a full refetch: enough whole segments that the row the
    /// user was looking at stays loaded.
    #[must_use]
    pub const fn refetch_limit(&self, visible_row: usize) -> usize {
        let segment = self.config.segment_size;
        if segment == 0 {
            return 0;
        }
        if visible_row >= segment {
            (visible_row / segment + 1) * segment
        } else {
            segment
        }
    }

    /// Decide how a sort change is served. Server-side ordering is only
    /// required when the source can do it and rows beyond the fetched
    /// window may exist; otherwise the in-memory baseline is authoritative
    /// and a local sort suffices.
    #[must_use]
    pub const fn reorder_strategy(
        &self,
        features: ContainerFeatures,
        visible_row: usize,
    ) -> ReorderStrategy {
        if features.server_side_order && self.has_more {
            ReorderStrategy::Refetch {
                limit: self.refetch_limit(visible_row),
            }
        } else {
            ReorderStrategy::LocalSort
        }
    }
}

/// Stable local sort of the fetched baseline.
///
/// Pending edits are rejected first: the sort is over what the store
/// returned, not over uncommitted mutations. Each order key is applied in
/// sequence until one produces a non-zero result; the comparator sorts the
/// null sentinel last and falls back from natural ordering to string
/// comparison.
pub(crate) fn local_sort(model: &mut GridModel, spec: &SortSpec) {
    model.reject_changes();
    model.reset_current_to_baseline();

    if spec.is_empty() {
        return;
    }

    let order: Vec<(usize, bool)> = spec
        .columns()
        .iter()
        .filter_map(|column| {
            model
                .bindings()
                .column_by_name(None, &column.attribute)
                .map(|col| (col, column.descending))
        })
        .collect();

    model.sort_current_by(|left: &Row, right: &Row| {
        for &(col, descending) in &order {
            let mut result = match (left.get(col), right.get(col)) {
                (Some(a), Some(b)) => canonical_cmp(a, b),
                _ => Ordering::Equal,
            };
            if descending {
                result = result.reverse();
            }
            if result != Ordering::Equal {
                return result;
            }
        }
        Ordering::Equal
    });
}
