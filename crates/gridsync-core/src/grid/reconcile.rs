use crate::grid::{model::GridModel, synthesize::StatementBatch};

/// Apply the per-statement outcomes of a finished job back onto the model.
///
/// Runs after the job completes, success or not. Only descriptors marked
/// executed are reflected; every other ledger entry stays pending so the
/// user can retry or explicitly revert. Returns whether the row set changed.
pub(crate) fn reconcile(model: &mut GridModel, batch: &StatementBatch) -> bool {
    // Updates first: their edits are durable now, so the ledger entries go
    // and store-generated values land on `current`.
    for stmt in batch.updates.iter().filter(|s| s.executed) {
        for pos in model.ledger().edited_cells_of_row(stmt.row) {
            let covered = model
                .bindings()
                .get(pos.col)
                .and_then(|b| b.entity_attribute())
                .is_some_and(|attr| stmt.changes_column(attr));
            if covered {
                model.clear_edit(pos);
            }
        }
        model.apply_generated_keys(stmt.row, &stmt.generated_keys);
    }

    // Inserts: the row is persisted and stops being "added".
    for stmt in batch.inserts.iter().filter(|s| s.executed) {
        model.unmark_added(stmt.row);
        model.apply_generated_keys(stmt.row, &stmt.generated_keys);
    }

    // Deletes last and in descending row order, so the splices cannot skew
    // the row positions reflected above.
    let mut deleted: Vec<usize> = batch
        .deletes
        .iter()
        .filter(|s| s.executed)
        .map(|s| s.row)
        .collect();
    deleted.sort_unstable_by(|a, b| b.cmp(a));

    let rows_changed = !deleted.is_empty();
    for row in deleted {
        model.unmark_removed(row);
        model.splice_out_row(row);
    }

    rows_changed
}
