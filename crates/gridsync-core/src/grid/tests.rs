use crate::{
    grid::{GridEvent, GridSession, PagerConfig, SortOutcome},
    model::{CellPos, ColumnSort, Row},
    test_support::{
        MemoryContainer, MemoryFactory, Shared, item_bindings, item_row, keyless_bindings, lock,
        multi_source_bindings, shared_state,
    },
    traits::ContainerFeatures,
    value::Value,
};
use std::{sync::Arc, thread, time::Duration};

const TIMEOUT: Duration = Duration::from_secs(5);

fn session_with(
    auto_commit: bool,
    savepoints: bool,
    features: ContainerFeatures,
    config: PagerConfig,
) -> (GridSession, Shared) {
    let shared = shared_state();
    let container = Arc::new(MemoryContainer::new(Arc::clone(&shared), features));
    let contexts = Arc::new(MemoryFactory::new(Arc::clone(&shared), auto_commit, savepoints));
    let session = GridSession::new(item_bindings(), container, contexts, config);

    (session, shared)
}

fn session() -> (GridSession, Shared) {
    session_with(
        true,
        false,
        ContainerFeatures::default(),
        PagerConfig::default(),
    )
}

fn seed(session: &mut GridSession, rows: Vec<Row>) {
    session
        .set_data(rows, false)
        .expect("seeding an idle session should succeed");
}

fn wait_sync(session: &mut GridSession) -> GridEvent {
    let events = session.wait_for_notices(TIMEOUT);
    events
        .into_iter()
        .find(|e| matches!(e, GridEvent::SyncFinished { .. }))
        .expect("sync job should report completion")
}

fn wait_fetch(session: &mut GridSession) -> GridEvent {
    let events = session.wait_for_notices(TIMEOUT);
    events
        .into_iter()
        .find(|e| matches!(e, GridEvent::SegmentFetched { .. } | GridEvent::FetchFailed { .. }))
        .expect("fetch job should report completion")
}

fn wait_for_call(shared: &Shared, call: &str) {
    for _ in 0..1000 {
        if lock(shared).calls.iter().any(|c| c == call) {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("collaborator never reached {call}");
}

fn call_position(shared: &Shared, call: &str) -> usize {
    lock(shared)
        .calls
        .iter()
        .position(|c| c == call)
        .unwrap_or_else(|| panic!("call {call} not journaled"))
}

// ---------------------------------------------------------------------
// Commit shape
// ---------------------------------------------------------------------

#[test]
fn commit_yields_one_update_and_one_insert_then_empties_ledger() {
    let (mut session, shared) = session();
    seed(
        &mut session,
        vec![item_row(1, "A", 10), item_row(2, "b", 20), item_row(3, "c", 30)],
    );

    session
        .update_cell(CellPos::new(0, 1), Value::from("B"))
        .expect("edit should be accepted");
    let added = session.add_row(3, false).expect("add should be accepted");
    session
        .update_cell(CellPos::new(added, 0), Value::Int(7))
        .expect("edit of added row should be accepted");
    session
        .update_cell(CellPos::new(added, 1), Value::from("x"))
        .expect("edit of added row should be accepted");

    assert!(session.apply_changes().expect("commit should start"));
    let event = wait_sync(&mut session);

    let GridEvent::SyncFinished {
        inserted,
        updated,
        deleted,
        error,
        ..
    } = event
    else {
        panic!("expected sync event");
    };
    assert_eq!((inserted, updated, deleted), (1, 1, 0));
    assert!(error.is_none());

    let state = lock(&shared);
    assert!(state.delete_keys.is_empty());
    assert_eq!(state.insert_values.len(), 1);
    // The insert carries the full current row.
    assert_eq!(state.insert_values[0].len(), 3);
    assert_eq!(state.insert_values[0][1].value, Value::from("x"));

    assert_eq!(state.update_statements.len(), 1);
    let (keys, changes) = &state.update_statements[0];
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].attribute.name(), "id");
    assert_eq!(keys[0].value, Value::Int(1));
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].attribute.name(), "name");
    assert_eq!(changes[0].value, Value::from("B"));
    drop(state);

    assert!(!session.has_changes());
    assert_eq!(session.model().cell(CellPos::new(0, 1)), Some(&Value::from("B")));
}

#[test]
fn statements_dispatch_deletes_then_inserts_then_updates() {
    let (mut session, shared) = session();
    seed(
        &mut session,
        vec![item_row(1, "a", 10), item_row(2, "b", 20), item_row(3, "c", 30)],
    );

    session
        .update_cell(CellPos::new(0, 2), Value::Int(11))
        .expect("edit should be accepted");
    session.delete_rows(&[2]).expect("delete should be accepted");
    let added = session.add_row(3, false).expect("add should be accepted");
    session
        .update_cell(CellPos::new(added, 1), Value::from("new"))
        .expect("edit of added row should be accepted");

    session.apply_changes().expect("commit should start");
    wait_sync(&mut session);

    let delete = call_position(&shared, "delete#1");
    let insert = call_position(&shared, "insert#2");
    let update = call_position(&shared, "update#3");
    assert!(delete < insert && insert < update);

    let open = call_position(&shared, "context.open");
    let close = call_position(&shared, "context.close");
    assert!(open < delete && update < close);
}

#[test]
fn empty_ledger_commits_nothing() {
    let (mut session, shared) = session();
    seed(&mut session, vec![item_row(1, "a", 10)]);

    assert!(!session.apply_changes().expect("no-op commit should succeed"));
    assert!(lock(&shared).calls.is_empty());
}

#[test]
fn removing_added_row_is_pure_memory() {
    let (mut session, shared) = session();
    seed(&mut session, vec![item_row(1, "a", 10), item_row(2, "b", 20)]);

    let added = session.add_row(1, false).expect("add should be accepted");
    assert_eq!(session.model().row_count(), 3);

    let discarded = session.delete_rows(&[added]).expect("delete should be accepted");
    assert_eq!(discarded, 1);
    assert_eq!(session.model().row_count(), 2);
    assert!(!session.has_changes());

    assert!(!session.apply_changes().expect("nothing should be committed"));
    assert!(lock(&shared).delete_keys.is_empty());
}

// ---------------------------------------------------------------------
// Partial failure
// ---------------------------------------------------------------------

#[test]
fn failed_statement_with_savepoint_rolls_back_whole_batch() {
    let (mut session, shared) = session_with(
        false,
        true,
        ContainerFeatures::default(),
        PagerConfig::default(),
    );
    seed(
        &mut session,
        vec![item_row(1, "a", 10), item_row(2, "b", 20), item_row(3, "c", 30)],
    );
    lock(&shared).fail_statements.insert(2);

    for row in 0..3 {
        session
            .update_cell(CellPos::new(row, 1), Value::from("edited"))
            .expect("edit should be accepted");
    }

    session.apply_changes().expect("commit should start");
    let event = wait_sync(&mut session);

    let GridEvent::SyncFinished {
        rolled_back, error, ..
    } = event
    else {
        panic!("expected sync event");
    };
    assert!(rolled_back);
    assert!(error.is_some());

    // Rollback undid every statement; all three edits stay pending.
    for row in 0..3 {
        assert!(session.model().is_cell_edited(CellPos::new(row, 1)));
    }

    let state = lock(&shared);
    assert!(state.calls.iter().any(|c| c == "savepoint.set"));
    assert!(state.calls.iter().any(|c| c == "savepoint.rollback"));
    assert_eq!(state.calls.last().map(String::as_str), Some("context.close"));
}

#[test]
fn failed_statement_without_savepoint_keeps_applied_edits() {
    let (mut session, shared) = session_with(
        false,
        false,
        ContainerFeatures::default(),
        PagerConfig::default(),
    );
    seed(
        &mut session,
        vec![item_row(1, "a", 10), item_row(2, "b", 20), item_row(3, "c", 30)],
    );
    lock(&shared).fail_statements.insert(2);

    for row in 0..3 {
        session
            .update_cell(CellPos::new(row, 1), Value::from("edited"))
            .expect("edit should be accepted");
    }

    session.apply_changes().expect("commit should start");
    let event = wait_sync(&mut session);

    let GridEvent::SyncFinished {
        rolled_back,
        updated,
        error,
        ..
    } = event
    else {
        panic!("expected sync event");
    };
    assert!(!rolled_back);
    assert_eq!(updated, 1);
    assert!(error.is_some());

    // The first update is durable and leaves the ledger; the failed and
    // never-attempted ones stay pending for retry or revert.
    assert!(!session.model().is_cell_edited(CellPos::new(0, 1)));
    assert!(session.model().is_cell_edited(CellPos::new(1, 1)));
    assert!(session.model().is_cell_edited(CellPos::new(2, 1)));

    assert!(!lock(&shared).calls.iter().any(|c| c == "savepoint.set"));
}

// ---------------------------------------------------------------------
// Index shifting
// ---------------------------------------------------------------------

#[test]
fn mid_sequence_insert_then_delete_removes_the_right_row() {
    let (mut session, shared) = session();
    seed(
        &mut session,
        vec![
            item_row(1, "a", 0),
            item_row(2, "b", 0),
            item_row(3, "c", 0),
            item_row(4, "d", 0),
            item_row(5, "e", 0),
            item_row(6, "f", 0),
        ],
    );

    let added = session.add_row(2, false).expect("add should be accepted");
    session
        .update_cell(CellPos::new(added, 1), Value::from("new"))
        .expect("edit of added row should be accepted");

    // The row originally at position 5 (id 6) now sits at position 6.
    session.delete_rows(&[6]).expect("delete should be accepted");

    session.apply_changes().expect("commit should start");
    let event = wait_sync(&mut session);
    let GridEvent::SyncFinished { rows_changed, error, .. } = event else {
        panic!("expected sync event");
    };
    assert!(error.is_none());
    assert!(rows_changed);

    // The delete addressed id 6, and exactly that row is gone.
    let state = lock(&shared);
    assert_eq!(state.delete_keys.len(), 1);
    assert_eq!(state.delete_keys[0][0].value, Value::Int(6));
    drop(state);

    assert_eq!(session.model().row_count(), 6);
    let ids: Vec<&Value> = (0..6)
        .map(|row| session.model().cell(CellPos::new(row, 0)).unwrap())
        .collect();
    assert!(!ids.contains(&&Value::Int(6)));
    assert!(!session.has_changes());
}

// ---------------------------------------------------------------------
// Cancellation and busy rejection
// ---------------------------------------------------------------------

#[test]
fn cancelled_job_still_reconciles_executed_statements() {
    let (mut session, shared) = session();
    seed(&mut session, vec![item_row(1, "a", 0), item_row(2, "b", 0)]);
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
    lock(&shared).gate = Some((1, gate_rx));

    session.delete_rows(&[0, 1]).expect("delete should be accepted");
    session.apply_changes().expect("commit should start");

    // The first delete is in flight and holding the gate; cancel before
    // letting it finish so the second statement is never attempted.
    wait_for_call(&shared, "delete#1");
    assert!(session.cancel_sync());
    gate_tx.send(()).expect("gate receiver should be alive");

    let event = wait_sync(&mut session);
    let GridEvent::SyncFinished {
        deleted,
        cancelled,
        error,
        ..
    } = event
    else {
        panic!("expected sync event");
    };
    assert!(cancelled);
    assert!(error.is_none());
    assert_eq!(deleted, 1);

    // The executed delete was spliced out; the other row stays condemned.
    assert_eq!(session.model().row_count(), 1);
    assert!(session.model().is_row_removed(0));
}

#[test]
fn second_commit_while_running_is_rejected_as_busy() {
    let (mut session, shared) = session();
    seed(&mut session, vec![item_row(1, "a", 0)]);
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
    lock(&shared).gate = Some((1, gate_rx));

    session
        .update_cell(CellPos::new(0, 1), Value::from("z"))
        .expect("edit should be accepted");
    session.apply_changes().expect("commit should start");
    wait_for_call(&shared, "update#1");

    assert!(session.is_busy());
    let err = session.apply_changes().expect_err("second commit must be rejected");
    assert!(err.is_busy());
    // The rejection left the pending edit alone.
    assert!(session.model().is_cell_edited(CellPos::new(0, 1)));

    gate_tx.send(()).expect("gate receiver should be alive");
    wait_sync(&mut session);
    assert!(!session.is_busy());
}

// ---------------------------------------------------------------------
// Generated keys
// ---------------------------------------------------------------------

#[test]
fn generated_key_lands_by_attribute_name() {
    let (mut session, _shared) = {
        let (session, shared) = session();
        lock(&shared).generated_keys = vec![("id".into(), Value::Int(42))];
        (session, shared)
    };
    seed(&mut session, vec![item_row(1, "a", 0)]);

    let added = session.add_row(1, false).expect("add should be accepted");
    session
        .update_cell(CellPos::new(added, 1), Value::from("new"))
        .expect("edit of added row should be accepted");

    session.apply_changes().expect("commit should start");
    wait_sync(&mut session);

    assert_eq!(session.model().cell(CellPos::new(1, 0)), Some(&Value::Int(42)));
    assert!(!session.model().is_row_added(1));
}

#[test]
fn unmatched_generated_key_falls_back_to_sequence_column() {
    let (mut session, shared) = session();
    lock(&shared).generated_keys = vec![("ROWID".into(), Value::Int(77))];
    seed(&mut session, vec![item_row(1, "a", 0)]);

    let added = session.add_row(0, false).expect("add should be accepted");
    session
        .update_cell(CellPos::new(added, 1), Value::from("new"))
        .expect("edit of added row should be accepted");

    session.apply_changes().expect("commit should start");
    wait_sync(&mut session);

    // "ROWID" matches no binding; the first sequence column takes it.
    assert_eq!(session.model().cell(CellPos::new(0, 0)), Some(&Value::Int(77)));
}

// ---------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------

#[test]
fn multi_source_dataset_rejects_edits_and_commits() {
    let shared = shared_state();
    let container = Arc::new(MemoryContainer::new(
        Arc::clone(&shared),
        ContainerFeatures::default(),
    ));
    let contexts = Arc::new(MemoryFactory::new(Arc::clone(&shared), true, false));
    let mut session = GridSession::new(
        multi_source_bindings(),
        container,
        contexts,
        PagerConfig::default(),
    );
    seed(
        &mut session,
        vec![Row::new(vec![Value::Int(1), Value::Int(2)])],
    );

    let err = session
        .update_cell(CellPos::new(0, 0), Value::Int(9))
        .expect_err("edit must be rejected at the call site");
    assert!(err.is_validation());

    let err = session.apply_changes().expect_err("commit must be rejected");
    assert!(err.is_validation());
}

#[test]
fn missing_key_identifier_blocks_commit() {
    let shared = shared_state();
    let container = Arc::new(MemoryContainer::new(
        Arc::clone(&shared),
        ContainerFeatures::default(),
    ));
    let contexts = Arc::new(MemoryFactory::new(Arc::clone(&shared), true, false));
    let mut session = GridSession::new(
        keyless_bindings(),
        container,
        contexts,
        PagerConfig::default(),
    );
    seed(
        &mut session,
        vec![Row::new(vec![Value::Int(1), Value::from("a")])],
    );

    session
        .update_cell(CellPos::new(0, 1), Value::from("b"))
        .expect("editing itself is allowed until commit");

    let err = session.apply_changes().expect_err("commit must be rejected");
    assert!(err.is_validation());
    // No statement was built, nothing reached the container.
    assert!(lock(&shared).calls.is_empty());
}

// ---------------------------------------------------------------------
// Revert
// ---------------------------------------------------------------------

#[test]
fn reject_changes_restores_the_fetched_baseline() {
    let (mut session, _shared) = session();
    seed(&mut session, vec![item_row(1, "a", 10), item_row(2, "b", 20)]);

    session
        .update_cell(CellPos::new(0, 1), Value::from("zzz"))
        .expect("edit should be accepted");
    session.add_row(1, true).expect("add should be accepted");
    session.delete_rows(&[2]).expect("delete should be accepted");

    let rows_changed = session.reject_changes().expect("revert should succeed");
    assert!(rows_changed);

    assert_eq!(session.model().row_count(), 2);
    assert_eq!(session.model().cell(CellPos::new(0, 1)), Some(&Value::from("a")));
    assert!(!session.has_changes());
}

// ---------------------------------------------------------------------
// Sorting and paging
// ---------------------------------------------------------------------

#[test]
fn sort_toggle_cycles_and_sorts_locally_with_nulls_last() {
    let (mut session, _shared) = session();
    seed(
        &mut session,
        vec![
            Row::new(vec![Value::Int(1), Value::from("beta"), Value::Int(0)]),
            Row::new(vec![Value::Int(2), Value::Null, Value::Int(0)]),
            Row::new(vec![Value::Int(3), Value::from("alpha"), Value::Int(0)]),
        ],
    );

    let outcome = session
        .toggle_sort("name", false, 0)
        .expect("sort should be served");
    assert_eq!(outcome, SortOutcome::Sorted(ColumnSort::Ascending));
    let names: Vec<&Value> = (0..3)
        .map(|row| session.model().cell(CellPos::new(row, 1)).unwrap())
        .collect();
    assert_eq!(
        names,
        vec![&Value::from("alpha"), &Value::from("beta"), &Value::Null]
    );

    let outcome = session
        .toggle_sort("name", false, 0)
        .expect("sort should be served");
    assert_eq!(outcome, SortOutcome::Sorted(ColumnSort::Descending));
    assert_eq!(
        session.model().cell(CellPos::new(0, 1)),
        Some(&Value::Null)
    );

    let outcome = session
        .toggle_sort("name", false, 0)
        .expect("sort should be served");
    assert_eq!(outcome, SortOutcome::Sorted(ColumnSort::Unsorted));
    assert_eq!(session.model().cell(CellPos::new(0, 1)), Some(&Value::from("beta")));
}

#[test]
fn server_side_order_with_more_data_requires_refetch() {
    let features = ContainerFeatures {
        server_side_order: true,
        server_side_filter: true,
    };
    let (mut session, shared) = session_with(true, false, features, PagerConfig {
        segment_size: 2,
        fetch_ahead: 1,
    });
    lock(&shared).segment_rows = vec![
        item_row(1, "a", 0),
        item_row(2, "b", 0),
        item_row(3, "c", 0),
    ];
    session
        .set_data(vec![item_row(1, "a", 0), item_row(2, "b", 0)], true)
        .expect("seeding should succeed");

    let outcome = session
        .toggle_sort("name", false, 0)
        .expect("toggle should be served");
    let SortOutcome::RefetchRequired { sort, limit } = outcome else {
        panic!("expected refetch requirement");
    };
    assert_eq!(sort, ColumnSort::Ascending);
    assert_eq!(limit, 2);

    // Caller confirmed: refetch replaces the dataset in the new order.
    session.refetch(limit).expect("refetch should start");
    let event = wait_fetch(&mut session);
    let GridEvent::SegmentFetched { rows, replaced, .. } = event else {
        panic!("expected fetch event");
    };
    assert!(replaced);
    assert_eq!(rows, 2);
}

#[test]
fn segment_fetches_append_until_the_source_drains() {
    let (mut session, shared) = session_with(
        true,
        false,
        ContainerFeatures::default(),
        PagerConfig {
            segment_size: 2,
            fetch_ahead: 1,
        },
    );
    lock(&shared).segment_rows = vec![
        item_row(1, "a", 0),
        item_row(2, "b", 0),
        item_row(3, "c", 0),
        item_row(4, "d", 0),
        item_row(5, "e", 0),
    ];
    session
        .set_data(vec![item_row(1, "a", 0), item_row(2, "b", 0)], true)
        .expect("seeding should succeed");

    assert!(session.pager().should_fetch_ahead(1, 2));
    assert!(session.read_next_segment().expect("fetch should start"));
    let GridEvent::SegmentFetched { rows, has_more, .. } = wait_fetch(&mut session) else {
        panic!("expected fetch event");
    };
    assert_eq!(rows, 2);
    assert!(has_more);
    assert_eq!(session.model().row_count(), 4);

    assert!(session.read_next_segment().expect("fetch should start"));
    let GridEvent::SegmentFetched { rows, has_more, .. } = wait_fetch(&mut session) else {
        panic!("expected fetch event");
    };
    assert_eq!(rows, 1);
    assert!(!has_more);
    assert_eq!(session.model().row_count(), 5);

    // Drained: no further fetch starts.
    assert!(!session.read_next_segment().expect("call should succeed"));
}

// ---------------------------------------------------------------------
// Key-edit precedent
// ---------------------------------------------------------------------

#[test]
fn delete_after_key_edit_addresses_the_current_key_value() {
    let (mut session, shared) = session();
    seed(&mut session, vec![item_row(1, "a", 0), item_row(2, "b", 0)]);

    session
        .update_cell(CellPos::new(0, 0), Value::Int(99))
        .expect("key edit should be accepted");
    session.delete_rows(&[0]).expect("delete should be accepted");

    session.apply_changes().expect("commit should start");
    wait_sync(&mut session);

    // The delete is keyed by the edited in-memory value, and the pending
    // edit produces no separate update for the condemned row.
    let state = lock(&shared);
    assert_eq!(state.delete_keys.len(), 1);
    assert_eq!(state.delete_keys[0][0].value, Value::Int(99));
    assert!(state.update_statements.is_empty());
}
