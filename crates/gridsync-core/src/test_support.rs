//! Shared in-memory collaborators and fixtures for core tests.

use crate::{
    error::ContainerError,
    model::{
        Attribute, AttributeBinding, AttributeValue, Bindings, EntityIdentifier, Row,
        RowIdentifier, SortSpec, SourceEntity,
    },
    traits::{
        ContainerFeatures, ContextFactory, ContextPurpose, DataContainer, ExecutionContext,
        GeneratedKeyReceiver, SavepointId, TransactionManager,
    },
    value::{DefaultValueHandler, Value, ValueHandler},
};
use crossbeam_channel::Receiver;
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

/// Default test entity name.
pub const TEST_ENTITY: &str = "items";

///
/// SharedState
///
/// Scripted behavior plus a call journal shared between the test body and
/// the collaborators handed to background jobs.
///

#[derive(Default)]
pub struct SharedState {
    /// Journal of collaborator calls in execution order.
    pub calls: Vec<String>,
    /// 1-based ordinals of statement executions that must fail.
    pub fail_statements: HashSet<usize>,
    /// Statement executions seen so far.
    pub statements_run: usize,
    /// When set, the statement with this ordinal blocks until the gate
    /// receiver yields. Lets tests hold a job mid-phase deterministically.
    pub gate: Option<(usize, Receiver<()>)>,
    /// Generated keys emitted after each successful insert/update.
    pub generated_keys: Vec<(String, Value)>,
    /// Backing rows served by `read_segment`.
    pub segment_rows: Vec<Row>,
    /// Key/change values captured per executed statement kind.
    pub delete_keys: Vec<Vec<AttributeValue>>,
    pub insert_values: Vec<Vec<AttributeValue>>,
    pub update_statements: Vec<(Vec<AttributeValue>, Vec<AttributeValue>)>,
}

pub type Shared = Arc<Mutex<SharedState>>;

#[must_use]
pub fn shared_state() -> Shared {
    Arc::new(Mutex::new(SharedState::default()))
}

pub fn lock(shared: &Shared) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

///
/// MemoryContainer
///

pub struct MemoryContainer {
    shared: Shared,
    features: ContainerFeatures,
}

impl MemoryContainer {
    #[must_use]
    pub const fn new(shared: Shared, features: ContainerFeatures) -> Self {
        Self { shared, features }
    }

    fn statement(&self, label: &str) -> Result<usize, ContainerError> {
        let (ordinal, gate) = {
            let mut state = lock(&self.shared);
            state.statements_run += 1;
            let ordinal = state.statements_run;
            state.calls.push(format!("{label}#{ordinal}"));
            let gate = match &state.gate {
                Some((at, rx)) if *at == ordinal => Some(rx.clone()),
                _ => None,
            };
            (ordinal, gate)
        };

        // Block outside the lock so the coordinating thread stays free.
        if let Some(rx) = gate {
            let _ = rx.recv_timeout(Duration::from_secs(10));
        }

        if lock(&self.shared).fail_statements.contains(&ordinal) {
            return Err(ContainerError::Constraint(format!(
                "scripted failure at statement {ordinal}"
            )));
        }

        Ok(ordinal)
    }

    fn emit_generated(&self, keys: &mut dyn GeneratedKeyReceiver) {
        let generated = lock(&self.shared).generated_keys.clone();
        for (name, value) in generated {
            keys.push_key(&name, value);
        }
    }
}

impl DataContainer for MemoryContainer {
    fn features(&self) -> ContainerFeatures {
        self.features
    }

    fn read_segment(
        &self,
        _ctx: &mut dyn ExecutionContext,
        _order: &SortSpec,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>, ContainerError> {
        let state = lock(&self.shared);
        let end = (offset + limit).min(state.segment_rows.len());
        let rows = state
            .segment_rows
            .get(offset..end)
            .map(<[Row]>::to_vec)
            .unwrap_or_default();

        Ok(rows)
    }

    fn insert_row(
        &self,
        _ctx: &mut dyn ExecutionContext,
        values: &[AttributeValue],
        keys: &mut dyn GeneratedKeyReceiver,
    ) -> Result<u64, ContainerError> {
        self.statement("insert")?;
        lock(&self.shared).insert_values.push(values.to_vec());
        self.emit_generated(keys);

        Ok(1)
    }

    fn update_row(
        &self,
        _ctx: &mut dyn ExecutionContext,
        keys: &[AttributeValue],
        changes: &[AttributeValue],
        generated: &mut dyn GeneratedKeyReceiver,
    ) -> Result<u64, ContainerError> {
        self.statement("update")?;
        lock(&self.shared)
            .update_statements
            .push((keys.to_vec(), changes.to_vec()));
        self.emit_generated(generated);

        Ok(1)
    }

    fn delete_row(
        &self,
        _ctx: &mut dyn ExecutionContext,
        keys: &[AttributeValue],
    ) -> Result<u64, ContainerError> {
        self.statement("delete")?;
        lock(&self.shared).delete_keys.push(keys.to_vec());

        Ok(1)
    }
}

///
/// MemoryTransactions
///

pub struct MemoryTransactions {
    shared: Shared,
    auto_commit: bool,
    savepoints: bool,
    counter: u64,
}

impl TransactionManager for MemoryTransactions {
    fn is_auto_commit(&self) -> Result<bool, ContainerError> {
        Ok(self.auto_commit)
    }

    fn supports_savepoints(&self) -> bool {
        self.savepoints
    }

    fn set_savepoint(&mut self) -> Result<SavepointId, ContainerError> {
        self.counter += 1;
        lock(&self.shared).calls.push("savepoint.set".into());

        Ok(SavepointId(self.counter))
    }

    fn rollback_to(&mut self, _savepoint: SavepointId) -> Result<(), ContainerError> {
        lock(&self.shared).calls.push("savepoint.rollback".into());

        Ok(())
    }

    fn release_savepoint(&mut self, _savepoint: SavepointId) -> Result<(), ContainerError> {
        lock(&self.shared).calls.push("savepoint.release".into());

        Ok(())
    }
}

///
/// MemoryContext
///

pub struct MemoryContext {
    shared: Shared,
    transactions: MemoryTransactions,
}

impl ExecutionContext for MemoryContext {
    fn transactions(&mut self) -> &mut dyn TransactionManager {
        &mut self.transactions
    }

    fn close(&mut self) -> Result<(), ContainerError> {
        lock(&self.shared).calls.push("context.close".into());

        Ok(())
    }
}

///
/// MemoryFactory
///

pub struct MemoryFactory {
    shared: Shared,
    auto_commit: bool,
    savepoints: bool,
}

impl MemoryFactory {
    #[must_use]
    pub const fn new(shared: Shared, auto_commit: bool, savepoints: bool) -> Self {
        Self {
            shared,
            auto_commit,
            savepoints,
        }
    }
}

impl ContextFactory for MemoryFactory {
    fn open_context(
        &self,
        _purpose: ContextPurpose,
    ) -> Result<Box<dyn ExecutionContext>, ContainerError> {
        lock(&self.shared).calls.push("context.open".into());

        Ok(Box::new(MemoryContext {
            shared: Arc::clone(&self.shared),
            transactions: MemoryTransactions {
                shared: Arc::clone(&self.shared),
                auto_commit: self.auto_commit,
                savepoints: self.savepoints,
                counter: 0,
            },
        }))
    }
}

// ---------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------

/// Column set `id` (sequence key), `name`, `qty` over one entity with a
/// declared single-attribute key.
#[must_use]
pub fn item_bindings() -> Bindings {
    let entity = SourceEntity::new(TEST_ENTITY);
    let identifier = EntityIdentifier::Declared {
        attributes: vec![Attribute::sequence("id")],
    };
    let row_id = RowIdentifier::new(entity, identifier);
    let handler: Arc<dyn ValueHandler> = Arc::new(DefaultValueHandler);

    Bindings::new(vec![
        AttributeBinding::new(
            "id",
            Some(Attribute::sequence("id")),
            Arc::clone(&handler),
            Some(row_id.clone()),
        ),
        AttributeBinding::new(
            "name",
            Some(Attribute::new("name")),
            Arc::clone(&handler),
            Some(row_id.clone()),
        ),
        AttributeBinding::new("qty", Some(Attribute::new("qty")), handler, Some(row_id)),
    ])
}

/// Same columns, but with an empty virtual identifier (no key defined yet).
#[must_use]
pub fn keyless_bindings() -> Bindings {
    let entity = SourceEntity::new(TEST_ENTITY);
    let identifier = EntityIdentifier::Virtual {
        attributes: Vec::new(),
    };
    let row_id = RowIdentifier::new(entity, identifier);
    let handler: Arc<dyn ValueHandler> = Arc::new(DefaultValueHandler);

    Bindings::new(vec![
        AttributeBinding::new(
            "id",
            Some(Attribute::new("id")),
            Arc::clone(&handler),
            Some(row_id.clone()),
        ),
        AttributeBinding::new("name", Some(Attribute::new("name")), handler, Some(row_id)),
    ])
}

/// Two columns from two different entities; editing must stay disabled.
#[must_use]
pub fn multi_source_bindings() -> Bindings {
    let handler: Arc<dyn ValueHandler> = Arc::new(DefaultValueHandler);
    let left = RowIdentifier::new(
        SourceEntity::new("left"),
        EntityIdentifier::Declared {
            attributes: vec![Attribute::new("id")],
        },
    );
    let right = RowIdentifier::new(
        SourceEntity::new("right"),
        EntityIdentifier::Declared {
            attributes: vec![Attribute::new("id")],
        },
    );

    Bindings::new(vec![
        AttributeBinding::new(
            "id",
            Some(Attribute::new("id")),
            Arc::clone(&handler),
            Some(left),
        ),
        AttributeBinding::new("other", Some(Attribute::new("other")), handler, Some(right)),
    ])
}

#[must_use]
pub fn item_row(id: i64, name: &str, qty: i64) -> Row {
    Row::new(vec![Value::Int(id), Value::from(name), Value::Int(qty)])
}
