use crate::{
    error::{ErrorOrigin, GridError},
    grid::model::GridModel,
    model::{Attribute, AttributeValue, CellPos, SourceEntity},
    value::Value,
};
use std::{collections::BTreeMap, fmt};

///
/// StatementKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatementKind {
    Delete,
    Insert,
    Update,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Delete => "delete",
            Self::Insert => "insert",
            Self::Update => "update",
        };
        write!(f, "{label}")
    }
}

///
/// StatementDescriptor
///
/// One row-level mutation resolved against the row's key attributes.
/// Descriptors are built fresh per commit attempt and consumed by the
/// Reconciler afterwards; they are never persisted across commits.
///

#[derive(Clone, Debug, PartialEq)]
pub struct StatementDescriptor {
    pub kind: StatementKind,
    pub entity: SourceEntity,
    pub row: usize,
    pub key_values: Vec<AttributeValue>,
    pub change_values: Vec<AttributeValue>,
    pub executed: bool,
    pub generated_keys: BTreeMap<usize, Value>,
}

impl StatementDescriptor {
    #[must_use]
    pub const fn new(kind: StatementKind, entity: SourceEntity, row: usize) -> Self {
        Self {
            kind,
            entity,
            row,
            key_values: Vec::new(),
            change_values: Vec::new(),
            executed: false,
            generated_keys: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn changes_column(&self, attribute: &Attribute) -> bool {
        self.change_values
            .iter()
            .any(|av| av.attribute.name() == attribute.name())
    }
}

///
/// StatementBatch
///
/// The synthesized statements of one commit attempt, held in execution
/// order: deletes, then inserts, then updates.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatementBatch {
    pub deletes: Vec<StatementDescriptor>,
    pub inserts: Vec<StatementDescriptor>,
    pub updates: Vec<StatementDescriptor>,
}

impl StatementBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty() && self.updates.is_empty()
    }

    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.deletes.len() + self.inserts.len() + self.updates.len()
    }

    /// Clear all executed marks; used after a savepoint rollback has undone
    /// the statements at the store.
    pub(crate) fn clear_executed(&mut self) {
        for stmt in self
            .deletes
            .iter_mut()
            .chain(self.inserts.iter_mut())
            .chain(self.updates.iter_mut())
        {
            stmt.executed = false;
        }
    }
}

/// Convert the ledger's contents into an ordered statement batch, resolved
/// against each row's key attributes. Runs once per commit attempt.
pub(crate) fn synthesize(model: &GridModel) -> Result<StatementBatch, GridError> {
    let identifier = model.row_identifier().ok_or_else(|| {
        GridError::invariant(ErrorOrigin::Synthesizer, "synthesis without a row identifier")
    })?;
    let entity = identifier.entity().clone();
    let key_attrs: Vec<Attribute> = identifier.key_attributes().to_vec();

    let mut batch = StatementBatch::default();

    // Deletes, keyed by the row's current key-attribute values. A key column
    // edited before the removal therefore addresses the row by a value the
    // store never held; upstream precedent, kept as-is.
    for &row in model.ledger().removed() {
        let mut stmt = StatementDescriptor::new(StatementKind::Delete, entity.clone(), row);
        for attr in &key_attrs {
            let col = key_column(model, &entity, attr)?;
            stmt.key_values
                .push(AttributeValue::new(attr.clone(), cell_value(model, row, col)?));
        }
        batch.deletes.push(stmt);
    }

    // Inserts carry the full current row; no key/payload split.
    for &row in model.ledger().added() {
        let mut stmt = StatementDescriptor::new(StatementKind::Insert, entity.clone(), row);
        for (col, binding) in model.bindings().iter().enumerate() {
            let Some(attr) = binding.entity_attribute() else {
                continue;
            };
            stmt.change_values
                .push(AttributeValue::new(attr.clone(), cell_value(model, row, col)?));
        }
        batch.inserts.push(stmt);
    }

    // Updates: one statement per edited row. A single-source grid cannot
    // straddle entities, so the (row, entity) grouping degenerates to rows.
    // Rows condemned to deletion keep their ledger entries but get no
    // update; the delete supersedes them.
    for row in model.ledger().edited_rows() {
        if model.ledger().is_row_removed(row) {
            continue;
        }
        let mut stmt = StatementDescriptor::new(StatementKind::Update, entity.clone(), row);

        for pos in model.ledger().edited_cells_of_row(row) {
            let attr = model
                .bindings()
                .get(pos.col)
                .and_then(|b| b.entity_attribute())
                .ok_or_else(|| {
                    GridError::invariant(
                        ErrorOrigin::Synthesizer,
                        format!("edited cell {pos} has no source attribute"),
                    )
                })?;
            stmt.change_values.push(AttributeValue::new(
                attr.clone(),
                cell_value(model, pos.row, pos.col)?,
            ));
        }

        for attr in &key_attrs {
            let col = key_column(model, &entity, attr)?;
            let pos = CellPos::new(row, col);
            // If the key column itself was edited, locate the row by its
            // pre-edit value so it can still be found at the store.
            let value = match model.ledger().prior_value(pos) {
                Some(prior) => prior.clone(),
                None => cell_value(model, row, col)?,
            };
            stmt.key_values.push(AttributeValue::new(attr.clone(), value));
        }

        batch.updates.push(stmt);
    }

    Ok(batch)
}

fn key_column(
    model: &GridModel,
    entity: &SourceEntity,
    attr: &Attribute,
) -> Result<usize, GridError> {
    model.bindings().column_of(entity, attr).ok_or_else(|| {
        GridError::validation(
            ErrorOrigin::Synthesizer,
            format!("no bound column for key attribute '{}'", attr.name()),
        )
    })
}

fn cell_value(model: &GridModel, row: usize, col: usize) -> Result<Value, GridError> {
    model
        .cell(CellPos::new(row, col))
        .cloned()
        .ok_or_else(|| {
            GridError::invariant(
                ErrorOrigin::Synthesizer,
                format!("ledger references missing cell ({row}, {col})"),
            )
        })
}
