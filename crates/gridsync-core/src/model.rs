use crate::{
    error::{ErrorOrigin, GridError},
    value::{Value, ValueHandler},
};
use derive_more::{Deref, DerefMut, IntoIterator};
use std::{fmt, sync::Arc};

///
/// Row
///
/// Fixed-arity sequence of column values; arity equals the number of bound
/// attributes. Identity is positional (row index), never content-based.
///

#[derive(Clone, Debug, Default, PartialEq, Deref, DerefMut, IntoIterator)]
pub struct Row(#[into_iterator(owned, ref)] pub Vec<Value>);

impl Row {
    #[must_use]
    pub const fn new(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

///
/// CellPos
/// Grid coordinate addressing one cell of the current row sequence.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CellPos {
    pub row: usize,
    pub col: usize,
}

impl CellPos {
    #[must_use]
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

///
/// SourceEntity
/// Identity of one updatable source entity (table, collection, view).
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SourceEntity {
    name: String,
}

impl SourceEntity {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for SourceEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

///
/// Attribute
///
/// One source-entity attribute. `sequence` marks store-assigned identity
/// columns (auto-increment); those are nulled when a row is copied.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Attribute {
    name: String,
    sequence: bool,
}

impl Attribute {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sequence: false,
        }
    }

    #[must_use]
    pub fn sequence(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sequence: true,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_sequence(&self) -> bool {
        self.sequence
    }
}

///
/// AttributeValue
/// Attribute/value pair carried by statement descriptors.
///

#[derive(Clone, Debug, PartialEq)]
pub struct AttributeValue {
    pub attribute: Attribute,
    pub value: Value,
}

impl AttributeValue {
    #[must_use]
    pub const fn new(attribute: Attribute, value: Value) -> Self {
        Self { attribute, value }
    }
}

///
/// EntityIdentifier
///
/// The ordered set of key attributes uniquely addressing a row within one
/// source entity. `Declared` is a real schema key; `Virtual` is a
/// user-declared substitute used only for addressing, never persisted.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EntityIdentifier {
    Declared { attributes: Vec<Attribute> },
    Virtual { attributes: Vec<Attribute> },
}

impl EntityIdentifier {
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        match self {
            Self::Declared { attributes } | Self::Virtual { attributes } => attributes,
        }
    }

    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual { .. })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes().is_empty()
    }

    /// Replace the attribute set of a virtual identifier after the user has
    /// (re)defined it interactively. Declared identifiers are immutable.
    pub fn reload_attributes(&mut self, attributes: Vec<Attribute>) -> Result<(), GridError> {
        match self {
            Self::Virtual { attributes: slot } => {
                *slot = attributes;
                Ok(())
            }
            Self::Declared { .. } => Err(GridError::unsupported(
                ErrorOrigin::Model,
                "declared entity identifiers cannot be redefined",
            )),
        }
    }
}

///
/// RowIdentifier
/// A source entity together with the identifier that addresses rows in it.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RowIdentifier {
    entity: SourceEntity,
    identifier: EntityIdentifier,
}

impl RowIdentifier {
    #[must_use]
    pub const fn new(entity: SourceEntity, identifier: EntityIdentifier) -> Self {
        Self { entity, identifier }
    }

    #[must_use]
    pub const fn entity(&self) -> &SourceEntity {
        &self.entity
    }

    #[must_use]
    pub const fn identifier(&self) -> &EntityIdentifier {
        &self.identifier
    }

    #[must_use]
    pub fn key_attributes(&self) -> &[Attribute] {
        self.identifier.attributes()
    }
}

///
/// AttributeBinding
///
/// One per visible column: the source entity attribute (absent for
/// synthetic/computed columns), the value handler, and the row identifier
/// addressing this column's source entity. A column with no entity
/// attribute is never editable.
///

#[derive(Clone)]
pub struct AttributeBinding {
    name: String,
    entity_attribute: Option<Attribute>,
    handler: Arc<dyn ValueHandler>,
    row_identifier: Option<RowIdentifier>,
}

impl AttributeBinding {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        entity_attribute: Option<Attribute>,
        handler: Arc<dyn ValueHandler>,
        row_identifier: Option<RowIdentifier>,
    ) -> Self {
        Self {
            name: name.into(),
            entity_attribute,
            handler,
            row_identifier,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn entity_attribute(&self) -> Option<&Attribute> {
        self.entity_attribute.as_ref()
    }

    #[must_use]
    pub fn handler(&self) -> &dyn ValueHandler {
        self.handler.as_ref()
    }

    #[must_use]
    pub const fn row_identifier(&self) -> Option<&RowIdentifier> {
        self.row_identifier.as_ref()
    }

    #[must_use]
    pub fn is_sequence(&self) -> bool {
        self.entity_attribute
            .as_ref()
            .is_some_and(Attribute::is_sequence)
    }

    /// A column is read-only when it has no source attribute or no row
    /// identifier to address its entity with.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.entity_attribute.is_none() || self.row_identifier.is_none()
    }
}

impl fmt::Debug for AttributeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeBinding")
            .field("name", &self.name)
            .field("entity_attribute", &self.entity_attribute)
            .field("row_identifier", &self.row_identifier)
            .finish_non_exhaustive()
    }
}

///
/// Bindings
/// The bound column set of one result grid.
///

#[derive(Clone, Debug, Default)]
pub struct Bindings(Vec<AttributeBinding>);

impl Bindings {
    #[must_use]
    pub const fn new(columns: Vec<AttributeBinding>) -> Self {
        Self(columns)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, col: usize) -> Option<&AttributeBinding> {
        self.0.get(col)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeBinding> {
        self.0.iter()
    }

    /// All visible columns trace back to one updatable source entity.
    /// Returns that entity, or `None` when editing must stay disabled.
    #[must_use]
    pub fn single_source(&self) -> Option<&SourceEntity> {
        let mut source: Option<&SourceEntity> = None;
        for column in &self.0 {
            if column.is_read_only() {
                return None;
            }
            let entity = column.row_identifier()?.entity();
            match source {
                None => source = Some(entity),
                Some(seen) if seen != entity => return None,
                Some(_) => {}
            }
        }
        source
    }

    /// Resolve the grid column bound to `attribute` within `entity`.
    #[must_use]
    pub fn column_of(&self, entity: &SourceEntity, attribute: &Attribute) -> Option<usize> {
        self.0.iter().position(|column| {
            column
                .row_identifier()
                .is_some_and(|id| id.entity() == entity)
                && column
                    .entity_attribute()
                    .is_some_and(|attr| attr.name() == attribute.name())
        })
    }

    /// Resolve a grid column by attribute name within `entity`.
    #[must_use]
    pub fn column_by_name(&self, entity: Option<&SourceEntity>, name: &str) -> Option<usize> {
        self.0.iter().position(|column| {
            entity.is_none_or(|entity| {
                column
                    .row_identifier()
                    .is_some_and(|id| id.entity() == entity)
            }) && column
                .entity_attribute()
                .is_some_and(|attr| attr.name() == name)
        })
    }

    #[must_use]
    pub fn first_sequence_column(&self) -> Option<usize> {
        self.0.iter().position(AttributeBinding::is_sequence)
    }
}

///
/// OrderColumn
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderColumn {
    pub attribute: String,
    pub descending: bool,
}

impl OrderColumn {
    #[must_use]
    pub fn new(attribute: impl Into<String>, descending: bool) -> Self {
        Self {
            attribute: attribute.into(),
            descending,
        }
    }
}

///
/// ColumnSort
/// Resulting sort state of a column after a toggle.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnSort {
    Ascending,
    Descending,
    Unsorted,
}

///
/// SortSpec
///
/// Ordered list of order columns applied in sequence. Toggling cycles
/// unsorted -> ascending -> descending -> unsorted; an exclusive toggle
/// clears the other order columns first.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SortSpec {
    columns: Vec<OrderColumn>,
}

impl SortSpec {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn columns(&self) -> &[OrderColumn] {
        &self.columns
    }

    #[must_use]
    pub fn sort_of(&self, attribute: &str) -> ColumnSort {
        match self.columns.iter().find(|c| c.attribute == attribute) {
            Some(c) if c.descending => ColumnSort::Descending,
            Some(_) => ColumnSort::Ascending,
            None => ColumnSort::Unsorted,
        }
    }

    pub fn toggle(&mut self, attribute: &str, exclusive: bool) -> ColumnSort {
        if exclusive {
            self.columns.retain(|c| c.attribute == attribute);
        }
        match self.columns.iter_mut().find(|c| c.attribute == attribute) {
            None => {
                self.columns.push(OrderColumn::new(attribute, false));
                ColumnSort::Ascending
            }
            Some(column) if !column.descending => {
                column.descending = true;
                ColumnSort::Descending
            }
            Some(_) => {
                self.columns.retain(|c| c.attribute != attribute);
                ColumnSort::Unsorted
            }
        }
    }

    pub fn clear(&mut self) {
        self.columns.clear();
    }
}
