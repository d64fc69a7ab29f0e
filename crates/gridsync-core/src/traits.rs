//! Injected collaborator seams.
//!
//! The engine never resolves its store through ambient registries; the
//! session receives a [`ContextFactory`] and a [`DataContainer`] at
//! construction and talks to them only through these traits.

use crate::{
    error::ContainerError,
    model::{AttributeValue, Row, SortSpec},
    value::Value,
};

///
/// ContextPurpose
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContextPurpose {
    Sync,
    Fetch,
}

///
/// SavepointId
/// Opaque handle to a transactional rollback point.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SavepointId(pub u64);

///
/// TransactionManager
///

pub trait TransactionManager {
    fn is_auto_commit(&self) -> Result<bool, ContainerError>;

    fn supports_savepoints(&self) -> bool;

    fn set_savepoint(&mut self) -> Result<SavepointId, ContainerError>;

    fn rollback_to(&mut self, savepoint: SavepointId) -> Result<(), ContainerError>;

    fn release_savepoint(&mut self, savepoint: SavepointId) -> Result<(), ContainerError>;
}

///
/// ExecutionContext
///
/// One transactional session against the external store. Exclusively owned
/// by the running job for its duration and closed on every exit path.
///

pub trait ExecutionContext {
    fn transactions(&mut self) -> &mut dyn TransactionManager;

    fn close(&mut self) -> Result<(), ContainerError>;
}

///
/// ContextFactory
///

pub trait ContextFactory: Send + Sync {
    fn open_context(
        &self,
        purpose: ContextPurpose,
    ) -> Result<Box<dyn ExecutionContext>, ContainerError>;
}

///
/// ContainerFeatures
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ContainerFeatures {
    pub server_side_order: bool,
    pub server_side_filter: bool,
}

///
/// GeneratedKeyReceiver
/// Callback surface for store-generated key/identity values.
///

pub trait GeneratedKeyReceiver {
    fn push_key(&mut self, attribute_name: &str, value: Value);
}

///
/// DataContainer
///
/// Per-source-entity data operations. Row counts are the store-reported
/// affected-row counts, not engine guesses.
///

pub trait DataContainer: Send + Sync {
    fn features(&self) -> ContainerFeatures;

    fn read_segment(
        &self,
        ctx: &mut dyn ExecutionContext,
        order: &SortSpec,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>, ContainerError>;

    fn insert_row(
        &self,
        ctx: &mut dyn ExecutionContext,
        values: &[AttributeValue],
        keys: &mut dyn GeneratedKeyReceiver,
    ) -> Result<u64, ContainerError>;

    fn update_row(
        &self,
        ctx: &mut dyn ExecutionContext,
        keys: &[AttributeValue],
        changes: &[AttributeValue],
        generated: &mut dyn GeneratedKeyReceiver,
    ) -> Result<u64, ContainerError>;

    fn delete_row(
        &self,
        ctx: &mut dyn ExecutionContext,
        keys: &[AttributeValue],
    ) -> Result<u64, ContainerError>;
}
