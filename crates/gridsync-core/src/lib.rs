//! Core runtime for Gridsync: the result-grid edit model, statement
//! synthesis, store synchronization jobs, and incremental paging.
#![warn(unreachable_pub)]

pub mod error;
pub mod grid;
pub mod model;
pub mod obs;
pub mod traits;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, jobs, sinks, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        grid::{GridEvent, GridModel, GridSession, PagerConfig, SortOutcome},
        model::{
            Attribute, AttributeBinding, Bindings, CellPos, ColumnSort, EntityIdentifier,
            OrderColumn, Row, RowIdentifier, SortSpec, SourceEntity,
        },
        value::{DefaultValueHandler, Value, ValueHandler},
    };
}
