//! Facade over the Gridsync engine.
//!
//! ## Crate layout
//! - `core`: the edit model, statement synthesis, sync jobs, and paging.
//!
//! The `prelude` module mirrors the runtime surface host shells work with;
//! collaborator traits and error types are reachable through `core`.

pub use gridsync_core as core;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use gridsync_core::error::GridError as Error;

///
/// Prelude
///

pub mod prelude {
    pub use gridsync_core::{
        prelude::*,
        traits::{
            ContainerFeatures, ContextFactory, DataContainer, ExecutionContext,
            GeneratedKeyReceiver, TransactionManager,
        },
    };
}
