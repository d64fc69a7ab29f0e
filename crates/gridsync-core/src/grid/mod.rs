//! The edit-tracking and synchronization engine: row store, edit ledger,
//! statement synthesis, background sync/fetch jobs, reconciliation, and
//! paging.

mod ledger;
mod model;
mod pager;
mod reconcile;
mod session;
mod store;
mod sync;
mod synthesize;

#[cfg(test)]
mod tests;

pub use ledger::EditLedger;
pub use model::GridModel;
pub use pager::{Pager, PagerConfig, ReorderStrategy};
pub use session::{GridEvent, GridSession, SortOutcome};
pub use store::RowStore;
pub use sync::{SyncOutcome, SyncState};
pub use synthesize::{StatementBatch, StatementDescriptor, StatementKind};
