//! Cache/remote coordination for group reads and mutations.

pub mod coordinator;
pub mod locks;

pub use coordinator::{Freshness, GroupList, GroupRead, MutationOutcome, SyncCoordinator};
pub use locks::{KeyGuard, KeyLocks};
