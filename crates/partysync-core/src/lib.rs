//! Group membership synchronization for PartyMaker.
//!
//! Coordinates shared group state (members, attendees, admin) between a
//! local snapshot cache and the authoritative remote document store:
//!
//! - `cache`: `CacheManager` snapshots and the `StalenessPolicy`
//! - `membership`: pure invite/attend/leave/remove/admin-transfer rules
//! - `remote`: the `RemoteStore` and `UserDirectory` seams
//! - `api`: the HTTP implementation of those seams
//! - `sync`: the `SyncCoordinator` tying it all together

pub mod api;
pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod membership;
pub mod models;
pub mod remote;
pub mod sync;

pub use api::ApiClient;
pub use cache::{CacheManager, StalenessPolicy};
pub use config::Config;
pub use directory::{resolve_roster, MemberRoster};
pub use error::SyncError;
pub use membership::{GroupDetails, MembershipError, MembershipOp};
pub use models::{Group, User};
pub use remote::{MemoryRemoteStore, RemoteError, RemoteStore, UserDirectory};
pub use sync::{Freshness, GroupList, GroupRead, MutationOutcome, SyncCoordinator};
