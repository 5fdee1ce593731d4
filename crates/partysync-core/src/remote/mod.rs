//! Seams to the authoritative document store and the user directory.
//!
//! `RemoteStore` is the only place group state is authoritative. The
//! coordinator never retries a failed call; implementations decide their own
//! timeout and retry behavior and report the final outcome.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{FieldMap, Group, User};

pub use memory::MemoryRemoteStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Transient network/server failure, including timeouts
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// The server understood the request and refused it
    #[error("Request rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whole-document fetch; `Ok(None)` when the key does not exist.
    async fn fetch(&self, key: &str) -> Result<Option<Group>, RemoteError>;

    /// Every group document, in no particular order.
    async fn fetch_all(&self) -> Result<Vec<Group>, RemoteError>;

    /// Apply only the named top-level fields; `null` clears a field.
    async fn update(&self, key: &str, fields: FieldMap) -> Result<(), RemoteError>;

    async fn delete(&self, key: &str) -> Result<(), RemoteError>;

    /// Write a whole document, creating or replacing it.
    async fn save(&self, key: &str, group: &Group) -> Result<(), RemoteError>;
}

/// Resolves user keys to display identities for collaborators.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>, RemoteError>;

    async fn get_user(&self, key: &str) -> Result<User, RemoteError>;
}
