//! Local caching module for offline group access.
//!
//! This module provides the `CacheManager`, a process-local snapshot store
//! for `Group` documents that can optionally mirror its entries to disk as
//! JSON, and the `StalenessPolicy` that decides when a cached snapshot is
//! still trusted. The cache is never authoritative; the remote store is.

pub mod manager;
pub mod staleness;

pub use manager::{CacheManager, CachedData};
pub use staleness::{is_stale, StalenessPolicy, DEFAULT_COOLDOWN_SECS};
