//! REST client module for the PartyMaker document server.
//!
//! This module provides the `ApiClient`, the network-backed `RemoteStore`
//! and `UserDirectory`. The server fronts a realtime document database and
//! exposes one JSON document per group under `/api/firebase/Groups/{key}`.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
