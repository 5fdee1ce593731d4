//! Data models for PartyMaker entities.
//!
//! This module contains the documents exchanged with the remote store:
//!
//! - `Group`: the membership-bearing party/event aggregate
//! - `KeySet`: presence map of user keys (`{"alice": true}`)
//! - `User`: directory identity used to display member keys

pub mod group;
pub mod user;

pub use group::{fields, FieldMap, Group, KeySet, GROUP_TYPE_PRIVATE, GROUP_TYPE_PUBLIC};
pub use user::User;
