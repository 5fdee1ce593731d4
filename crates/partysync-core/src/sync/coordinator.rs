//! Read-through / write-through coordination between the local cache and
//! the remote store.
//!
//! Reads trust a cached snapshot while it is younger than the staleness
//! cooldown, otherwise they fetch and repopulate the cache. When the fetch
//! fails but a snapshot exists, the read degrades to that snapshot and says
//! so in `Freshness::Degraded`.
//!
//! Mutations take the per-key lock, compute the next state with the
//! membership engine, publish it to the cache, then commit the changed
//! fields remotely. A failed commit restores the cache snapshot before the
//! error is returned, so callers never see an uncommitted write once the
//! call has finished.
//!
//! Reads do not wait for the lock. A read that fetched while a mutation on
//! the same key was in flight returns what it fetched but leaves the cache
//! alone, so it cannot replace a committed state with an older document.
//!
//! A document without an admin is a deleted group and reads as `NotFound`.
//!
//! Each operation runs on its own spawned task. Dropping the returned
//! future does not cancel the remote call or its cache side-effects.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cache::{CacheManager, StalenessPolicy};
use crate::error::SyncError;
use crate::membership::{GroupDetails, MembershipError, MembershipOp, Transition};
use crate::models::Group;
use crate::remote::{RemoteError, RemoteStore};

use super::KeyLocks;

/// Where the group returned by a read came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Freshness {
    /// Cache hit inside the cooldown window
    Cached,
    /// Fetched from the remote store just now
    Fetched,
    /// Remote fetch failed; this is the last cached snapshot
    Degraded(SyncError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupRead {
    pub group: Group,
    pub freshness: Freshness,
}

impl GroupRead {
    pub fn is_degraded(&self) -> bool {
        matches!(self.freshness, Freshness::Degraded(_))
    }

    /// The remote error behind a degraded read
    pub fn warning(&self) -> Option<&SyncError> {
        match &self.freshness {
            Freshness::Degraded(err) => Some(err),
            _ => None,
        }
    }
}

/// Result of a group listing.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupList {
    /// Ordered by group key
    pub groups: Vec<Group>,
    pub freshness: Freshness,
}

impl GroupList {
    pub fn is_degraded(&self) -> bool {
        matches!(self.freshness, Freshness::Degraded(_))
    }

    pub fn warning(&self) -> Option<&SyncError> {
        match &self.freshness {
            Freshness::Degraded(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Updated(Group),
    /// The group was removed from both the remote store and the cache
    Deleted,
}

impl MutationOutcome {
    pub fn group(&self) -> Option<&Group> {
        match self {
            MutationOutcome::Updated(group) => Some(group),
            MutationOutcome::Deleted => None,
        }
    }
}

/// Clone is cheap - all state is shared behind one Arc.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    remote: Arc<dyn RemoteStore>,
    cache: Arc<CacheManager>,
    policy: StalenessPolicy,
    locks: KeyLocks,
    /// When the last full listing succeeded
    listed_at: Mutex<Option<DateTime<Utc>>>,
}

/// A group with no admin has been deleted.
fn is_live(group: &Group) -> bool {
    !group.admin_key.trim().is_empty()
}

/// Run `fut` on its own task so that abandoning the caller keeps the side-effects.
async fn detached<T, F>(fut: F) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, SyncError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| SyncError::Internal(format!("sync task failed: {}", e)))?
}

impl SyncCoordinator {
    pub fn new(remote: Arc<dyn RemoteStore>, cache: Arc<CacheManager>, policy: StalenessPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                remote,
                cache,
                policy,
                locks: KeyLocks::new(),
                listed_at: Mutex::new(None),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.inner.cache
    }

    pub fn policy(&self) -> StalenessPolicy {
        self.inner.policy
    }

    /// Whether a mutation on `key` is running or queued
    pub fn is_mutating(&self, key: &str) -> bool {
        self.inner.locks.is_locked(key)
    }

    pub async fn read(&self, key: &str, force_refresh: bool) -> Result<GroupRead, SyncError> {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        detached(async move { inner.read(&key, force_refresh, false).await }).await
    }

    /// Every group, cache-first within the cooldown of the last listing.
    pub async fn list_groups(&self, force_refresh: bool) -> Result<GroupList, SyncError> {
        let inner = Arc::clone(&self.inner);
        detached(async move { inner.list(None, force_refresh).await }).await
    }

    /// Groups where `user` is the admin or a member.
    pub async fn list_user_groups(&self, user: &str, force_refresh: bool) -> Result<GroupList, SyncError> {
        let inner = Arc::clone(&self.inner);
        let user = user.to_string();
        detached(async move { inner.list(Some(&user), force_refresh).await }).await
    }

    pub async fn mutate(&self, key: &str, op: MembershipOp) -> Result<MutationOutcome, SyncError> {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        detached(async move { inner.mutate(&key, op).await }).await
    }

    pub async fn invite(&self, key: &str, target: &str) -> Result<MutationOutcome, SyncError> {
        self.mutate(key, MembershipOp::Invite { target: target.to_string() }).await
    }

    pub async fn join(&self, key: &str, user: &str) -> Result<MutationOutcome, SyncError> {
        self.mutate(key, MembershipOp::Join { user: user.to_string() }).await
    }

    pub async fn set_attendance(&self, key: &str, user: &str, attending: bool) -> Result<MutationOutcome, SyncError> {
        self.mutate(
            key,
            MembershipOp::SetAttendance {
                user: user.to_string(),
                attending,
            },
        )
        .await
    }

    pub async fn leave(&self, key: &str, user: &str) -> Result<MutationOutcome, SyncError> {
        self.mutate(key, MembershipOp::Leave { user: user.to_string() }).await
    }

    pub async fn remove_member(&self, key: &str, admin: &str, target: &str) -> Result<MutationOutcome, SyncError> {
        self.mutate(
            key,
            MembershipOp::RemoveMember {
                admin: admin.to_string(),
                target: target.to_string(),
            },
        )
        .await
    }

    pub async fn update_details(
        &self,
        key: &str,
        actor: &str,
        details: GroupDetails,
    ) -> Result<MutationOutcome, SyncError> {
        self.mutate(
            key,
            MembershipOp::UpdateDetails {
                actor: actor.to_string(),
                details,
            },
        )
        .await
    }

    /// Admin delete; an already absent group counts as deleted.
    pub async fn delete_group(&self, key: &str, actor: &str) -> Result<MutationOutcome, SyncError> {
        self.mutate(key, MembershipOp::Delete { actor: actor.to_string() }).await
    }

    /// Save a new group remotely, then cache it. The admin is always made a member.
    pub async fn create_group(&self, group: Group) -> Result<Group, SyncError> {
        let inner = Arc::clone(&self.inner);
        detached(async move { inner.create(group).await }).await
    }
}

impl Inner {
    /// `holds_lock` is set when the caller is the mutation owning `key`.
    async fn read(&self, key: &str, force_refresh: bool, holds_lock: bool) -> Result<GroupRead, SyncError> {
        let cached = self.cache.entry(key);

        if let Some(entry) = &cached {
            if !self.policy.should_refresh(entry.cached_at, Utc::now(), force_refresh) {
                debug!(key = key, "Cache hit");
                return Ok(GroupRead {
                    group: entry.data.clone(),
                    freshness: Freshness::Cached,
                });
            }
        }

        let observed = cached.as_ref().map(|entry| entry.cached_at);
        debug!(key = key, force_refresh, cached = cached.is_some(), "Fetching group from remote");
        match self.remote.fetch(key).await {
            Ok(Some(group)) if is_live(&group) => {
                self.publish(key, observed, group.clone(), holds_lock);
                Ok(GroupRead {
                    group,
                    freshness: Freshness::Fetched,
                })
            }
            Ok(found) => {
                if found.is_some() {
                    info!(key = key, "Group has no admin, treating as deleted");
                }
                if cached.is_some() {
                    info!(key = key, "Group gone from remote, evicting cached copy");
                    self.retire(key, observed, holds_lock);
                }
                Err(SyncError::NotFound(key.to_string()))
            }
            Err(e) => {
                let err = SyncError::from_remote(key, e);
                match cached {
                    Some(entry) => {
                        warn!(key = key, error = %err, age = %entry.age_display(), "Serving cached group after remote failure");
                        Ok(GroupRead {
                            group: entry.data,
                            freshness: Freshness::Degraded(err),
                        })
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Cache a fetched group unless a mutation may have published a newer state.
    fn publish(&self, key: &str, observed: Option<DateTime<Utc>>, group: Group, holds_lock: bool) {
        if holds_lock {
            self.cache.put(key, group);
        } else if self.locks.is_locked(key) || !self.cache.put_if_unchanged(key, observed, group) {
            debug!(key = key, "Mutation in flight, not caching fetched copy");
        }
    }

    fn retire(&self, key: &str, observed: Option<DateTime<Utc>>, holds_lock: bool) {
        if holds_lock {
            self.cache.evict(key);
        } else if self.locks.is_locked(key) || !self.cache.evict_if_unchanged(key, observed) {
            debug!(key = key, "Mutation in flight, keeping cached copy");
        }
    }

    async fn list(&self, user: Option<&str>, force_refresh: bool) -> Result<GroupList, SyncError> {
        let belongs = |group: &Group| user.map_or(true, |u| group.is_admin(u) || group.is_member(u));
        let snapshots = self.cache.all();
        let cached: Vec<Group> = snapshots
            .iter()
            .map(|entry| &entry.data)
            .filter(|group| belongs(*group))
            .cloned()
            .collect();

        let listed_at = *self.listed_at.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(listed_at) = listed_at {
            if !self.policy.should_refresh(listed_at, Utc::now(), force_refresh) {
                debug!(count = cached.len(), "Group list cache hit");
                return Ok(GroupList {
                    groups: cached,
                    freshness: Freshness::Cached,
                });
            }
        }

        let observed: HashMap<String, DateTime<Utc>> = snapshots
            .into_iter()
            .map(|entry| (entry.data.key, entry.cached_at))
            .collect();
        debug!(force_refresh, cached = observed.len(), "Fetching group list from remote");
        match self.remote.fetch_all().await {
            Ok(fetched) => {
                let mut seen = HashSet::new();
                let mut groups = Vec::new();
                for group in fetched.into_iter().filter(is_live) {
                    seen.insert(group.key.clone());
                    self.publish(&group.key, observed.get(&group.key).copied(), group.clone(), false);
                    if belongs(&group) {
                        groups.push(group);
                    }
                }
                for (key, cached_at) in &observed {
                    if !seen.contains(key) {
                        self.retire(key, Some(*cached_at), false);
                    }
                }
                *self.listed_at.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Utc::now());
                groups.sort_by(|a, b| a.key.cmp(&b.key));
                Ok(GroupList {
                    groups,
                    freshness: Freshness::Fetched,
                })
            }
            Err(e) => {
                let err = SyncError::from_remote("groups", e);
                if cached.is_empty() {
                    return Err(err);
                }
                warn!(error = %err, count = cached.len(), "Serving cached groups after remote failure");
                Ok(GroupList {
                    groups: cached,
                    freshness: Freshness::Degraded(err),
                })
            }
        }
    }

    async fn mutate(&self, key: &str, op: MembershipOp) -> Result<MutationOutcome, SyncError> {
        let _guard = self.locks.acquire(key).await;

        let current = match self.read(key, false, true).await {
            Ok(read) => read,
            Err(SyncError::NotFound(_)) if matches!(op, MembershipOp::Delete { .. }) => {
                debug!(key = key, "Delete of absent group");
                return Ok(MutationOutcome::Deleted);
            }
            Err(e) => return Err(e),
        };
        if let Some(err) = current.warning() {
            warn!(key = key, op = op.name(), error = %err, "Mutating from a cached snapshot");
        }

        let next = match op.apply(&current.group)? {
            Transition::Updated(next) => next,
            Transition::Deleted => return self.commit_delete(key, op.name()).await,
        };

        let fields = current
            .group
            .changed_fields(&next)
            .map_err(|e| SyncError::Internal(format!("failed to diff group {}: {}", key, e)))?;
        if fields.is_empty() {
            debug!(key = key, op = op.name(), "No change to commit");
            return Ok(MutationOutcome::Updated(next));
        }

        let snapshot = self.cache.entry(key);
        self.cache.put(key, next.clone());

        let changed: Vec<String> = fields.keys().cloned().collect();
        match self.remote.update(key, fields).await {
            Ok(()) => {
                // A read may have replaced the optimistic copy while the update was in flight
                self.cache.put(key, next.clone());
                info!(key = key, op = op.name(), fields = ?changed, "Mutation committed");
                Ok(MutationOutcome::Updated(next))
            }
            Err(e) => {
                self.cache.restore(key, snapshot);
                warn!(key = key, op = op.name(), error = %e, "Mutation failed, cache rolled back");
                Err(match e {
                    RemoteError::NotFound(_) => {
                        SyncError::Conflict(format!("group {} disappeared during {}", key, op.name()))
                    }
                    other => SyncError::from_remote(key, other),
                })
            }
        }
    }

    async fn commit_delete(&self, key: &str, op_name: &str) -> Result<MutationOutcome, SyncError> {
        match self.remote.delete(key).await {
            Ok(()) | Err(RemoteError::NotFound(_)) => {
                self.cache.evict(key);
                info!(key = key, op = op_name, "Group deleted");
                Ok(MutationOutcome::Deleted)
            }
            Err(e) => {
                warn!(key = key, op = op_name, error = %e, "Group delete failed, keeping cached copy");
                Err(SyncError::from_remote(key, e))
            }
        }
    }

    async fn create(&self, mut group: Group) -> Result<Group, SyncError> {
        if group.key.trim().is_empty() {
            return Err(MembershipError::InvalidInput("group key must not be empty".to_string()).into());
        }
        if group.admin_key.trim().is_empty() {
            return Err(MembershipError::InvalidInput("admin key must not be empty".to_string()).into());
        }
        if group.name.trim().is_empty() {
            return Err(MembershipError::InvalidInput("group name must not be empty".to_string()).into());
        }
        group.friend_keys.insert(group.admin_key.clone());

        let key = group.key.clone();
        let _guard = self.locks.acquire(&key).await;

        match self.remote.fetch(&key).await {
            Ok(Some(existing)) if is_live(&existing) => {
                return Err(SyncError::Conflict(format!("group {} already exists", key)))
            }
            Ok(_) => {}
            Err(e) => return Err(SyncError::from_remote(&key, e)),
        }

        self.remote
            .save(&key, &group)
            .await
            .map_err(|e| SyncError::from_remote(&key, e))?;
        self.cache.put(&key, group.clone());
        info!(key = %key, admin = %group.admin_key, "Group created");
        Ok(group)
    }
}
