use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::Group;

/// Sub-directory of the cache dir that holds one JSON file per group
const GROUPS_DIR: &str = "groups";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Process-local group snapshot store, optionally mirrored to disk.
///
/// Callers always receive clones; the stored entries are never handed out.
/// Same-key operations are serialized by the `SyncCoordinator`, so the lock
/// here only protects the map itself. Disk failures are logged and otherwise
/// ignored: a missing snapshot is just a cache miss.
pub struct CacheManager {
    entries: RwLock<HashMap<String, CachedData<Group>>>,
    cache_dir: Option<PathBuf>,
}

impl CacheManager {
    /// Cache that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            cache_dir: None,
        }
    }

    /// Cache persisted under `cache_dir`; entries from earlier runs are loaded on demand.
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        let groups_dir = cache_dir.join(GROUPS_DIR);
        std::fs::create_dir_all(&groups_dir)
            .with_context(|| format!("Failed to create cache directory: {}", groups_dir.display()))?;
        Ok(Self {
            entries: RwLock::new(HashMap::new()),
            cache_dir: Some(cache_dir),
        })
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<String, CachedData<Group>>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, CachedData<Group>>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<Group> {
        self.entry(key).map(|cached| cached.data)
    }

    /// Snapshot plus its refresh timestamp
    pub fn entry(&self, key: &str) -> Option<CachedData<Group>> {
        if let Some(cached) = self.read_entries().get(key) {
            return Some(cached.clone());
        }

        let path = self.cache_path(key)?;
        match load::<Group>(&path) {
            Ok(Some(cached)) => {
                debug!(key = key, "Loaded group snapshot from disk");
                Some(self.write_entries().entry(key.to_string()).or_insert(cached).clone())
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = key, error = %e, "Discarding unreadable cache file");
                None
            }
        }
    }

    /// Store `group` as refreshed now
    pub fn put(&self, key: &str, group: Group) {
        self.put_entry(key, CachedData::new(group));
    }

    /// Store an entry keeping its original timestamp (used for rollback)
    pub fn put_entry(&self, key: &str, cached: CachedData<Group>) {
        self.persist(key, &cached);
        self.write_entries().insert(key.to_string(), cached);
    }

    /// Store `group` only while the entry still carries the timestamp seen
    /// earlier (`None` meaning absent). Returns whether it was stored.
    pub fn put_if_unchanged(&self, key: &str, observed: Option<DateTime<Utc>>, group: Group) -> bool {
        let cached = CachedData::new(group);
        {
            let mut entries = self.write_entries();
            if entries.get(key).map(|e| e.cached_at) != observed {
                return false;
            }
            entries.insert(key.to_string(), cached.clone());
        }
        self.persist(key, &cached);
        true
    }

    /// Evict only while the entry still carries the timestamp seen earlier.
    pub fn evict_if_unchanged(&self, key: &str, observed: Option<DateTime<Utc>>) -> bool {
        if self.read_entries().get(key).map(|e| e.cached_at) != observed {
            return false;
        }
        self.evict(key);
        true
    }

    /// Every snapshot, including ones persisted by earlier runs, ordered by key.
    pub fn all(&self) -> Vec<CachedData<Group>> {
        if let Some(dir) = &self.cache_dir {
            self.load_persisted(&dir.join(GROUPS_DIR));
        }
        let mut all: Vec<CachedData<Group>> = self.read_entries().values().cloned().collect();
        all.sort_by(|a, b| a.data.key.cmp(&b.data.key));
        all
    }

    fn load_persisted(&self, groups_dir: &Path) {
        let read_dir = match std::fs::read_dir(groups_dir) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                warn!(error = %e, "Failed to list cache directory");
                return;
            }
        };
        for dir_entry in read_dir.flatten() {
            let path = dir_entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match load::<Group>(&path) {
                Ok(Some(cached)) if !cached.data.key.is_empty() => {
                    self.write_entries().entry(cached.data.key.clone()).or_insert(cached);
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Discarding unreadable cache file"),
            }
        }
    }

    /// Put back a snapshot taken earlier; `None` means the key was absent.
    pub fn restore(&self, key: &str, snapshot: Option<CachedData<Group>>) {
        match snapshot {
            Some(cached) => self.put_entry(key, cached),
            None => self.evict(key),
        }
    }

    pub fn evict(&self, key: &str) {
        self.write_entries().remove(key);
        if let Some(path) = self.cache_path(key) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(key = key, error = %e, "Failed to remove cache file");
                }
            }
        }
    }

    /// Drop every entry, in memory and on disk
    pub fn clear(&self) {
        let keys: Vec<String> = self.write_entries().drain().map(|(key, _)| key).collect();
        debug!(count = keys.len(), "Clearing group cache");
        if let Some(dir) = &self.cache_dir {
            let groups_dir = dir.join(GROUPS_DIR);
            if let Err(e) = std::fs::remove_dir_all(&groups_dir).and_then(|_| std::fs::create_dir_all(&groups_dir)) {
                warn!(error = %e, "Failed to clear cache directory");
            }
        }
    }

    /// Number of entries held in memory
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cache_path(&self, key: &str) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(GROUPS_DIR).join(format!("{}.json", urlencoding::encode(key))))
    }

    fn persist(&self, key: &str, cached: &CachedData<Group>) {
        let Some(path) = self.cache_path(key) else {
            return;
        };
        if let Err(e) = save(&path, cached) {
            warn!(key = key, error = %e, "Failed to persist group snapshot");
        }
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<CachedData<T>>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cache file: {}", path.display()))?;
    let cached = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse cache file: {}", path.display()))?;
    Ok(Some(cached))
}

fn save<T: Serialize>(path: &Path, cached: &CachedData<T>) -> Result<()> {
    let contents = serde_json::to_string_pretty(cached)?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write cache file: {}", path.display()))?;
    Ok(())
}
