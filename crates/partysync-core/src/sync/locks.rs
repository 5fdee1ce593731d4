use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = HashMap<String, Arc<AsyncMutex<()>>>;

/// One async mutex per key, created on demand and dropped when unused.
#[derive(Default)]
pub struct KeyLocks {
    table: Arc<Mutex<LockTable>>,
}

/// Holds the lock for one key until dropped.
pub struct KeyGuard {
    key: String,
    table: Arc<Mutex<LockTable>>,
    guard: Option<OwnedMutexGuard<()>>,
}

fn lock_table(table: &Mutex<LockTable>) -> MutexGuard<'_, LockTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let mutex = {
            let mut table = lock_table(&self.table);
            Arc::clone(table.entry(key.to_string()).or_default())
        };
        let guard = mutex.lock_owned().await;
        KeyGuard {
            key: key.to_string(),
            table: Arc::clone(&self.table),
            guard: Some(guard),
        }
    }

    /// Whether someone holds or waits for the lock on `key`
    pub fn is_locked(&self, key: &str) -> bool {
        lock_table(&self.table).contains_key(key)
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut table = lock_table(&self.table);
        if let Some(guard) = self.guard.take() {
            let mutex = OwnedMutexGuard::mutex(&guard);
            // Table entry + this guard; no waiters left
            if Arc::strong_count(mutex) == 2 {
                table.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = KeyLocks::new();
        let guard = locks.acquire("G1").await;
        assert!(locks.is_locked("G1"));
        assert!(!locks.is_locked("G2"));
        drop(guard);
        assert!(!locks.is_locked("G1"));
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.acquire("G1").await;
        let _b = locks.acquire("G2").await;
        assert!(locks.is_locked("G1") && locks.is_locked("G2"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_is_serialized() {
        let locks = Arc::new(KeyLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("G1").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(!locks.is_locked("G1"));
    }
}
