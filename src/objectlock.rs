//! Per-object mutex registry (spec §4.2).
//!
//! Enforces single-writer-per-key: `PutObject`, `DeleteObject`, and every
//! multipart-part/`Complete`/`Abort` operation against the same
//! `bucket+object` take this lock before touching the backend, so two
//! concurrent writers to the same key never interleave. Entries are
//! created lazily on first use and reaped by the background maintenance
//! ticker (see [`crate::server`]) once their holder/waiter count drops to
//! zero, so the registry doesn't grow without bound across the lifetime
//! of a long-running gateway.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct Entry {
    lock: Arc<AsyncMutex<()>>,
    waiters: AtomicUsize,
}

/// A held per-object lock. Dropping it releases the lock and, if no one
/// else is waiting, marks the entry eligible for reaping.
pub struct ObjectGuard {
    _guard: OwnedMutexGuard<()>,
    registry: LockRegistry,
    key: String,
}

impl Drop for ObjectGuard {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

/// The `bucket+object` keyed table of per-object locks.
#[derive(Clone)]
pub struct LockRegistry {
    entries: Arc<SyncMutex<HashMap<String, Arc<Entry>>>>,
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(SyncMutex::new(HashMap::new())),
        }
    }

    fn key(bucket: &str, object: &str) -> String {
        format!("{bucket}/{object}")
    }

    /// Acquire the lock for `bucket+object`, creating the entry if this
    /// is the first caller to reference it.
    pub async fn acquire(&self, bucket: &str, object: &str) -> ObjectGuard {
        let key = Self::key(bucket, object);
        let entry = {
            let mut entries = self.entries.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| {
                    Arc::new(Entry {
                        lock: Arc::new(AsyncMutex::new(())),
                        waiters: AtomicUsize::new(0),
                    })
                })
                .clone();
            entry.waiters.fetch_add(1, Ordering::SeqCst);
            entry
        };

        let guard = entry.lock.clone().lock_owned().await;
        ObjectGuard {
            _guard: guard,
            registry: self.clone(),
            key,
        }
    }

    fn release(&self, key: &str) {
        let entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            entry.waiters.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Drop any entry with no current holder/waiter. Called periodically
    /// by the background maintenance ticker.
    pub fn reap_idle(&self) {
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.waiters.load(Ordering::SeqCst) > 0);
    }

    /// Number of tracked entries, for tests and metrics.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    #[tokio::test]
    async fn serializes_writers_to_the_same_key() {
        let registry = LockRegistry::new();
        let counter = Arc::new(AtomicU32::new(0));
        let max_concurrent = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let counter = counter.clone();
            let max_concurrent = max_concurrent.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire("b1", "k").await;
                let now = counter.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                max_concurrent.fetch_max(now, AtomicOrdering::SeqCst);
                tokio::task::yield_now().await;
                counter.fetch_sub(1, AtomicOrdering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_concurrent.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let registry = LockRegistry::new();
        let g1 = registry.acquire("b1", "k1").await;
        let g2 = registry.acquire("b1", "k2").await;
        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn reap_idle_evicts_entries_with_no_holders() {
        let registry = LockRegistry::new();
        {
            let _guard = registry.acquire("b1", "k").await;
            assert_eq!(registry.len(), 1);
        }
        registry.reap_idle();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn reap_idle_leaves_held_entries_alone() {
        let registry = LockRegistry::new();
        let _guard = registry.acquire("b1", "k").await;
        registry.reap_idle();
        assert_eq!(registry.len(), 1);
    }
}
