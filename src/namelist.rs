//! Ref-counted namelist cache (spec §4.1).
//!
//! A namelist caches the set of child names under a scope — a user's
//! bucket names, or a bucket's object names — so repeated listings and
//! existence checks during a burst of requests against the same scope
//! don't each round-trip the backend. The cache is installed lazily on
//! the first `Ref` into a scope (backed by one `enumerate_*` backend
//! call) and flushed (dropped, not persisted) the moment the refcount
//! returns to zero, so it never outlives the requests that justified it
//! and never drifts from the backend for long.
//!
//! Mutation handlers (`PutObject`/`DeleteObject`/...) write through: they
//! update the in-memory set directly after a successful backend call,
//! rather than waiting for the next install.
//!
//! Grounded in the ruststack-s3-core state module's sharded-map idiom
//! (`DashMap` for the top-level scope table; see `state/service.rs` in
//! that pack) adapted to the gateway's own install-once/flush-on-zero
//! lifecycle rather than a permanently resident map.
//!
//! The 0 -> 1 transition has to run the backend `enumerate_*` call
//! exactly once even when several requests Ref the same scope for the
//! first time concurrently. The entry is reserved non-destructively
//! (`DashMap::entry().or_insert_with`, never a plain `insert` that would
//! clobber a racing winner) and the load itself runs inside a
//! `tokio::sync::OnceCell` so every concurrent acquirer either runs the
//! load or awaits the one that is already running.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

/// The set of names cached for one scope (a user's buckets, or a
/// bucket's objects), plus the refcount gating its lifetime and the
/// one-shot gate around the initial backend load.
struct Entry {
    names: Mutex<BTreeSet<String>>,
    refcount: std::sync::atomic::AtomicUsize,
    init: OnceCell<()>,
}

impl Entry {
    /// A brand-new entry, pre-referenced by its creator (no 0 -> 1
    /// fetch_add race: it is only ever published already at 1).
    fn fresh() -> Self {
        Self {
            names: Mutex::new(BTreeSet::new()),
            refcount: std::sync::atomic::AtomicUsize::new(1),
            init: OnceCell::new(),
        }
    }
}

/// A live reference into a scope's namelist, held for the duration of a
/// request. Dropping it decrements the scope's refcount and evicts the
/// entry once it reaches zero.
pub struct NamelistRef {
    registry: NamelistRegistry,
    scope_key: String,
    entry: Arc<Entry>,
}

impl NamelistRef {
    /// Snapshot the cached names as of now.
    pub fn names(&self) -> BTreeSet<String> {
        self.entry.names.lock().clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry.names.lock().contains(name)
    }

    /// Write-through insert: call after a backend mutation succeeds.
    pub fn insert(&self, name: impl Into<String>) {
        self.entry.names.lock().insert(name.into());
    }

    /// Write-through removal: call after a backend mutation succeeds.
    pub fn remove(&self, name: &str) {
        self.entry.names.lock().remove(name);
    }
}

impl Drop for NamelistRef {
    fn drop(&mut self) {
        self.registry.unref(&self.scope_key, &self.entry);
    }
}

/// The scope-keyed table of namelist entries, one per gateway instance.
#[derive(Clone)]
pub struct NamelistRegistry {
    entries: Arc<DashMap<String, Arc<Entry>>>,
}

impl Default for NamelistRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NamelistRegistry {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Acquire a reference into `scope_key`'s namelist, installing it
    /// from `install` (an `enumerate_*` backend call, run through the
    /// worker pool) if this is the first live reference (0 -> 1
    /// transition). `install` runs at most once per transition: callers
    /// that lose the race to reserve the entry await the winner's load
    /// instead of running their own.
    pub async fn acquire<F, Fut, E>(
        &self,
        scope_key: impl Into<String>,
        install: F,
    ) -> Result<NamelistRef, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<String>, E>>,
    {
        let scope_key = scope_key.into();

        loop {
            let entry = match self.entries.entry(scope_key.clone()) {
                MapEntry::Occupied(occ) => {
                    let entry = occ.get().clone();
                    drop(occ);
                    let prev = entry
                        .refcount
                        .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    if prev == 0 {
                        // Lost a race with a concurrent `unref` that is
                        // evicting this same entry; back off and retry so we
                        // either see the eviction land (and install fresh) or
                        // see a new entry someone else already installed.
                        entry
                            .refcount
                            .fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                        continue;
                    }
                    entry
                }
                MapEntry::Vacant(vac) => {
                    let entry = Arc::new(Entry::fresh());
                    vac.insert(entry.clone());
                    entry
                }
            };

            let names_slot = &entry.names;
            let init_result = entry
                .init
                .get_or_try_init(move || async move {
                    let names = install().await?;
                    *names_slot.lock() = names.into_iter().collect();
                    Ok::<(), E>(())
                })
                .await;

            if let Err(err) = init_result {
                // The one load this acquire was waiting on (ours or someone
                // else's) failed. Release our share of the refcount so a
                // failed install doesn't pin the entry resident forever, and
                // let the next acquire retry the load from scratch.
                self.unref(&scope_key, &entry);
                return Err(err);
            }

            return Ok(NamelistRef {
                registry: self.clone(),
                scope_key,
                entry,
            });
        }
    }

    /// Number of live scope entries, for metrics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unref(&self, scope_key: &str, entry: &Arc<Entry>) {
        let prev = entry
            .refcount
            .fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        if prev == 1 {
            // We may be racing a fresh `acquire` that already reinstalled a
            // new entry under the same key; only remove if it's still ours.
            self.entries.remove_if(scope_key, |_, e| Arc::ptr_eq(e, entry));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn installs_once_and_flushes_on_zero_refcount() {
        let registry = NamelistRegistry::new();
        let install_calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        {
            let calls = install_calls.clone();
            let r1 = registry
                .acquire::<_, _, std::convert::Infallible>("user:alice", || async move {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(vec!["b1".to_string(), "b2".to_string()])
                })
                .await
                .unwrap();

            let calls2 = install_calls.clone();
            let r2 = registry
                .acquire::<_, _, std::convert::Infallible>("user:alice", || async move {
                    calls2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(vec![])
                })
                .await
                .unwrap();

            assert_eq!(install_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
            assert_eq!(r1.names(), r2.names());
            assert!(r1.contains("b1"));
        }

        assert!(registry.entries.is_empty());
    }

    #[tokio::test]
    async fn write_through_insert_is_visible_to_concurrent_ref() {
        let registry = NamelistRegistry::new();
        let r1 = registry
            .acquire::<_, _, std::convert::Infallible>("bucket:b1", || async { Ok(vec![]) })
            .await
            .unwrap();
        r1.insert("new-object");

        let r2 = registry
            .acquire::<_, _, std::convert::Infallible>("bucket:b1", || async {
                Ok(vec!["should-not-be-used".into()])
            })
            .await
            .unwrap();
        assert!(r2.contains("new-object"));
    }

    #[tokio::test]
    async fn concurrent_first_refs_install_exactly_once() {
        let registry = NamelistRegistry::new();
        let install_calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let registry = registry.clone();
            let install_calls = install_calls.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                registry
                    .acquire::<_, _, std::convert::Infallible>("user:alice", || async move {
                        install_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        Ok(vec!["b1".to_string()])
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut refs = Vec::new();
        for h in handles {
            refs.push(h.await.unwrap());
        }

        assert_eq!(install_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(refs[0].contains("b1"));
        assert!(refs[1].contains("b1"));

        // Both refs share the same backing instance: a write through one
        // is immediately visible through the other.
        refs[0].insert("b2");
        assert!(refs[1].contains("b2"));

        drop(refs);
        assert!(registry.entries.is_empty());
    }

    #[tokio::test]
    async fn reinstalls_after_full_flush() {
        let registry = NamelistRegistry::new();
        {
            let _r = registry
                .acquire::<_, _, std::convert::Infallible>("bucket:b1", || async { Ok(vec!["stale".into()]) })
                .await
                .unwrap();
        }
        let r2 = registry
            .acquire::<_, _, std::convert::Infallible>("bucket:b1", || async { Ok(vec!["fresh".into()]) })
            .await
            .unwrap();
        assert!(r2.contains("fresh"));
        assert!(!r2.contains("stale"));
    }
}
