//! Worker runtime: one exclusive backend handle per blocking-pool thread.
//!
//! The gateway's worker model (spec §2.7, §5) requires that every worker
//! own one backend connection for its whole lifetime, never shared with
//! another worker, and that backend calls block that worker rather than
//! cooperatively yielding. Rather than hand-roll an OS thread pool, this
//! dispatches onto tokio's own blocking-thread pool
//! (`tokio::task::spawn_blocking`), sized via `max_blocking_threads` (see
//! [`crate::config`]), and caches one `Box<dyn Backend>` per pool thread
//! in a `thread_local!` slot, opened lazily the first time a job lands on
//! that thread. Because tokio reuses blocking-pool threads across jobs,
//! the handle persists for the thread's lifetime exactly as spec'd.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::{Backend, BackendError, BackendFactory};

thread_local! {
    static BACKEND_HANDLE: RefCell<Option<Box<dyn Backend>>> = const { RefCell::new(None) };
}

/// Dispatches backend calls onto tokio's blocking-thread pool, handing
/// each job the calling thread's cached [`Backend`] handle.
#[derive(Clone)]
pub struct WorkerPool {
    factory: Arc<dyn BackendFactory>,
    thread_seq: Arc<AtomicU64>,
}

impl WorkerPool {
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            thread_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `job` on a blocking-pool thread against that thread's cached
    /// backend handle, opening one if this thread hasn't handled a job
    /// yet.
    pub async fn run<F, T>(&self, job: F) -> Result<T, BackendError>
    where
        F: FnOnce(&dyn Backend) -> Result<T, BackendError> + Send + 'static,
        T: Send + 'static,
    {
        let factory = self.factory.clone();
        let thread_seq = self.thread_seq.clone();

        match tokio::task::spawn_blocking(move || {
            BACKEND_HANDLE.with(|slot| {
                let mut slot = slot.borrow_mut();
                if slot.is_none() {
                    let seq = thread_seq.fetch_add(1, Ordering::SeqCst);
                    let handle = factory.open(seq)?;
                    *slot = Some(handle);
                }
                let backend = slot.as_deref().expect("just populated above");
                job(backend)
            })
        })
        .await
        {
            Ok(result) => result,
            Err(join_err) => Err(BackendError::IoError(format!(
                "worker thread panicked: {join_err}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackendFactory;
    use crate::backend::BackendConfig;

    fn pool() -> WorkerPool {
        let factory = MemoryBackendFactory::new(BackendConfig {
            meta_ip_ports: String::new(),
            table_name: String::new(),
            lock_registry_ip_port: String::new(),
            lock_registry_password: String::new(),
            lock_ttl_seconds: 10,
            self_host_port: "test:0".to_string(),
        });
        WorkerPool::new(Arc::new(factory))
    }

    #[tokio::test]
    async fn run_dispatches_to_a_cached_handle() {
        let pool = pool();
        pool.run(|backend| backend.add_user("alice").map(|_| ()))
            .await
            .unwrap();

        let users = pool.run(|backend| backend.list_users()).await.unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_jobs_all_observe_the_shared_store() {
        let pool = pool();
        let mut handles = Vec::new();
        for i in 0..16 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.run(move |backend| backend.add_user(&format!("user-{i}")).map(|_| ()))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let users = pool.run(|backend| backend.list_users()).await.unwrap();
        assert_eq!(users.len(), 16);
    }
}
