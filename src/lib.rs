//! s3gw — the request-dispatch and consistency layer of an S3-compatible
//! object storage gateway.
//!
//! This crate sits in front of a pluggable backend store (see
//! [`backend`]): it decodes S3 HTTP requests, maintains the ref-counted
//! namelist caches and per-object mutex registry that keep repeated
//! listings and concurrent writes cheap and correct, and drives the
//! multipart-upload state machine. The backend store and lock
//! coordination store it talks to are external collaborators; this
//! crate ships one in-memory reference backend ([`backend::memory`]) so
//! it builds, runs, and is testable standalone.

use std::sync::Arc;

pub mod auth;
pub mod backend;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod multipart;
pub mod namelist;
pub mod objectlock;
pub mod server;
pub mod worker;
pub mod xml;

use crate::auth::AuthMode;
use crate::backend::BackendFactory;
use crate::config::Config;
use crate::namelist::NamelistRegistry;
use crate::objectlock::LockRegistry;
use crate::worker::WorkerPool;

/// Shared application state passed to all handlers via `axum::extract::State`.
///
/// Deliberately instantiable rather than a process-wide singleton, so
/// tests can stand up multiple independent gateways in one process
/// (spec §9's design note on testability).
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// The worker runtime: dispatches backend calls onto the blocking
    /// pool, one exclusive handle per pool thread.
    pub worker: WorkerPool,
    /// Ref-counted namelist cache registry (spec §4.1).
    pub namelists: NamelistRegistry,
    /// Per-object mutex registry (spec §4.2).
    pub locks: LockRegistry,
    /// How strictly the Auth Gate enforces identity (spec §4.4).
    pub auth_mode: AuthMode,
}

impl AppState {
    pub fn new(config: Config, backend_factory: Arc<dyn BackendFactory>, auth_mode: AuthMode) -> Arc<Self> {
        Arc::new(Self {
            config,
            worker: WorkerPool::new(backend_factory),
            namelists: NamelistRegistry::new(),
            locks: LockRegistry::new(),
            auth_mode,
        })
    }

    /// Namelist scope key for a user's bucket list.
    pub fn user_scope(owner_display_name: &str) -> String {
        format!("user:{owner_display_name}")
    }

    /// Namelist scope key for a bucket's object list.
    pub fn bucket_scope(bucket: &str) -> String {
        format!("bucket:{bucket}")
    }
}
