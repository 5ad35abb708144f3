//! The backend store contract.
//!
//! Everything in this module is, per the gateway's own design, an
//! *external collaborator*: the durable store for users, buckets, objects,
//! and multipart parts. The gateway's request-dispatch and consistency
//! layer (namelist cache, per-object mutex registry, multipart state
//! machine) only ever talks to the backend through the [`Backend`] trait.
//!
//! Calls are synchronous (`fn`, not `async fn`) on purpose: the worker
//! runtime (see [`crate::worker`]) dispatches every backend call onto a
//! dedicated blocking thread, so a slow backend blocks only that worker,
//! never the async reactor driving the HTTP layer.

pub mod memory;

use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;
use thiserror::Error;

/// One access-key / secret-key pair belonging to a [`User`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKeyPair {
    pub access_key: String,
    pub secret_key: String,
}

/// A registered user identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub display_name: String,
    pub credentials: Vec<AccessKeyPair>,
}

impl User {
    /// The primary (first) access key for this user, used as the
    /// canonical owner id in responses.
    pub fn primary_access_key(&self) -> Option<&str> {
        self.credentials.first().map(|c| c.access_key.as_str())
    }
}

/// Bucket metadata as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    pub name: String,
    pub owner_display_name: String,
    pub created: SystemTime,
}

/// Per-object metadata, independent of content bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub created: SystemTime,
    /// Quoted hex-MD5 ETag, e.g. `"d41d8cd98f00b204e9800998ecf8427e"`.
    pub etag: String,
    pub size: u64,
    pub storage_class: String,
    pub owner_display_name: String,
}

impl ObjectInfo {
    /// A zero-size placeholder used when a multipart upload is initiated;
    /// the shadow object carries this until `CompleteMultiUpload`.
    pub fn zero_size_placeholder(owner_display_name: impl Into<String>) -> Self {
        ObjectInfo {
            created: SystemTime::now(),
            etag: "\"d41d8cd98f00b204e9800998ecf8427e\"".to_string(),
            size: 0,
            storage_class: "STANDARD".to_string(),
            owner_display_name: owner_display_name.into(),
        }
    }
}

/// A single uploaded part of an in-progress multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    pub part_number: u32,
    pub etag: String,
    pub size: u64,
    pub last_modified: SystemTime,
}

/// Backend call outcome classification, mirrored 1:1 from spec §6's
/// `ok` / `NotFound` / `IOError` distinctions.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not found")]
    NotFound,
    #[error("duplicate")]
    AlreadyExists,
    #[error("backend io error: {0}")]
    IoError(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound)
    }
}

/// Configuration required to open a backend connection, per spec §6:
/// metadata endpoints, coordination-store endpoint, namespace/table name,
/// a per-thread-unique lock name, a lock TTL, and optional credentials.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// `zp_meta_ip_ports` — metadata/table-store endpoint(s).
    pub meta_ip_ports: String,
    /// `zp_table_name` — namespace/table name.
    pub table_name: String,
    /// `redis_ip_port` — coordination (lock registry) store endpoint.
    pub lock_registry_ip_port: String,
    /// `redis_passwd` — optional coordination-store credential.
    pub lock_registry_password: String,
    /// Lock TTL in seconds (~10s per spec).
    pub lock_ttl_seconds: u64,
    /// This gateway process's own host:port, used to build the
    /// per-thread-unique lock name `host + port + thread_seq`.
    pub self_host_port: String,
}

/// Opens backend handles. One [`Backend`] handle is opened per worker
/// thread and reused for that thread's lifetime (see [`crate::worker`]);
/// handles are never shared across threads.
pub trait BackendFactory: Send + Sync + 'static {
    /// Open a new handle. `thread_seq` is a process-wide monotonic counter
    /// used to build the handle's unique lock name
    /// (`host + port + thread_seq`, per spec §6).
    fn open(&self, thread_seq: u64) -> Result<Box<dyn Backend>, BackendError>;
}

impl fmt::Debug for dyn BackendFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BackendFactory")
    }
}

/// The backend store contract consumed by the gateway (spec §6).
///
/// A `Backend` handle is exclusive to the worker thread that opened it;
/// implementations may assume single-threaded, non-reentrant use.
pub trait Backend: Send + 'static {
    // -- Users -----------------------------------------------------------

    fn add_user(&self, display_name: &str) -> Result<User, BackendError>;
    fn get_user(&self, access_key: &str) -> Result<User, BackendError>;
    fn list_users(&self) -> Result<Vec<User>, BackendError>;

    // -- Buckets -----------------------------------------------------------

    fn add_bucket(&self, owner_display_name: &str, bucket: &str) -> Result<(), BackendError>;
    fn get_bucket(&self, bucket: &str) -> Result<BucketInfo, BackendError>;
    fn del_bucket(&self, bucket: &str) -> Result<(), BackendError>;

    /// Enumerate bucket names owned by a user. Used to install a
    /// user-scoped namelist on first `Ref`. `PutBucket`'s global-uniqueness
    /// check calls this once per known user (spec §4.5), Ref-ing each
    /// user's bucket-namelist in turn rather than a single aggregate query.
    fn enumerate_bucket_names(&self, owner_display_name: &str) -> Result<Vec<String>, BackendError>;

    // -- Objects -----------------------------------------------------------

    fn add_object(
        &self,
        bucket: &str,
        object: &str,
        info: ObjectInfo,
        content: Bytes,
    ) -> Result<(), BackendError>;

    /// `need_content = false` avoids reading bytes off the wire/disk; the
    /// returned content is `None` in that case.
    fn get_object(
        &self,
        bucket: &str,
        object: &str,
        need_content: bool,
    ) -> Result<(ObjectInfo, Option<Bytes>), BackendError>;

    fn del_object(&self, bucket: &str, object: &str) -> Result<(), BackendError>;

    /// Enumerate object names in a bucket. Used to install a
    /// bucket-scoped namelist on first `Ref`.
    fn enumerate_object_names(&self, bucket: &str) -> Result<Vec<String>, BackendError>;

    // -- Multipart parts -----------------------------------------------------

    fn upload_part(
        &self,
        bucket: &str,
        shadow_object: &str,
        part_number: u32,
        content: Bytes,
    ) -> Result<PartInfo, BackendError>;

    fn list_parts(&self, bucket: &str, shadow_object: &str) -> Result<Vec<PartInfo>, BackendError>;

    /// Promote a shadow object into its final object name (derived by
    /// stripping the `"__"` prefix and the trailing 32-hex-char
    /// `upload_id` from `shadow_object`), concatenating uploaded parts in
    /// part-number order into the final content. Deletes the shadow
    /// object and its parts on success.
    fn complete_multi_upload(
        &self,
        bucket: &str,
        shadow_object: &str,
    ) -> Result<ObjectInfo, BackendError>;
}
