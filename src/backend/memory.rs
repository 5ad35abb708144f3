//! Reference in-memory [`Backend`] implementation.
//!
//! This is the one bundled backend implementation: a process-local store
//! with no durability, useful for development and for exercising the
//! gateway's dispatch/consistency layer in tests. A production deployment
//! would swap this for a handle that dials the real metadata/table store
//! and coordination store named in [`BackendConfig`]; those endpoints are
//! accepted and threaded through but unused here (see SPEC_FULL.md §6).
//!
//! Modeled on the teacher crate's `metadata/memory.rs` (`RwLock<HashMap>`
//! maps, one map per entity) and `storage/local.rs` (MD5 content
//! hashing for ETags), merged into a single store because this gateway's
//! backend contract is one trait, not a split metadata/storage pair.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use bytes::Bytes;
use md5::{Digest, Md5};
use rand::Rng;

use super::{
    AccessKeyPair, Backend, BackendConfig, BackendError, BackendFactory, BucketInfo, ObjectInfo,
    PartInfo, User,
};
use crate::multipart;

#[derive(Debug, Clone)]
struct UserRecord {
    display_name: String,
    secret_key: String,
}

#[derive(Debug, Clone)]
struct BucketRecord {
    owner_display_name: String,
    created: SystemTime,
}

#[derive(Debug, Clone)]
struct ObjectRecord {
    info: ObjectInfo,
    content: Bytes,
}

#[derive(Debug, Default)]
struct Inner {
    /// access_key -> user record
    users: HashMap<String, UserRecord>,
    /// bucket name -> record
    buckets: HashMap<String, BucketRecord>,
    /// (bucket, object) -> record
    objects: HashMap<(String, String), ObjectRecord>,
    /// (bucket, shadow_object) -> parts, keyed by part_number
    parts: HashMap<(String, String), HashMap<u32, (PartInfo, Bytes)>>,
}

/// The shared, durable(-for-the-process) store behind every handle.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// Opens [`MemoryStoreHandle`]s against a shared [`MemoryStore`].
///
/// Mirrors a real `BackendFactory`: each `open()` call conceptually opens
/// a fresh connection (here, just a cheap `Arc` clone) against the same
/// durable store, so every worker thread gets its own handle while all
/// handles observe the same data.
pub struct MemoryBackendFactory {
    store: Arc<MemoryStore>,
    #[allow(dead_code)]
    config: BackendConfig,
}

impl MemoryBackendFactory {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            store: MemoryStore::new(),
            config,
        }
    }
}

impl BackendFactory for MemoryBackendFactory {
    fn open(&self, thread_seq: u64) -> Result<Box<dyn Backend>, BackendError> {
        Ok(Box::new(MemoryStoreHandle {
            store: self.store.clone(),
            lock_name: format!("{}-{}", self.config.self_host_port, thread_seq),
        }))
    }
}

/// One worker thread's exclusive handle onto the shared [`MemoryStore`].
pub struct MemoryStoreHandle {
    store: Arc<MemoryStore>,
    /// Unique per-thread lock name (`host + port + thread_seq`), carried
    /// for parity with a real backend's lock-registry handshake; unused
    /// by this in-memory implementation since there is nothing to
    /// coordinate across processes.
    #[allow(dead_code)]
    lock_name: String,
}

fn io_err<E: std::fmt::Display>(e: E) -> BackendError {
    BackendError::IoError(e.to_string())
}

fn etag_for(content: &[u8]) -> String {
    let digest = Md5::digest(content);
    format!("\"{}\"", hex::encode(digest))
}

fn random_key(len: usize) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

impl Backend for MemoryStoreHandle {
    fn add_user(&self, display_name: &str) -> Result<User, BackendError> {
        let access_key = random_key(20);
        let secret_key = random_key(40);
        let mut inner = self.store.inner.write().map_err(io_err)?;
        inner.users.insert(
            access_key.clone(),
            UserRecord {
                display_name: display_name.to_string(),
                secret_key: secret_key.clone(),
            },
        );
        Ok(User {
            display_name: display_name.to_string(),
            credentials: vec![AccessKeyPair {
                access_key,
                secret_key,
            }],
        })
    }

    fn get_user(&self, access_key: &str) -> Result<User, BackendError> {
        let inner = self.store.inner.read().map_err(io_err)?;
        let record = inner.users.get(access_key).ok_or(BackendError::NotFound)?;
        Ok(User {
            display_name: record.display_name.clone(),
            credentials: vec![AccessKeyPair {
                access_key: access_key.to_string(),
                secret_key: record.secret_key.clone(),
            }],
        })
    }

    fn list_users(&self) -> Result<Vec<User>, BackendError> {
        let inner = self.store.inner.read().map_err(io_err)?;
        Ok(inner
            .users
            .iter()
            .map(|(access_key, record)| User {
                display_name: record.display_name.clone(),
                credentials: vec![AccessKeyPair {
                    access_key: access_key.clone(),
                    secret_key: record.secret_key.clone(),
                }],
            })
            .collect())
    }

    fn add_bucket(&self, owner_display_name: &str, bucket: &str) -> Result<(), BackendError> {
        let mut inner = self.store.inner.write().map_err(io_err)?;
        if inner.buckets.contains_key(bucket) {
            return Err(BackendError::AlreadyExists);
        }
        inner.buckets.insert(
            bucket.to_string(),
            BucketRecord {
                owner_display_name: owner_display_name.to_string(),
                created: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn get_bucket(&self, bucket: &str) -> Result<BucketInfo, BackendError> {
        let inner = self.store.inner.read().map_err(io_err)?;
        let record = inner.buckets.get(bucket).ok_or(BackendError::NotFound)?;
        Ok(BucketInfo {
            name: bucket.to_string(),
            owner_display_name: record.owner_display_name.clone(),
            created: record.created,
        })
    }

    fn del_bucket(&self, bucket: &str) -> Result<(), BackendError> {
        let mut inner = self.store.inner.write().map_err(io_err)?;
        if inner.buckets.remove(bucket).is_none() {
            return Err(BackendError::NotFound);
        }
        Ok(())
    }

    fn enumerate_bucket_names(&self, owner_display_name: &str) -> Result<Vec<String>, BackendError> {
        let inner = self.store.inner.read().map_err(io_err)?;
        Ok(inner
            .buckets
            .iter()
            .filter(|(_, record)| record.owner_display_name == owner_display_name)
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn add_object(
        &self,
        bucket: &str,
        object: &str,
        info: ObjectInfo,
        content: Bytes,
    ) -> Result<(), BackendError> {
        let mut inner = self.store.inner.write().map_err(io_err)?;
        if !inner.buckets.contains_key(bucket) {
            return Err(BackendError::NotFound);
        }
        inner
            .objects
            .insert((bucket.to_string(), object.to_string()), ObjectRecord { info, content });
        Ok(())
    }

    fn get_object(
        &self,
        bucket: &str,
        object: &str,
        need_content: bool,
    ) -> Result<(ObjectInfo, Option<Bytes>), BackendError> {
        let inner = self.store.inner.read().map_err(io_err)?;
        let record = inner
            .objects
            .get(&(bucket.to_string(), object.to_string()))
            .ok_or(BackendError::NotFound)?;
        let content = if need_content {
            Some(record.content.clone())
        } else {
            None
        };
        Ok((record.info.clone(), content))
    }

    fn del_object(&self, bucket: &str, object: &str) -> Result<(), BackendError> {
        let mut inner = self.store.inner.write().map_err(io_err)?;
        if inner
            .objects
            .remove(&(bucket.to_string(), object.to_string()))
            .is_none()
        {
            return Err(BackendError::NotFound);
        }
        Ok(())
    }

    fn enumerate_object_names(&self, bucket: &str) -> Result<Vec<String>, BackendError> {
        let inner = self.store.inner.read().map_err(io_err)?;
        Ok(inner
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect())
    }

    fn upload_part(
        &self,
        bucket: &str,
        shadow_object: &str,
        part_number: u32,
        content: Bytes,
    ) -> Result<PartInfo, BackendError> {
        let mut inner = self.store.inner.write().map_err(io_err)?;
        if !inner
            .objects
            .contains_key(&(bucket.to_string(), shadow_object.to_string()))
        {
            return Err(BackendError::NotFound);
        }
        let etag = etag_for(&content);
        let info = PartInfo {
            part_number,
            etag,
            size: content.len() as u64,
            last_modified: SystemTime::now(),
        };
        inner
            .parts
            .entry((bucket.to_string(), shadow_object.to_string()))
            .or_default()
            .insert(part_number, (info.clone(), content));
        Ok(info)
    }

    fn list_parts(&self, bucket: &str, shadow_object: &str) -> Result<Vec<PartInfo>, BackendError> {
        let inner = self.store.inner.read().map_err(io_err)?;
        let Some(parts) = inner.parts.get(&(bucket.to_string(), shadow_object.to_string())) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<PartInfo> = parts.values().map(|(info, _)| info.clone()).collect();
        out.sort_by_key(|p| p.part_number);
        Ok(out)
    }

    fn complete_multi_upload(
        &self,
        bucket: &str,
        shadow_object: &str,
    ) -> Result<ObjectInfo, BackendError> {
        let final_name = multipart::object_name_from_shadow(shadow_object)
            .ok_or_else(|| BackendError::IoError("malformed shadow object name".to_string()))?;

        let mut inner = self.store.inner.write().map_err(io_err)?;
        let shadow_key = (bucket.to_string(), shadow_object.to_string());
        let owner_display_name = inner
            .objects
            .get(&shadow_key)
            .ok_or(BackendError::NotFound)?
            .info
            .owner_display_name
            .clone();

        let mut parts: Vec<(u32, Bytes)> = inner
            .parts
            .remove(&shadow_key)
            .unwrap_or_default()
            .into_iter()
            .map(|(part_number, (_, bytes))| (part_number, bytes))
            .collect();
        parts.sort_by_key(|(n, _)| *n);

        let mut assembled = Vec::new();
        for (_, bytes) in &parts {
            assembled.extend_from_slice(bytes);
        }
        let assembled = Bytes::from(assembled);
        let etag = etag_for(&assembled);

        let info = ObjectInfo {
            created: SystemTime::now(),
            etag,
            size: assembled.len() as u64,
            storage_class: "STANDARD".to_string(),
            owner_display_name,
        };

        inner.objects.remove(&shadow_key);
        inner.objects.insert(
            (bucket.to_string(), final_name),
            ObjectRecord {
                info: info.clone(),
                content: assembled,
            },
        );

        Ok(info)
    }
}
