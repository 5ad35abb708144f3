//! Shared helpers for the S3 handler modules: the Auth Gate's per-request
//! identity, the Ref-acquisition order of spec §4.3, and small
//! query-string utilities the handlers lean on to distinguish operations
//! that share one method+path.

pub mod admin;
pub mod bucket;
pub mod multipart;
pub mod object;

use md5::{Digest, Md5};

use crate::errors::GatewayError;
use crate::namelist::NamelistRef;
use crate::objectlock::ObjectGuard;
use crate::AppState;

/// The identity the Auth Gate established for one request, threaded from
/// `auth_middleware` (see [`crate::server`]) to handlers as a request
/// extension.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub access_key_id: String,
    pub display_name: String,
}

impl AuthContext {
    pub const ANONYMOUS_ID: &'static str = "anonymous";

    /// The identity used when the gateway runs in [`crate::auth::AuthMode::NoAuth`].
    pub fn anonymous() -> Self {
        Self {
            access_key_id: Self::ANONYMOUS_ID.to_string(),
            display_name: Self::ANONYMOUS_ID.to_string(),
        }
    }
}

/// `'"' + md5_hex(body) + '"'` -- the gateway's ETag format (spec §6).
pub fn quoted_md5_etag(body: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Md5::digest(body)))
}

/// Ref the caller's bucket-namelist (spec §4.3 step 1), installing it
/// from the backend (`enumerate_bucket_names`) on first reference.
pub async fn ref_user_buckets(state: &AppState, display_name: &str) -> Result<NamelistRef, GatewayError> {
    let owner = display_name.to_string();
    let worker = state.worker.clone();
    state
        .namelists
        .acquire(AppState::user_scope(display_name), move || async move {
            worker
                .run(move |backend| backend.enumerate_bucket_names(&owner))
                .await
                .map_err(GatewayError::from_backend)
        })
        .await
}

/// Ref a bucket's object-namelist (spec §4.3 step 2), installing it from
/// the backend (`enumerate_object_names`) on first reference.
pub async fn ref_bucket_objects(state: &AppState, bucket: &str) -> Result<NamelistRef, GatewayError> {
    let bucket_owned = bucket.to_string();
    let worker = state.worker.clone();
    state
        .namelists
        .acquire(AppState::bucket_scope(bucket), move || async move {
            worker
                .run(move |backend| backend.enumerate_object_names(&bucket_owned))
                .await
                .map_err(GatewayError::from_backend)
        })
        .await
}

/// Acquire the per-object mutex for `bucket+object` (spec §4.3 step 3).
pub async fn lock_object(state: &AppState, bucket: &str, object: &str) -> ObjectGuard {
    state.locks.acquire(bucket, object).await
}

/// Ref both the caller's bucket-namelist and, if the bucket is known to
/// the caller, that bucket's object-namelist (spec §4.3 steps 1-2).
/// Object-level handlers hold both refs for the request's duration and
/// release them in reverse order on drop.
pub async fn ref_owned_bucket_objects(
    state: &AppState,
    display_name: &str,
    bucket: &str,
) -> Result<(NamelistRef, NamelistRef), GatewayError> {
    let user_buckets = ref_user_buckets(state, display_name).await?;
    if !user_buckets.contains(bucket) {
        return Err(GatewayError::NoSuchBucket {
            bucket: bucket.to_string(),
        });
    }
    let bucket_objects = ref_bucket_objects(state, bucket).await?;
    Ok((user_buckets, bucket_objects))
}

// -- Query-string helpers ------------------------------------------------

/// True if the raw query string carries `key`, with or without a
/// `=value` suffix (e.g. both `?uploads` and `?uploads=`).
pub fn has_query_key(query: Option<&str>, key: &str) -> bool {
    query_param_raw(query, key).is_some()
}

/// The value bound to `key` in the raw query string, if present.
/// A bare key with no `=` (`?uploads`) yields `Some("")`.
pub fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    query_param_raw(query, key).map(|v| v.to_string())
}

fn query_param_raw<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    let query = query?;
    query.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let k = parts.next()?;
        if k == key {
            Some(parts.next().unwrap_or(""))
        } else {
            None
        }
    })
}

/// Strip exactly one trailing `/` from an object key (spec §4.3's
/// path-parsing rule).
pub fn strip_trailing_slash(key: &str) -> &str {
    key.strip_suffix('/').unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_helpers_read_value_and_bare_keys() {
        assert_eq!(query_param(Some("uploadId=abc&x=1"), "uploadId").as_deref(), Some("abc"));
        assert!(has_query_key(Some("uploads"), "uploads"));
        assert!(!has_query_key(Some("uploads"), "uploadId"));
        assert!(!has_query_key(None, "uploads"));
    }

    #[test]
    fn strip_trailing_slash_removes_one_slash_only() {
        assert_eq!(strip_trailing_slash("dir/"), "dir");
        assert_eq!(strip_trailing_slash("dir"), "dir");
    }

    #[test]
    fn etag_matches_known_md5_vector() {
        assert_eq!(quoted_md5_etag(b"hello"), "\"5d41402abc4b2a76b9719d911017c592\"");
    }
}
