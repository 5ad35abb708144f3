//! Bucket-level S3 API handlers (spec §4.5): `ListBuckets`, `PutBucket`,
//! `DeleteBucket`, `HeadBucket`, `ListObjects`. The bucket-level `GET`
//! route also fans out to `ListMultipartUploads` (see
//! [`crate::handlers::multipart`]) when the query string carries `uploads`.

use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;

use super::{has_query_key, ref_owned_bucket_objects, ref_user_buckets, AuthContext};
use crate::errors::GatewayError;
use crate::xml::{self, ObjectEntry};
use crate::AppState;

// -- Bucket name validation ---------------------------------------------------

/// Validate that a bucket name conforms to S3 naming rules (spec §4.11):
/// 3-63 characters, lowercase letters/digits/hyphens/periods, must begin
/// and end with a letter or digit, must not look like an IPv4 literal,
/// and must not carry the `xn--`/`-s3alias`/`--ol-s3` reserved affixes.
pub fn validate_bucket_name(name: &str) -> Result<(), GatewayError> {
    let invalid = || GatewayError::InvalidBucketName { name: name.to_string() };
    let len = name.len();

    if !(3..=63).contains(&len) {
        return Err(invalid());
    }

    for ch in name.chars() {
        if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() && ch != '-' && ch != '.' {
            return Err(invalid());
        }
    }

    let first = name.chars().next().unwrap();
    let last = name.chars().last().unwrap();
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return Err(invalid());
    }
    if !(last.is_ascii_lowercase() || last.is_ascii_digit()) {
        return Err(invalid());
    }

    if looks_like_ip(name) {
        return Err(invalid());
    }

    if name.starts_with("xn--") {
        return Err(invalid());
    }

    if name.ends_with("-s3alias") || name.ends_with("--ol-s3") {
        return Err(invalid());
    }

    Ok(())
}

/// Check whether a string looks like an IPv4 address (e.g. "192.168.5.4").
fn looks_like_ip(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|p| p.parse::<u8>().is_ok())
}

// -- ListBuckets ---------------------------------------------------------

/// `GET /` -- list the caller's buckets (spec §4.5).
pub async fn list_buckets(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Response, GatewayError> {
    let user_buckets = ref_user_buckets(&state, &auth.display_name).await?;
    let names = user_buckets.names();

    let mut rows: Vec<(String, String)> = Vec::with_capacity(names.len());
    for name in &names {
        let name = name.clone();
        let worker = state.worker.clone();
        let info = worker
            .run({
                let name = name.clone();
                move |backend| backend.get_bucket(&name)
            })
            .await;
        match info {
            Ok(info) => rows.push((name, httpdate::fmt_http_date(info.created))),
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(GatewayError::from_backend(e)),
        }
    }

    let refs: Vec<(&str, &str)> = rows.iter().map(|(n, d)| (n.as_str(), d.as_str())).collect();
    let body = xml::render_list_buckets_result(&auth.access_key_id, &auth.display_name, &refs);

    Ok((StatusCode::OK, [("content-type", "application/xml")], body).into_response())
}

// -- PutBucket -------------------------------------------------------------

/// `PUT /{bucket}` (spec §4.5). Enforces global bucket-name uniqueness by
/// Ref-ing every known user's bucket-namelist in turn (Open Question #1:
/// any backend failure while doing so aborts with `500` before
/// `AddBucket` is ever called).
pub async fn put(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(bucket): Path<String>,
) -> Result<Response, GatewayError> {
    validate_bucket_name(&bucket)?;

    let user_buckets = ref_user_buckets(&state, &auth.display_name).await?;
    if user_buckets.contains(&bucket) {
        return Err(GatewayError::BucketAlreadyOwnedByYou { bucket });
    }

    let users = state
        .worker
        .run(|backend| backend.list_users())
        .await
        .map_err(GatewayError::from_backend)?;

    for user in users {
        if user.display_name == auth.display_name {
            continue;
        }
        let other = ref_user_buckets(&state, &user.display_name).await?;
        let collides = other.contains(&bucket);
        drop(other);
        if collides {
            return Err(GatewayError::BucketAlreadyExists { bucket });
        }
    }

    state
        .worker
        .run({
            let owner = auth.display_name.clone();
            let bucket = bucket.clone();
            move |backend| backend.add_bucket(&owner, &bucket)
        })
        .await
        .map_err(GatewayError::from_backend)?;

    user_buckets.insert(bucket);

    Ok(StatusCode::OK.into_response())
}

// -- DeleteBucket -----------------------------------------------------------

/// `DELETE /{bucket}` (spec §4.5).
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(bucket): Path<String>,
) -> Result<Response, GatewayError> {
    let (user_buckets, bucket_objects) = ref_owned_bucket_objects(&state, &auth.display_name, &bucket).await?;
    if !bucket_objects.names().is_empty() {
        return Err(GatewayError::BucketNotEmpty { bucket });
    }

    state
        .worker
        .run({
            let bucket = bucket.clone();
            move |backend| backend.del_bucket(&bucket)
        })
        .await
        .map_err(GatewayError::from_backend)?;

    user_buckets.remove(&bucket);

    Ok(StatusCode::NO_CONTENT.into_response())
}

// -- HeadBucket --------------------------------------------------------------

/// `HEAD /{bucket}` (spec §4.5).
pub async fn head(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(bucket): Path<String>,
) -> Result<Response, GatewayError> {
    let user_buckets = ref_user_buckets(&state, &auth.display_name).await?;
    if user_buckets.contains(&bucket) {
        Ok(StatusCode::OK.into_response())
    } else {
        Ok(StatusCode::NOT_FOUND.into_response())
    }
}

// -- ListObjects -------------------------------------------------------------

/// Default `max-keys` echoed back in `ListBucketResult` when the caller
/// doesn't supply one (spec §4.6).
const DEFAULT_MAX_KEYS: u32 = 1000;

/// `GET /{bucket}` without `uploads` in the query string (spec §4.6).
/// Pagination parameters are accepted and echoed back but not applied
/// (Open Question #3): the response always carries every name currently
/// in the bucket's object-namelist with `IsTruncated=false`.
async fn list_objects(
    state: Arc<AppState>,
    auth: AuthContext,
    bucket: String,
    query: Option<String>,
) -> Result<Response, GatewayError> {
    let (_user_buckets, bucket_objects) = ref_owned_bucket_objects(&state, &auth.display_name, &bucket).await?;
    let names = bucket_objects.names();

    let prefix = super::query_param(query.as_deref(), "prefix").unwrap_or_default();
    let marker = super::query_param(query.as_deref(), "marker").unwrap_or_default();
    let max_keys: u32 = super::query_param(query.as_deref(), "max-keys")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_KEYS);

    let mut rows = Vec::new();
    for name in names.iter().filter(|n| n.starts_with(&prefix) && !crate::multipart::is_shadow_name(n)) {
        let worker = state.worker.clone();
        let result = worker
            .run({
                let bucket = bucket.clone();
                let name = name.clone();
                move |backend| backend.get_object(&bucket, &name, false)
            })
            .await;
        match result {
            Ok((info, _)) => rows.push((name.clone(), httpdate::fmt_http_date(info.created), info.etag, info.size, info.storage_class)),
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(GatewayError::from_backend(e)),
        }
    }

    let entries: Vec<ObjectEntry<'_>> = rows
        .iter()
        .map(|(key, last_modified, etag, size, storage_class)| ObjectEntry {
            key,
            last_modified,
            etag,
            size: *size,
            storage_class,
        })
        .collect();

    let body = xml::render_list_objects_result(&bucket, &prefix, &marker, max_keys, &entries);
    Ok((StatusCode::OK, [("content-type", "application/xml")], body).into_response())
}

// -- Method dispatch -----------------------------------------------------

/// `GET /{bucket}`: fans out to `ListObjects` or, when `uploads` is
/// present in the query string, `ListMultipartUploads` (spec §4.3).
pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(bucket): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response, GatewayError> {
    if has_query_key(query.as_deref(), "uploads") {
        crate::handlers::multipart::list_multipart_uploads(state, auth, bucket, query).await
    } else {
        list_objects(state, auth, bucket, query).await
    }
}

/// Any bucket-level method not in spec §4.3's classification table.
pub async fn not_implemented() -> Result<Response, GatewayError> {
    Err(GatewayError::NotImplemented)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_names() {
        assert!(validate_bucket_name("my-bucket.01").is_ok());
    }

    #[test]
    fn rejects_too_short_and_too_long() {
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn rejects_uppercase_and_underscore() {
        assert!(validate_bucket_name("Bad_Name").is_err());
    }

    #[test]
    fn rejects_ip_literal_names() {
        assert!(validate_bucket_name("192.168.5.4").is_err());
    }

    #[test]
    fn rejects_reserved_affixes() {
        assert!(validate_bucket_name("xn--foo-bar").is_err());
        assert!(validate_bucket_name("my-bucket-s3alias").is_err());
    }
}
