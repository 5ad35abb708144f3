//! Object-level S3 API handlers (spec §4.6): `PutObject`, `GetObject`
//! (including HEAD mode), `DeleteObject`. The object-level `PUT`/`GET`/
//! `DELETE`/`POST` routes also fan out to the multipart operations (see
//! [`crate::handlers::multipart`]) based on `partNumber`/`uploadId`/
//! `uploads` query hints (spec §4.3).

use std::sync::Arc;
use std::time::SystemTime;

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;

use super::{has_query_key, lock_object, quoted_md5_etag, ref_owned_bucket_objects, strip_trailing_slash, AuthContext};
use crate::backend::ObjectInfo;
use crate::errors::GatewayError;
use crate::AppState;

// -- PutObject / UploadPart dispatch -----------------------------------

/// `PUT /{bucket}/{key}`: fans out to `UploadPart` when the query
/// string carries both `partNumber` and `uploadId`, else `PutObject`.
pub async fn put(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let key = strip_trailing_slash(&key).to_string();

    if has_query_key(query.as_deref(), "partNumber") && has_query_key(query.as_deref(), "uploadId") {
        return crate::handlers::multipart::upload_part(state, auth, bucket, key, query, body).await;
    }

    put_object(state, auth, bucket, key, body).await
}

async fn put_object(
    state: Arc<AppState>,
    auth: AuthContext,
    bucket: String,
    key: String,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let (_user_buckets, bucket_objects) = ref_owned_bucket_objects(&state, &auth.display_name, &bucket).await?;
    let _guard = lock_object(&state, &bucket, &key).await;

    let etag = quoted_md5_etag(&body);
    let info = ObjectInfo {
        created: SystemTime::now(),
        etag: etag.clone(),
        size: body.len() as u64,
        storage_class: "STANDARD".to_string(),
        owner_display_name: auth.display_name.clone(),
    };

    state
        .worker
        .run({
            let bucket = bucket.clone();
            let key = key.clone();
            move |backend| backend.add_object(&bucket, &key, info, body)
        })
        .await
        .map_err(GatewayError::from_backend)?;

    bucket_objects.insert(key);

    Ok((StatusCode::OK, [("etag", etag)]).into_response())
}

// -- GetObject / ListParts dispatch -------------------------------------

/// `GET /{bucket}/{key}`: fans out to `ListParts` when `uploadId` is
/// present, else `GetObject`.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Result<Response, GatewayError> {
    let key = strip_trailing_slash(&key).to_string();

    if has_query_key(query.as_deref(), "uploadId") {
        return crate::handlers::multipart::list_parts(state, auth, bucket, key, query).await;
    }

    get_or_head(state, auth, bucket, key, false).await
}

/// `HEAD /{bucket}/{key}`: `GetObject` in head mode (spec §4.6). Per
/// Open Question #2, the body is always empty regardless of whether the
/// backend fetch actually reads content.
pub async fn head(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, GatewayError> {
    let key = strip_trailing_slash(&key).to_string();
    get_or_head(state, auth, bucket, key, true).await
}

async fn get_or_head(
    state: Arc<AppState>,
    auth: AuthContext,
    bucket: String,
    key: String,
    head_mode: bool,
) -> Result<Response, GatewayError> {
    let (_user_buckets, bucket_objects) = ref_owned_bucket_objects(&state, &auth.display_name, &bucket).await?;
    if !bucket_objects.contains(&key) {
        return Err(GatewayError::NoSuchKey { key });
    }

    let need_content = !head_mode;
    let (info, content) = state
        .worker
        .run({
            let bucket = bucket.clone();
            let key = key.clone();
            move |backend| backend.get_object(&bucket, &key, need_content)
        })
        .await
        .map_err(GatewayError::from_backend)?;

    let body = if head_mode { Bytes::new() } else { content.unwrap_or_default() };

    Ok((
        StatusCode::OK,
        [
            ("etag", info.etag),
            ("last-modified", httpdate::fmt_http_date(info.created)),
            ("content-length", body.len().to_string()),
        ],
        body,
    )
        .into_response())
}

// -- DeleteObject / AbortMultipartUpload dispatch ------------------------

/// `DELETE /{bucket}/{key}`: fans out to `AbortMultipartUpload` when
/// `uploadId` is present, else `DeleteObject`.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Result<Response, GatewayError> {
    let key = strip_trailing_slash(&key).to_string();

    if has_query_key(query.as_deref(), "uploadId") {
        return crate::handlers::multipart::abort_multipart_upload(state, auth, bucket, key, query).await;
    }

    delete_object(state, auth, bucket, key).await
}

async fn delete_object(
    state: Arc<AppState>,
    auth: AuthContext,
    bucket: String,
    key: String,
) -> Result<Response, GatewayError> {
    let (_user_buckets, bucket_objects) = ref_owned_bucket_objects(&state, &auth.display_name, &bucket).await?;
    if !bucket_objects.contains(&key) {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let _guard = lock_object(&state, &bucket, &key).await;

    let result = state
        .worker
        .run({
            let bucket = bucket.clone();
            let key = key.clone();
            move |backend| backend.del_object(&bucket, &key)
        })
        .await;

    match result {
        Ok(()) => {
            bucket_objects.remove(&key);
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Err(e) if e.is_not_found() => {
            bucket_objects.remove(&key);
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Err(e) => Err(GatewayError::from_backend(e)),
    }
}

// -- InitiateMultipartUpload / CompleteMultipartUpload dispatch -----------

/// `POST /{bucket}/{key}`: fans out to `InitiateMultipartUpload`
/// (`uploads`) or `CompleteMultipartUpload` (`uploadId`).
pub async fn post(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Result<Response, GatewayError> {
    let key = strip_trailing_slash(&key).to_string();

    if has_query_key(query.as_deref(), "uploads") {
        crate::handlers::multipart::initiate_multipart_upload(state, auth, bucket, key).await
    } else if has_query_key(query.as_deref(), "uploadId") {
        crate::handlers::multipart::complete_multipart_upload(state, auth, bucket, key, query).await
    } else {
        Err(GatewayError::NotImplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthMode;
    use crate::backend::memory::MemoryBackendFactory;
    use crate::backend::BackendConfig;
    use crate::config::Config;
    use crate::handlers::ref_user_buckets;

    async fn test_state() -> (Arc<AppState>, AuthContext) {
        let factory = MemoryBackendFactory::new(BackendConfig {
            meta_ip_ports: String::new(),
            table_name: String::new(),
            lock_registry_ip_port: String::new(),
            lock_registry_password: String::new(),
            lock_ttl_seconds: 10,
            self_host_port: "test:0".to_string(),
        });
        let state = AppState::new(Config::default(), Arc::new(factory), AuthMode::NoAuth);
        state.worker.run(|b| b.add_user("alice").map(|_| ())).await.unwrap();
        let auth = AuthContext {
            access_key_id: "alice-key".to_string(),
            display_name: "alice".to_string(),
        };

        let user_buckets = ref_user_buckets(&state, &auth.display_name).await.unwrap();
        state.worker.run(|b| b.add_bucket("alice", "b1")).await.unwrap();
        user_buckets.insert("b1");
        drop(user_buckets);

        (state, auth)
    }

    #[tokio::test]
    async fn put_then_get_round_trips_body_and_etag() {
        let (state, auth) = test_state().await;
        let put_resp = put_object(state.clone(), auth.clone(), "b1".to_string(), "key".to_string(), Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(put_resp.status(), StatusCode::OK);
        assert_eq!(
            put_resp.headers().get("etag").unwrap(),
            "\"5d41402abc4b2a76b9719d911017c592\""
        );

        let get_resp = get_or_head(state, auth, "b1".to_string(), "key".to_string(), false)
            .await
            .unwrap();
        assert_eq!(get_resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn head_mode_never_returns_a_body() {
        let (state, auth) = test_state().await;
        put_object(state.clone(), auth.clone(), "b1".to_string(), "key".to_string(), Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let resp = get_or_head(state, auth, "b1".to_string(), "key".to_string(), true)
            .await
            .unwrap();
        assert_eq!(resp.headers().get("content-length").unwrap(), "0");
    }

    #[tokio::test]
    async fn get_missing_object_is_404() {
        let (state, auth) = test_state().await;
        let err = get_or_head(state, auth, "b1".to_string(), "missing".to_string(), false)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_is_idempotent_on_missing_object() {
        let (state, auth) = test_state().await;
        let resp = delete_object(state, auth, "b1".to_string(), "missing".to_string()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn delete_then_get_is_404() {
        let (state, auth) = test_state().await;
        put_object(state.clone(), auth.clone(), "b1".to_string(), "key".to_string(), Bytes::from_static(b"hello"))
            .await
            .unwrap();
        let del_resp = delete_object(state.clone(), auth.clone(), "b1".to_string(), "key".to_string())
            .await
            .unwrap();
        assert_eq!(del_resp.status(), StatusCode::NO_CONTENT);

        let err = get_or_head(state, auth, "b1".to_string(), "key".to_string(), false)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn operating_on_unowned_bucket_is_no_such_bucket() {
        let (state, auth) = test_state().await;
        let err = get_or_head(state, auth, "nope".to_string(), "key".to_string(), false)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "NoSuchBucket");
    }
}
