//! Multipart-upload S3 API handlers (spec §4.7): `InitiateMultipartUpload`,
//! `UploadPart`, `CompleteMultipartUpload`, `AbortMultipartUpload`,
//! `ListParts`, `ListMultipartUploads`. Every operation here is invoked
//! from the object/bucket dispatch functions in
//! [`crate::handlers::object`] and [`crate::handlers::bucket`] once
//! they've recognized the relevant query hint (spec §4.3); none of
//! these are routed directly.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::{lock_object, query_param, ref_owned_bucket_objects, AuthContext};
use crate::backend::ObjectInfo;
use crate::errors::GatewayError;
use crate::multipart::{is_shadow_name, new_upload_id, object_name_from_shadow, shadow_name, upload_id_from_shadow};
use crate::xml::{self, PartEntry, UploadEntry};
use crate::AppState;

fn require_upload_id(query: Option<&str>) -> Result<String, GatewayError> {
    query_param(query, "uploadId").ok_or_else(|| GatewayError::InvalidArgument {
        message: "missing uploadId".to_string(),
    })
}

fn no_such_upload(upload_id: String) -> GatewayError {
    GatewayError::NoSuchUpload { upload_id }
}

// -- InitiateMultipartUpload ---------------------------------------------

/// `POST /{bucket}/{key}?uploads` (spec §4.7's `absent -> initiated`
/// transition).
pub async fn initiate_multipart_upload(
    state: Arc<AppState>,
    auth: AuthContext,
    bucket: String,
    key: String,
) -> Result<Response, GatewayError> {
    let (_user_buckets, bucket_objects) = ref_owned_bucket_objects(&state, &auth.display_name, &bucket).await?;
    let _guard = lock_object(&state, &bucket, &key).await;

    let upload_id = new_upload_id(&key);
    let shadow = shadow_name(&key, &upload_id);
    let info = ObjectInfo::zero_size_placeholder(auth.display_name.clone());

    state
        .worker
        .run({
            let bucket = bucket.clone();
            let shadow = shadow.clone();
            move |backend| backend.add_object(&bucket, &shadow, info, Bytes::new())
        })
        .await
        .map_err(GatewayError::from_backend)?;

    bucket_objects.insert(shadow);

    let body = xml::render_initiate_multipart_upload_result(&bucket, &key, &upload_id);
    Ok((StatusCode::OK, [("content-type", "application/xml")], body).into_response())
}

// -- UploadPart ------------------------------------------------------------

/// `PUT /{bucket}/{key}?partNumber=N&uploadId=U` (spec §4.7's
/// `initiated -> initiated` `UploadPart` transition).
pub async fn upload_part(
    state: Arc<AppState>,
    auth: AuthContext,
    bucket: String,
    key: String,
    query: Option<String>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let upload_id = require_upload_id(query.as_deref())?;
    let part_number: u32 = query_param(query.as_deref(), "partNumber")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| GatewayError::InvalidArgument {
            message: "missing or invalid partNumber".to_string(),
        })?;

    let (_user_buckets, bucket_objects) = ref_owned_bucket_objects(&state, &auth.display_name, &bucket).await?;
    let _guard = lock_object(&state, &bucket, &key).await;

    let shadow = shadow_name(&key, &upload_id);
    if !bucket_objects.contains(&shadow) {
        return Err(no_such_upload(upload_id));
    }

    let part = state
        .worker
        .run({
            let bucket = bucket.clone();
            let shadow = shadow.clone();
            move |backend| backend.upload_part(&bucket, &shadow, part_number, body)
        })
        .await
        .map_err(GatewayError::from_backend)?;

    Ok((StatusCode::OK, [("etag", part.etag)]).into_response())
}

// -- CompleteMultipartUpload -----------------------------------------------

/// `POST /{bucket}/{key}?uploadId=U` (spec §4.7's `initiated -> completed`
/// transition).
pub async fn complete_multipart_upload(
    state: Arc<AppState>,
    auth: AuthContext,
    bucket: String,
    key: String,
    query: Option<String>,
) -> Result<Response, GatewayError> {
    let upload_id = require_upload_id(query.as_deref())?;

    let (_user_buckets, bucket_objects) = ref_owned_bucket_objects(&state, &auth.display_name, &bucket).await?;
    let _guard = lock_object(&state, &bucket, &key).await;

    let shadow = shadow_name(&key, &upload_id);
    if !bucket_objects.contains(&shadow) {
        return Err(no_such_upload(upload_id));
    }

    if bucket_objects.contains(&key) {
        let result = state
            .worker
            .run({
                let bucket = bucket.clone();
                let key = key.clone();
                move |backend| backend.del_object(&bucket, &key)
            })
            .await;
        match result {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(GatewayError::from_backend(e)),
        }
    }

    let info = state
        .worker
        .run({
            let bucket = bucket.clone();
            let shadow = shadow.clone();
            move |backend| backend.complete_multi_upload(&bucket, &shadow)
        })
        .await
        .map_err(GatewayError::from_backend)?;

    bucket_objects.remove(&shadow);
    bucket_objects.insert(key.clone());

    let location = format!("/{bucket}/{key}");
    let body = xml::render_complete_multipart_upload_result(&location, &bucket, &key, &info.etag);
    Ok((StatusCode::OK, [("content-type", "application/xml")], body).into_response())
}

// -- AbortMultipartUpload ---------------------------------------------------

/// `DELETE /{bucket}/{key}?uploadId=U` (spec §4.7's `initiated -> aborted`
/// transition).
pub async fn abort_multipart_upload(
    state: Arc<AppState>,
    auth: AuthContext,
    bucket: String,
    key: String,
    query: Option<String>,
) -> Result<Response, GatewayError> {
    let upload_id = require_upload_id(query.as_deref())?;

    let (_user_buckets, bucket_objects) = ref_owned_bucket_objects(&state, &auth.display_name, &bucket).await?;
    let _guard = lock_object(&state, &bucket, &key).await;

    let shadow = shadow_name(&key, &upload_id);
    if !bucket_objects.contains(&shadow) {
        return Err(no_such_upload(upload_id));
    }

    let result = state
        .worker
        .run({
            let bucket = bucket.clone();
            let shadow = shadow.clone();
            move |backend| backend.del_object(&bucket, &shadow)
        })
        .await;
    if let Err(e) = result {
        if !e.is_not_found() {
            return Err(GatewayError::from_backend(e));
        }
    }

    bucket_objects.remove(&shadow);
    Ok(StatusCode::NO_CONTENT.into_response())
}

// -- ListParts ---------------------------------------------------------------

/// `GET /{bucket}/{key}?uploadId=U` (spec §4.7).
pub async fn list_parts(
    state: Arc<AppState>,
    auth: AuthContext,
    bucket: String,
    key: String,
    query: Option<String>,
) -> Result<Response, GatewayError> {
    let upload_id = require_upload_id(query.as_deref())?;

    let (_user_buckets, bucket_objects) = ref_owned_bucket_objects(&state, &auth.display_name, &bucket).await?;

    let shadow = shadow_name(&key, &upload_id);
    if !bucket_objects.contains(&shadow) {
        return Err(no_such_upload(upload_id));
    }

    let parts = state
        .worker
        .run({
            let bucket = bucket.clone();
            let shadow = shadow.clone();
            move |backend| backend.list_parts(&bucket, &shadow)
        })
        .await
        .map_err(GatewayError::from_backend)?;

    let mut sorted = parts;
    sorted.sort_by_key(|p| p.part_number);

    let rendered: Vec<(u32, String, String, u64)> = sorted
        .iter()
        .map(|p| (p.part_number, httpdate::fmt_http_date(p.last_modified), p.etag.clone(), p.size))
        .collect();
    let entries: Vec<PartEntry<'_>> = rendered
        .iter()
        .map(|(part_number, last_modified, etag, size)| PartEntry {
            part_number: *part_number,
            last_modified,
            etag,
            size: *size,
        })
        .collect();

    let body = xml::render_list_parts_result(
        &bucket,
        &key,
        &upload_id,
        &entries,
        "STANDARD",
        &auth.access_key_id,
        &auth.display_name,
    );
    Ok((StatusCode::OK, [("content-type", "application/xml")], body).into_response())
}

// -- ListMultipartUploads ----------------------------------------------------

/// `GET /{bucket}?uploads` (spec §4.7's `upload_id` parsing reused for
/// listing): scans the bucket's object-namelist for shadow names and
/// decodes each into `(object_name, upload_id)`.
pub async fn list_multipart_uploads(
    state: Arc<AppState>,
    auth: AuthContext,
    bucket: String,
    _query: Option<String>,
) -> Result<Response, GatewayError> {
    let (_user_buckets, bucket_objects) = ref_owned_bucket_objects(&state, &auth.display_name, &bucket).await?;
    let names = bucket_objects.names();

    let mut rows: Vec<(String, String)> = Vec::new();
    for name in names.iter().filter(|n| is_shadow_name(n)) {
        if let (Some(object_name), Some(upload_id)) = (object_name_from_shadow(name), upload_id_from_shadow(name)) {
            rows.push((object_name, upload_id));
        }
    }
    rows.sort();

    let entries: Vec<UploadEntry<'_>> = rows
        .iter()
        .map(|(object_name, upload_id)| UploadEntry {
            key: object_name,
            upload_id,
            initiated: "",
            storage_class: "STANDARD",
            owner_id: auth.access_key_id.as_str(),
            owner_display: auth.display_name.as_str(),
        })
        .collect();

    let body = xml::render_list_multipart_uploads_result(&bucket, "", "", 1000, &entries);
    Ok((StatusCode::OK, [("content-type", "application/xml")], body).into_response())
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
    async fn full_multipart_lifecycle_composes_parts() {
        let (state, auth) = test_state().await;

        let init_resp = initiate_multipart_upload(state.clone(), auth.clone(), "b1".to_string(), "big".to_string())
            .await
            .unwrap();
        assert_eq!(init_resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(init_resp.into_body(), usize::MAX).await.unwrap();
        let xml = String::from_utf8(body.to_vec()).unwrap();
        let upload_id = xml
            .split("<UploadId>")
            .nth(1)
            .unwrap()
            .split("</UploadId>")
            .next()
            .unwrap()
            .to_string();

        let query = Some(format!("partNumber=1&uploadId={upload_id}"));
        upload_part(
            state.clone(),
            auth.clone(),
            "b1".to_string(),
            "big".to_string(),
            query,
            Bytes::from_static(b"AAA"),
        )
        .await
        .unwrap();

        let query2 = Some(format!("partNumber=2&uploadId={upload_id}"));
        upload_part(
            state.clone(),
            auth.clone(),
            "b1".to_string(),
            "big".to_string(),
            query2,
            Bytes::from_static(b"BBB"),
        )
        .await
        .unwrap();

        let complete_query = Some(format!("uploadId={upload_id}"));
        let complete_resp = complete_multipart_upload(state.clone(), auth.clone(), "b1".to_string(), "big".to_string(), complete_query)
            .await
            .unwrap();
        assert_eq!(complete_resp.status(), StatusCode::OK);

        let (_, bucket_objects) = ref_owned_bucket_objects(&state, &auth.display_name, "b1").await.unwrap();
        assert!(bucket_objects.contains("big"));
        assert!(!bucket_objects.contains(&shadow_name("big", &upload_id)));
    }

    #[tokio::test]
    async fn abort_after_complete_is_no_such_upload() {
        let (state, auth) = test_state().await;
        let init_resp = initiate_multipart_upload(state.clone(), auth.clone(), "b1".to_string(), "big".to_string())
            .await
            .unwrap();
        let body = axum::body::to_bytes(init_resp.into_body(), usize::MAX).await.unwrap();
        let xml = String::from_utf8(body.to_vec()).unwrap();
        let upload_id = xml
            .split("<UploadId>")
            .nth(1)
            .unwrap()
            .split("</UploadId>")
            .next()
            .unwrap()
            .to_string();

        let complete_query = Some(format!("uploadId={upload_id}"));
        complete_multipart_upload(state.clone(), auth.clone(), "b1".to_string(), "big".to_string(), complete_query)
            .await
            .unwrap();

        let abort_query = Some(format!("uploadId={upload_id}"));
        let err = abort_multipart_upload(state, auth, "b1".to_string(), "big".to_string(), abort_query)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NoSuchUpload");
    }

    #[tokio::test]
    async fn operations_on_unknown_upload_id_are_no_such_upload() {
        let (state, auth) = test_state().await;
        let query = Some("uploadId=deadbeef".to_string());
        let err = list_parts(state, auth, "b1".to_string(), "big".to_string(), query)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NoSuchUpload");
    }
}
