//! Prometheus metrics for the gateway.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a Tower-compatible middleware for
//! HTTP RED metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "s3gw_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "s3gw_http_request_duration_seconds";

/// Total S3 operations (counter). Labels: operation, status.
pub const S3_OPERATIONS_TOTAL: &str = "s3gw_s3_operations_total";

/// Currently live namelist cache entries (gauge; see [`crate::namelist`]).
pub const NAMELIST_CACHE_ENTRIES: &str = "s3gw_namelist_cache_entries";

/// Currently tracked per-object lock entries (gauge; see [`crate::objectlock`]).
pub const OBJECT_LOCK_ENTRIES: &str = "s3gw_object_lock_entries";

/// Total bytes received in request bodies (counter).
pub const BYTES_RECEIVED_TOTAL: &str = "s3gw_bytes_received_total";

/// Total bytes sent in response bodies (counter).
pub const BYTES_SENT_TOTAL: &str = "s3gw_bytes_sent_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_counter!(S3_OPERATIONS_TOTAL, "Total S3 operations by type");
    describe_gauge!(NAMELIST_CACHE_ENTRIES, "Live namelist cache entries");
    describe_gauge!(OBJECT_LOCK_ENTRIES, "Tracked per-object lock entries");
    describe_counter!(BYTES_RECEIVED_TOTAL, "Total bytes received (request bodies)");
    describe_counter!(BYTES_SENT_TOTAL, "Total bytes sent (response bodies)");

    counter!(S3_OPERATIONS_TOTAL, "operation" => "seed", "status" => "success").absolute(0);
    gauge!(NAMELIST_CACHE_ENTRIES).set(0.0);
    gauge!(OBJECT_LOCK_ENTRIES).set(0.0);
}

/// Record the current size of the namelist/objectlock registries. Called
/// from the background maintenance ticker alongside its reap pass.
pub fn record_registry_sizes(namelist_entries: usize, object_lock_entries: usize) {
    gauge!(NAMELIST_CACHE_ENTRIES).set(namelist_entries as f64);
    gauge!(OBJECT_LOCK_ENTRIES).set(object_lock_entries as f64);
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation to avoid feedback loops.
/// Must be the outermost layer so it captures the full request lifecycle.
pub async fn metrics_middleware(req: Request<axum::body::Body>, next: axum::middleware::Next) -> Response {
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let raw_query = req.uri().query().map(|s| s.to_string());
    let path = normalize_path(&raw_path);

    if raw_path == "/metrics" {
        return next.run(req).await;
    }

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status.clone())
        .increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method.clone(), "path" => path.clone())
        .record(duration);

    if let Some(operation) = map_s3_operation(&method, &path, raw_query.as_deref()) {
        let op_status = if response.status().is_success() { "success" } else { "error" };
        counter!(S3_OPERATIONS_TOTAL, "operation" => operation, "status" => op_status.to_string()).increment(1);
    }

    response
}

// -- S3 operation mapping -----------------------------------------------------

/// Map an HTTP method + normalized path + optional query string to an S3
/// operation name, following the dispatch matrix of spec §4.3. Returns
/// `None` for non-S3 endpoints (health, admin, metrics).
fn map_s3_operation(method: &str, path: &str, query: Option<&str>) -> Option<String> {
    let qs = query.unwrap_or("");

    match path {
        "/" => match method {
            "GET" => Some("ListBuckets".to_string()),
            _ => None,
        },
        "/{bucket}" => match method {
            "GET" if qs.contains("uploads") => Some("ListMultipartUploads".to_string()),
            "GET" => Some("ListObjects".to_string()),
            "PUT" => Some("PutBucket".to_string()),
            "DELETE" => Some("DeleteBucket".to_string()),
            "HEAD" => Some("HeadBucket".to_string()),
            _ => None,
        },
        "/{bucket}/{key}" => match method {
            "GET" if qs.contains("uploadId") => Some("ListParts".to_string()),
            "GET" | "HEAD" => Some("GetObject".to_string()),
            "PUT" if qs.contains("partNumber") => Some("UploadPart".to_string()),
            "PUT" => Some("PutObject".to_string()),
            "DELETE" if qs.contains("uploadId") => Some("AbortMultipartUpload".to_string()),
            "DELETE" => Some("DeleteObject".to_string()),
            "POST" if qs.contains("uploads") => Some("InitiateMultipartUpload".to_string()),
            "POST" if qs.contains("uploadId") => Some("CompleteMultipartUpload".to_string()),
            _ => None,
        },
        _ => None,
    }
}

// -- Path normalization -------------------------------------------------------

/// Normalize an actual request path to a route template for metric labels.
///
/// This prevents high-cardinality labels from unique bucket/key names.
fn normalize_path(path: &str) -> String {
    match path {
        "/" | "/health" | "/healthz" | "/readyz" | "/metrics" => path.to_string(),
        _ => {
            let trimmed = path.trim_start_matches('/');
            if trimmed.is_empty() {
                return "/".to_string();
            }
            match trimmed.find('/') {
                None => "/{bucket}".to_string(),
                Some(_) => "/{bucket}/{key}".to_string(),
            }
        }
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> impl IntoResponse {
    let handle = PROMETHEUS_HANDLE.get().expect("Prometheus recorder not initialized");
    let body = handle.render();
    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], body)
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_root_and_special_paths() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/metrics"), "/metrics");
    }

    #[test]
    fn normalize_path_bucket_and_object() {
        assert_eq!(normalize_path("/my-bucket"), "/{bucket}");
        assert_eq!(normalize_path("/my-bucket/key/with/slashes"), "/{bucket}/{key}");
    }

    #[test]
    fn map_s3_operation_distinguishes_put_bucket_and_put_object() {
        assert_eq!(map_s3_operation("PUT", "/{bucket}", None).as_deref(), Some("PutBucket"));
        assert_eq!(
            map_s3_operation("PUT", "/{bucket}/{key}", None).as_deref(),
            Some("PutObject")
        );
    }

    #[test]
    fn map_s3_operation_distinguishes_multipart_calls() {
        assert_eq!(
            map_s3_operation("POST", "/{bucket}/{key}", Some("uploads")).as_deref(),
            Some("InitiateMultipartUpload")
        );
        assert_eq!(
            map_s3_operation("POST", "/{bucket}/{key}", Some("uploadId=abc")).as_deref(),
            Some("CompleteMultipartUpload")
        );
        assert_eq!(
            map_s3_operation("GET", "/{bucket}/{key}", Some("uploadId=abc")).as_deref(),
            Some("ListParts")
        );
    }

    #[test]
    fn map_s3_operation_returns_none_for_unmapped_paths() {
        assert_eq!(map_s3_operation("GET", "/health", None), None);
    }
}
