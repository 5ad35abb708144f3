//! Axum router construction, the Auth Gate middleware, and the dual-port
//! serving model (spec §4.3, §4.4, §6).
//!
//! Two independent [`Router`]s are built: [`app`] serves the S3-facing
//! surface on `config.server.port` behind the Auth Gate, and
//! [`admin_app`] serves user provisioning on `config.admin.port` with
//! no auth layer at all -- it is reachable only because it is bound to
//! a separate listener, per spec §6.

use std::sync::Arc;
use std::time::SystemTime;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AuthMode, AuthOutcome};
use crate::errors::GatewayError;
use crate::handlers::{self, AuthContext};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- Client-facing router ------------------------------------------------

/// Build the S3-facing router (spec §4.3's dispatch table), layered
/// with the Auth Gate, common response headers, tracing, and (when
/// enabled) request metrics.
pub fn app(state: Arc<AppState>) -> Router {
    let s3_routes = Router::new()
        .route("/", get(handlers::bucket::list_buckets).fallback(handlers::bucket::not_implemented))
        .route(
            "/:bucket",
            get(handlers::bucket::get)
                .put(handlers::bucket::put)
                .delete(handlers::bucket::delete)
                .head(handlers::bucket::head)
                .fallback(handlers::bucket::not_implemented),
        )
        .route(
            "/:bucket/*key",
            get(handlers::object::get)
                .put(handlers::object::put)
                .delete(handlers::object::delete)
                .head(handlers::object::head)
                .post(handlers::object::post)
                .fallback(handlers::bucket::not_implemented),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state.clone());

    let ambient_routes = Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/health", get(health_handler))
        .with_state(state.clone());

    let mut router = s3_routes.merge(ambient_routes);

    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router = router
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http());

    if state.config.observability.metrics {
        router = router.layer(middleware::from_fn(metrics_middleware));
    }

    router
}

/// Build the admin router (spec §4.8): user provisioning, unauthenticated,
/// intended to be bound only to the admin listener.
pub fn admin_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/admin_list_users", get(handlers::admin::list_users))
        .route("/admin_put_user/:display_name", axum::routing::put(handlers::admin::put_user))
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// -- Auth Gate middleware -------------------------------------------------

/// Establish the caller's [`AuthContext`] for every S3-facing request
/// (spec §4.4) and thread it to handlers as a request extension.
///
/// `authenticate_request` takes a synchronous `lookup_secret_key`
/// closure, but resolving a user is a backend call that must run on the
/// worker pool. We extract the access key first, resolve the user via
/// `state.worker`, and hand the already-resolved secret key to the
/// closure -- the closure itself does no I/O.
pub async fn auth_middleware(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    if state.auth_mode == AuthMode::NoAuth {
        req.extensions_mut().insert(AuthContext::anonymous());
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query_string = req.uri().query().unwrap_or("").to_string();
    let authorization_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let payload_hash = req
        .headers()
        .get("x-amz-content-sha256")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("UNSIGNED-PAYLOAD")
        .to_string();
    let request_headers = auth::extract_headers_for_signing(req.headers());

    let Some(access_key_id) = auth::extract_access_key(authorization_header.as_deref(), &query_string) else {
        return GatewayError::AccessDenied {
            message: "no credentials in request".to_string(),
        }
        .into_response();
    };

    let user = match state
        .worker
        .run({
            let access_key_id = access_key_id.clone();
            move |backend| backend.get_user(&access_key_id)
        })
        .await
    {
        Ok(user) => user,
        Err(e) if e.is_not_found() => return GatewayError::InvalidAccessKeyId.into_response(),
        Err(e) => return GatewayError::from_backend(e).into_response(),
    };

    let secret_key = user
        .credentials
        .iter()
        .find(|c| c.access_key == access_key_id)
        .map(|c| c.secret_key.clone());

    let outcome = auth::authenticate_request(
        state.auth_mode,
        &method,
        &path,
        &query_string,
        authorization_header.as_deref(),
        &request_headers,
        &payload_hash,
        |_| secret_key,
    );

    let auth = match outcome {
        AuthOutcome::Anonymous => AuthContext::anonymous(),
        AuthOutcome::Authenticated { access_key_id } => AuthContext {
            access_key_id,
            display_name: user.display_name,
        },
        AuthOutcome::InvalidAccessKeyId => return GatewayError::InvalidAccessKeyId.into_response(),
        AuthOutcome::SignatureDoesNotMatch => return GatewayError::SignatureDoesNotMatch.into_response(),
        AuthOutcome::AccessDenied => {
            return GatewayError::AccessDenied {
                message: "access denied".to_string(),
            }
            .into_response()
        }
    };

    req.extensions_mut().insert(auth);
    next.run(req).await
}

// -- Common response headers ----------------------------------------------

/// Stamp every response with a `Date` and `Server` header (spec §6),
/// unless the handler already set one -- `GetObject`/`HeadObject` set a
/// more meaningful `Last-Modified` from the object's own creation time,
/// which this leaves alone.
pub async fn common_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key(axum::http::header::DATE) {
        if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(SystemTime::now())) {
            headers.insert(axum::http::header::DATE, value);
        }
    }
    if !headers.contains_key(axum::http::header::SERVER) {
        headers.insert(axum::http::header::SERVER, HeaderValue::from_static("s3gw"));
    }
    if !headers.contains_key("last-modified") {
        if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(SystemTime::now())) {
            headers.insert("last-modified", value);
        }
    }

    response
}

// -- Health endpoints ------------------------------------------------------

async fn healthz_handler() -> StatusCode {
    StatusCode::OK
}

/// `GET /readyz` -- `200` only if the backend responds to a cheap call.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.worker.run(|backend| backend.list_users().map(|_| ())).await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// `GET /health` -- a short plaintext summary including registry sizes,
/// handy when eyeballing a running gateway.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.worker.run(|backend| backend.list_users().map(|_| ())).await.is_ok();
    let body = format!(
        "status: {}\nnamelist_entries: {}\nobject_lock_entries: {}\n",
        if ready { "ok" } else { "degraded" },
        state.namelists.len(),
        state.locks.len(),
    );
    (StatusCode::OK, [("content-type", "text/plain")], body)
}

// -- Background maintenance -------------------------------------------------

/// Periodically reap idle per-object locks and publish registry-size
/// gauges (spec §4.2's lazy-reaping note; spec §9's observability note).
pub fn spawn_maintenance(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(2));
        loop {
            interval.tick().await;
            state.locks.reap_idle();
            crate::metrics::record_registry_sizes(state.namelists.len(), state.locks.len());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackendFactory;
    use crate::backend::BackendConfig;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    fn test_state(auth_mode: AuthMode) -> Arc<AppState> {
        let factory = MemoryBackendFactory::new(BackendConfig {
            meta_ip_ports: String::new(),
            table_name: String::new(),
            lock_registry_ip_port: String::new(),
            lock_registry_password: String::new(),
            lock_ttl_seconds: 10,
            self_host_port: "test:0".to_string(),
        });
        AppState::new(Config::default(), Arc::new(factory), auth_mode)
    }

    #[tokio::test]
    async fn healthz_is_always_reachable_without_auth() {
        let state = test_state(AuthMode::AccessKeyAndSignature);
        let response = app(state)
            .oneshot(HttpRequest::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_auth_mode_lets_list_buckets_through_anonymously() {
        let state = test_state(AuthMode::NoAuth);
        let response = app(state)
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn access_key_only_mode_rejects_requests_without_credentials() {
        let state = test_state(AuthMode::AccessKeyOnly);
        let response = app(state)
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn access_key_only_mode_accepts_a_known_access_key() {
        let state = test_state(AuthMode::AccessKeyOnly);
        let user = state.worker.run(|b| b.add_user("alice")).await.unwrap();
        let access_key = user.credentials[0].access_key.clone();

        let response = app(state)
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header(
                        "authorization",
                        format!(
                            "AWS4-HMAC-SHA256 Credential={access_key}/20260101/us-east-1/s3/aws4_request, \
                             SignedHeaders=host, Signature=0000000000000000000000000000000000000000000000000000000000000000"
                        ),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_method_on_root_is_not_implemented() {
        let state = test_state(AuthMode::NoAuth);
        let response = app(state)
            .oneshot(
                HttpRequest::builder()
                    .method("PATCH")
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn admin_router_creates_and_lists_users() {
        let state = test_state(AuthMode::NoAuth);
        let put_response = admin_app(state.clone())
            .oneshot(
                HttpRequest::builder()
                    .method("PUT")
                    .uri("/admin_put_user/alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(put_response.status(), StatusCode::OK);

        let list_response = admin_app(state)
            .oneshot(HttpRequest::builder().uri("/admin_list_users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(list_response.status(), StatusCode::OK);
    }
}
