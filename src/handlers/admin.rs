//! Admin handlers (spec §4.8): user provisioning. Unauthenticated by
//! design — these endpoints are only reachable on the admin listener
//! (see [`crate::server::admin_app`]), never on the client-facing port.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::errors::GatewayError;
use crate::AppState;

/// `PUT /admin_put_user/{display_name}` -- create a user and return its
/// first access-key pair as `access_key + CRLF + secret_key` plaintext.
pub async fn put_user(
    State(state): State<Arc<AppState>>,
    Path(display_name): Path<String>,
) -> Result<Response, GatewayError> {
    if display_name.is_empty() {
        return Err(GatewayError::InvalidArgument {
            message: "display_name must not be empty".to_string(),
        });
    }

    let user = state
        .worker
        .run(move |backend| backend.add_user(&display_name))
        .await
        .map_err(GatewayError::from_backend)?;

    let pair = user.credentials.first().ok_or_else(|| {
        GatewayError::InternalError(anyhow::anyhow!("backend returned a user with no credentials"))
    })?;

    let body = format!("{}\r\n{}", pair.access_key, pair.secret_key);
    Ok((StatusCode::OK, [("content-type", "text/plain")], body).into_response())
}

/// `GET /admin_list_users` -- dump every user's `display_name` and
/// access-key pairs, a blank line between users.
pub async fn list_users(State(state): State<Arc<AppState>>) -> Result<Response, GatewayError> {
    let users = state
        .worker
        .run(|backend| backend.list_users())
        .await
        .map_err(GatewayError::from_backend)?;

    let mut sections = Vec::with_capacity(users.len());
    for user in users {
        let mut lines = vec![user.display_name];
        for pair in user.credentials {
            lines.push(format!("{} {}", pair.access_key, pair.secret_key));
        }
        sections.push(lines.join("\n"));
    }
    let body = sections.join("\n\n");

    Ok((StatusCode::OK, [("content-type", "text/plain")], body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthMode;
    use crate::backend::memory::MemoryBackendFactory;
    use crate::backend::BackendConfig;
    use crate::config::Config;

    fn test_state() -> Arc<AppState> {
        let factory = MemoryBackendFactory::new(BackendConfig {
            meta_ip_ports: String::new(),
            table_name: String::new(),
            lock_registry_ip_port: String::new(),
            lock_registry_password: String::new(),
            lock_ttl_seconds: 10,
            self_host_port: "test:0".to_string(),
        });
        AppState::new(Config::default(), Arc::new(factory), AuthMode::NoAuth)
    }

    #[tokio::test]
    async fn put_user_returns_credentials_as_plaintext() {
        let state = test_state();
        let response = put_user(State(state), Path("alice".to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn put_user_rejects_empty_display_name() {
        let state = test_state();
        let err = put_user(State(state), Path(String::new())).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_users_includes_every_created_user() {
        let state = test_state();
        put_user(State(state.clone()), Path("alice".to_string())).await.unwrap();
        put_user(State(state.clone()), Path("bob".to_string())).await.unwrap();

        let response = list_users(State(state)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
