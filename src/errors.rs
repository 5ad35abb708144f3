//! S3-compatible error types (spec §7).
//!
//! Every variant maps to a well-known S3 error code. The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(GatewayError::NoSuchBucket { .. })`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::xml::render_error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// The gateway's S3-compatible error taxonomy.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The specified bucket does not exist.
    #[error("The specified bucket does not exist")]
    NoSuchBucket { bucket: String },

    /// The specified key does not exist.
    #[error("The specified key does not exist.")]
    NoSuchKey { key: String },

    /// The specified multipart upload does not exist.
    #[error("The specified upload does not exist. The upload ID may be invalid, or the upload may have been aborted or completed.")]
    NoSuchUpload { upload_id: String },

    /// A bucket with the requested name already exists, owned by someone
    /// else.
    #[error("The requested bucket name is not available. The bucket namespace is shared by all users of the system. Please select a different name and try again.")]
    BucketAlreadyExists { bucket: String },

    /// The caller already owns the named bucket.
    #[error("Your previous request to create the named bucket succeeded and you already own it.")]
    BucketAlreadyOwnedByYou { bucket: String },

    /// The bucket you tried to delete is not empty.
    #[error("The bucket you tried to delete is not empty")]
    BucketNotEmpty { bucket: String },

    /// Access denied.
    #[error("Access Denied")]
    AccessDenied { message: String },

    /// A request argument is invalid.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// The request signature does not match.
    #[error("The request signature we calculated does not match the signature you provided.")]
    SignatureDoesNotMatch,

    /// An invalid bucket name was provided.
    #[error("The specified bucket is not valid.")]
    InvalidBucketName { name: String },

    /// The AWS Access Key Id you provided does not exist in our records.
    #[error("The AWS Access Key Id you provided does not exist in our records.")]
    InvalidAccessKeyId,

    /// The requested operation is not implemented.
    #[error("A header you provided implies functionality that is not implemented")]
    NotImplemented,

    /// HTTP method not allowed for this resource.
    #[error("The specified method is not allowed against this resource.")]
    MethodNotAllowed,

    /// Catch-all for unexpected internal errors (including backend
    /// failures; spec §7's `InternalError (backend unavailable) -> 500`).
    #[error("We encountered an internal error, please try again.")]
    InternalError(#[from] anyhow::Error),
}

impl GatewayError {
    /// Build an `InternalError` from a [`crate::backend::BackendError`],
    /// per spec §7's "backend unavailable -> 500 InternalError" mapping.
    pub fn from_backend(err: crate::backend::BackendError) -> Self {
        GatewayError::InternalError(anyhow::anyhow!(err))
    }

    /// Return the S3 XML error code string.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::NoSuchBucket { .. } => "NoSuchBucket",
            GatewayError::NoSuchKey { .. } => "NoSuchKey",
            GatewayError::NoSuchUpload { .. } => "NoSuchUpload",
            GatewayError::BucketAlreadyExists { .. } => "BucketAlreadyExists",
            GatewayError::BucketAlreadyOwnedByYou { .. } => "BucketAlreadyOwnedByYou",
            GatewayError::BucketNotEmpty { .. } => "BucketNotEmpty",
            GatewayError::AccessDenied { .. } => "AccessDenied",
            GatewayError::InvalidArgument { .. } => "InvalidArgument",
            GatewayError::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            GatewayError::InvalidBucketName { .. } => "InvalidBucketName",
            GatewayError::InvalidAccessKeyId => "InvalidAccessKeyId",
            GatewayError::NotImplemented => "NotImplemented",
            GatewayError::MethodNotAllowed => "MethodNotAllowed",
            GatewayError::InternalError(_) => "InternalError",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NoSuchBucket { .. } => StatusCode::NOT_FOUND,
            GatewayError::NoSuchKey { .. } => StatusCode::NOT_FOUND,
            GatewayError::NoSuchUpload { .. } => StatusCode::NOT_FOUND,
            GatewayError::BucketAlreadyExists { .. } => StatusCode::CONFLICT,
            GatewayError::BucketAlreadyOwnedByYou { .. } => StatusCode::CONFLICT,
            GatewayError::BucketNotEmpty { .. } => StatusCode::CONFLICT,
            GatewayError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            GatewayError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            GatewayError::SignatureDoesNotMatch => StatusCode::FORBIDDEN,
            GatewayError::InvalidBucketName { .. } => StatusCode::BAD_REQUEST,
            GatewayError::InvalidAccessKeyId => StatusCode::FORBIDDEN,
            GatewayError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();
        let date = httpdate::fmt_http_date(std::time::SystemTime::now());

        if matches!(status, StatusCode::INTERNAL_SERVER_ERROR) {
            tracing::error!(error = %self, "internal error");
        }

        let body = render_error(self.code(), &self.to_string(), "", &request_id);

        (
            status,
            [
                ("content-type", "application/xml".to_string()),
                ("x-amz-request-id", request_id),
                ("date", date),
                ("server", "s3gw".to_string()),
            ],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_status_classes() {
        assert_eq!(
            GatewayError::NoSuchBucket { bucket: "b".into() }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::BucketAlreadyOwnedByYou { bucket: "b".into() }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(GatewayError::NotImplemented.status_code(), StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn backend_errors_become_internal_error() {
        let err = GatewayError::from_backend(crate::backend::BackendError::IoError("down".into()));
        assert_eq!(err.code(), "InternalError");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
