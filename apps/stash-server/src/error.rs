//! HTTP error type shared by every handler and extractor.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use stash_storage::StoreError;

/// JSON error body: `{ "status": "<snake_case>", "code": <u16>, "message": "<text>" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub status: String,
    pub code: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            code,
            message: message.into(),
        }
    }

    /// Payload failed the store schema.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", 400, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", 400, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new("unauthenticated", 401, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new("permission_denied", 403, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", 404, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", 409, message)
    }

    /// Generic 500. Details belong in the log, not in the response.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", 500, message)
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::not_found("Secret not found"),
            StoreError::Conflict { .. } => ApiError::conflict(err.to_string()),
            StoreError::Validation(msg) => ApiError::validation(msg),
            StoreError::Backend(detail) => {
                tracing::error!(error = %detail, "store failure");
                ApiError::internal("Internal server error")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = rejection.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::new("payload_too_large", status.as_u16(), rejection.body_text())
        } else {
            ApiError::bad_request(rejection.body_text())
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
