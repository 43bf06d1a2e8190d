//! HTTP error types for the `AppVars` server.
//!
//! Maps domain errors from `appvars-core` into HTTP responses. Every error
//! variant produces a JSON body with a machine-readable `error` field and a
//! human-readable `message`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use appvars_core::error::VariableError;

/// Application-level error returned from HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The caller may not perform this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Client sent invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The variable already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal error (storage, crypto, serialization).
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_owned(),
                )
            }
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<VariableError> for AppError {
    fn from(err: VariableError) -> Self {
        match err {
            VariableError::ApplicationNotFound { .. }
            | VariableError::VariableNotFound { .. }
            | VariableError::AuditNotFound { .. } => Self::NotFound(err.to_string()),
            VariableError::AlreadyExists { .. } => Self::Conflict(err.to_string()),
            VariableError::Codec(_)
            | VariableError::Storage(_)
            | VariableError::Serialization { .. } => Self::Internal(err.to_string()),
        }
    }
}
