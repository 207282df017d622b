use axum::{
    http::StatusCode,
    response::IntoResponse
};
use thiserror::Error;

use crate::{generator::GeneratorError, storage::StorageError};

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<GeneratorError> for AppError {
    fn from(err: GeneratorError) -> Self {
        match err {
            GeneratorError::Unreachable(_) | GeneratorError::Timeout => {
                AppError::ServiceUnavailable(format!("ml generate failed: {}", err))
            }
            _ => AppError::BadGateway(format!("ml generate failed: {}", err)),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(name) => AppError::NotFound(format!("{} not found", name)),
            StorageError::InvalidName(name) => AppError::BadRequest(format!("invalid filename: {}", name)),
            StorageError::IoError(e) => AppError::InternalServerError(format!("storage failure: {}", e)),
            StorageError::NotConfigured => AppError::InternalServerError(err.to_string()),
            StorageError::UploadError(_)
            | StorageError::Rejected { .. }
            | StorageError::IncompleteResponse => AppError::BadGateway(format!("object storage upload failed: {}", err)),
        }
    }
}

/// Convert `AppError` into an HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        // Map application errors to HTTP status codes and messages
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::MethodNotAllowed(msg) => (StatusCode::METHOD_NOT_ALLOWED, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        // Plain-text body
        (status, error_message).into_response()
    }
}
