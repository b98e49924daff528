use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::storage::StorageError;
use sea_orm::DbErr;
use serde::Serialize;

use crate::ingest::IngestError;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// Machine-readable error code. One of: `UNAUTHORIZED`, `INVALID_INPUT`,
    /// `TOO_LARGE`, `TIMEOUT`, `NOT_FOUND`, `FORBIDDEN`, `STORAGE_ERROR`,
    /// `PROCESSING_ERROR`, `INTERNAL_ERROR`.
    #[schema(example = "INVALID_INPUT")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "Invalid base64 image data")]
    pub message: String,
}

/// Application-level error type.
///
/// Components return one of these kinds; only [`IntoResponse`] knows about
/// status codes.
#[derive(Debug)]
pub enum AppError {
    Unauthorized(String),
    InvalidInput(String),
    TooLarge(String),
    Timeout(String),
    NotFound(String),
    Forbidden(String),
    Storage(String),
    Processing(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        let (status, code, message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg),
            AppError::TooLarge(msg) => (StatusCode::BAD_REQUEST, "TOO_LARGE", msg),
            AppError::Timeout(msg) => (StatusCode::REQUEST_TIMEOUT, "TIMEOUT", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            AppError::Storage(detail) => {
                tracing::error!("Storage error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "Failed to store image".into(),
                )
            }
            AppError::Processing(detail) => {
                tracing::error!("Processing error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PROCESSING_ERROR",
                    "Failed to process image".into(),
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An unexpected error occurred".into(),
                )
            }
        };
        (
            status,
            ErrorBody {
                success: false,
                code,
                message,
            },
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => AppError::NotFound("Image not found".into()),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::InvalidInput(msg) => AppError::InvalidInput(msg),
            IngestError::TooLarge { limit } => AppError::TooLarge(format!(
                "File exceeds maximum size of {} MB",
                limit.div_ceil(1024 * 1024)
            )),
            IngestError::Timeout => {
                AppError::Timeout("Download timed out, please try again later".into())
            }
            IngestError::Processing(detail) => AppError::Processing(detail),
        }
    }
}
