//! Error types for imon-api
//!
//! Client input errors are rejected before any side effect. Storage failures
//! wrap [`imon_common::Error`] and map to 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Pipeline error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Donation without image bytes
    #[error("Picture is missing")]
    MissingPayload,

    /// Donation without a label
    #[error("Label is missing")]
    MissingLabel,

    /// Label outside the wordlist while labels are restricted
    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    /// Leading bytes match no known image signature
    #[error("Unsupported media type detected")]
    InvalidMediaType,

    /// Verdict token other than `yes`/`no`
    #[error("Invalid verdict '{0}', expected 'yes' or 'no'")]
    InvalidVerdict(String),

    /// Report without a usable reason
    #[error("Reason missing - please provide a valid 'reason'")]
    MissingReason,

    /// Export without any tag
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Same voter token voted twice on one donation
    #[error("Vote already recorded for this voter")]
    DuplicateVote,

    /// Unknown donation identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Nothing left to review
    #[error("No donations awaiting review")]
    EmptyQueue,

    /// Upload body over the configured limit
    #[error("Upload exceeds the size limit")]
    PayloadTooLarge,

    /// Malformed request outside the pipeline taxonomy
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Persistence or I/O failure
    #[error("Storage failure: {0}")]
    Storage(#[from] imon_common::Error),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::MissingPayload => (StatusCode::BAD_REQUEST, "MISSING_PAYLOAD"),
            ApiError::MissingLabel => (StatusCode::UNPROCESSABLE_ENTITY, "MISSING_LABEL"),
            ApiError::UnknownLabel(_) => (StatusCode::UNPROCESSABLE_ENTITY, "UNKNOWN_LABEL"),
            ApiError::InvalidMediaType => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_MEDIA_TYPE")
            }
            ApiError::InvalidVerdict(_) => (StatusCode::BAD_REQUEST, "INVALID_VERDICT"),
            ApiError::MissingReason => (StatusCode::UNPROCESSABLE_ENTITY, "MISSING_REASON"),
            ApiError::InvalidQuery(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_QUERY"),
            ApiError::DuplicateVote => (StatusCode::CONFLICT, "DUPLICATE_VOTE"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::EmptyQueue => (StatusCode::NOT_FOUND, "EMPTY_QUEUE"),
            ApiError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_FAILURE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(code = error_code, error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for pipeline operations and API handlers
pub type ApiResult<T> = Result<T, ApiError>;
