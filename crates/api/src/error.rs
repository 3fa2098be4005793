//! API error type and its HTTP mapping.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use coursetrack_core::ModelError;
use coursetrack_progress::TrackerError;
use coursetrack_storage::StorageError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors surfaced to HTTP callers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing identity, or the caller does not own the resource
    #[error("Unauthorized")]
    Unauthorized,

    /// Referenced record does not exist
    #[error("{0}")]
    NotFound(String),

    /// Malformed or invalid request
    #[error("{0}")]
    BadRequest(String),

    /// Concurrent modification could not be resolved
    #[error("{0}")]
    Conflict(String),

    /// Anything the caller cannot act on; details are only logged
    #[error("Internal server error")]
    Internal(String),
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::CourseNotFound(_) => ApiError::NotFound("Course not found".into()),
            TrackerError::EnrollmentNotFound(_) => ApiError::NotFound("Enrollment not found".into()),
            TrackerError::DuplicateEnrollment { .. } => {
                ApiError::BadRequest("Already enrolled in this course".into())
            }
            TrackerError::Unauthorized => ApiError::Unauthorized,
            TrackerError::LessonNotInCourse { .. } => ApiError::BadRequest(err.to_string()),
            TrackerError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            TrackerError::Storage(e) => e.into(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(detail) => {
                error!("request failed: {detail}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Parse a path id, answering 404 for ids that cannot exist.
pub(crate) fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("{what} not found")))
}
