//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use inkpost_models::TransitionError;
use inkpost_store::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Illegal state transition or a concurrent writer won the race.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transition refused because required audit data is missing.
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] inkpost_queue::QueueError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) | ApiError::Storage(_) | ApiError::Queue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => ApiError::NotFound(key),
            StoreError::AlreadyExists(key) => ApiError::Conflict(format!("already exists: {key}")),
            StoreError::Conflict { .. } => ApiError::Conflict(e.to_string()),
            StoreError::Transition(t) => t.into(),
            other => ApiError::Storage(other),
        }
    }
}

impl From<TransitionError> for ApiError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::InvalidState { .. } => ApiError::Conflict(e.to_string()),
            TransitionError::MissingAuditData(_) => ApiError::Unprocessable(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) | ApiError::Storage(_) | ApiError::Queue(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse { detail, code: None };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_errors_map_to_conflict_and_422() {
        let invalid: ApiError = TransitionError::invalid("completed", "approve").into();
        assert_eq!(invalid.status_code(), StatusCode::CONFLICT);

        let missing: ApiError = TransitionError::MissingAuditData("transaction reference").into();
        assert_eq!(missing.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_store_conflict_maps_to_409() {
        let err: ApiError = StoreError::Conflict {
            expected: "pending".into(),
            found: "completed".into(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_store_not_found_maps_to_404() {
        let err: ApiError = StoreError::not_found("job:xyz").into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
