//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use chatdesk_shared::CoreError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Insufficient permissions: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found")]
    NotFound,
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),

            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),

            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::InvalidTransition(msg) => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION", msg.clone())
            }

            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition { .. } => ApiError::InvalidTransition(err.to_string()),
            CoreError::NotFound(_) => ApiError::NotFound,
            CoreError::Forbidden(msg) => ApiError::Forbidden(msg),
            CoreError::Conflict(msg) => ApiError::Conflict(msg),
            CoreError::Validation(msg) => ApiError::Validation(msg),
            CoreError::Storage(msg) => {
                tracing::error!(error = %msg, "Storage error");
                ApiError::Internal(msg)
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_shared::Bucket;

    #[tokio::test]
    async fn test_core_errors_map_to_status_codes() {
        let cases = [
            (
                CoreError::InvalidTransition {
                    expected: Bucket::Inbox,
                    actual: Bucket::Taken,
                },
                StatusCode::CONFLICT,
            ),
            (CoreError::NotFound("conversation"), StatusCode::NOT_FOUND),
            (
                CoreError::Forbidden("nope".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (
                CoreError::Conflict("taken".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                CoreError::Validation("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, expected_status) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected_status);
        }
    }
}
