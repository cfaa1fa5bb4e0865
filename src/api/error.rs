//! API Error Types
//!
//! Maps gateway failures onto HTTP responses. Pipeline detail never leaves
//! the server: clients get a generic 500 and a request id that matches the
//! logged error.

use crate::pipeline::PipelineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or wrong `api_key` header
    #[error("Invalid or missing API key")]
    Unauthorized,

    /// Malformed request parameter
    #[error("Validation error: {0}")]
    Validation(String),

    /// Forecast run failed
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Forecast run exceeded the request timeout
    #[error("Forecast timed out after {0}s")]
    Timeout(u64),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Pipeline(_)
            | ApiError::Timeout(_)
            | ApiError::Internal(_)
            | ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Message safe to show a client
    fn public_message(&self) -> String {
        match self {
            ApiError::Unauthorized | ApiError::Validation(_) => self.to_string(),
            _ => "Internal Server Error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        match &self {
            ApiError::Pipeline(e) => tracing::error!(
                request_id = %request_id,
                error_code = %e.code(),
                stage = %e.stage(),
                retriable = e.is_retriable(),
                error_message = %e,
                "Forecast request failed"
            ),
            ApiError::Unauthorized | ApiError::Validation(_) => tracing::warn!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "Request rejected"
            ),
            _ => tracing::error!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "API error occurred"
            ),
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.public_message(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Unauthorized.status_and_code().0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::Validation("bad after".into()).status_and_code().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Timeout(120).status_and_code().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_pipeline_detail_is_hidden() {
        let err = ApiError::Pipeline(PipelineError::StoreUnavailable(StoreError::Unavailable(
            "db at 10.0.0.5 refused".into(),
        )));
        assert_eq!(err.public_message(), "Internal Server Error");
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
