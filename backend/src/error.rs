//! Unified error handling for the HTTP surface.
//!
//! Handlers return `ApiResult` and use `?` on pipeline results; the
//! `IntoResponse` impl decides the status code and JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::api::ErrorResponse;
use thiserror::Error;

use crate::services::CalendarError;

/// Unified error type for API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Calendar build failed
    #[error(transparent)]
    Calendar(#[from] CalendarError),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        ApiError::NotFound(resource.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Calendar(CalendarError::UserNotFound(username)) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("not_found", format!("user {} not found", username)),
            ),
            ApiError::Calendar(e) => {
                tracing::error!(error = %e, "Failed to build calendar");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details(
                        "internal_error",
                        "Failed to build calendar",
                        e.to_string(),
                    ),
                )
            }
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("not_found", format!("{} not found", resource)),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("bad_request", msg.clone()),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
