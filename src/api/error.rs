//! API error handling.
//!
//! Every failure is rendered in the same envelope as a success, with an empty
//! `data` object:
//!
//! ```json
//! { "message": "Task not found", "data": {} }
//! ```

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

// =============================================================================
// API Error Response
// =============================================================================

/// API error response containing status code and client-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiErrorResponse {
    pub status: StatusCode,
    pub message: String,
}

impl ApiErrorResponse {
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Creates a 400 Bad Request response.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Creates a 404 Not Found response.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Creates a 500 Internal Server Error response.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "message": self.message, "data": {} })),
        )
            .into_response()
    }
}

/// Maps a store or encoding failure to a 500 carrying only `message`.
///
/// The underlying error is logged, never sent to the client.
pub fn internal_failure<E: fmt::Display>(
    message: &'static str,
) -> impl FnOnce(E) -> ApiErrorResponse {
    move |error| {
        tracing::error!(error = %error, "{message}");
        ApiErrorResponse::internal_error(message)
    }
}

// =============================================================================
// Tests
// =============================================================================
