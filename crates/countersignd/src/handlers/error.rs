//! api error handling for http handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// api error type for handler responses.
#[derive(Debug)]
pub enum ApiError {
    /// bad request (400): malformed input, failed validation, policy
    /// violations. deliberately opaque about which.
    BadRequest(String),
    /// not found (404): unknown request id, ca key missing from the agent.
    NotFound(String),
    /// precondition failed (412): the certificate is not signed yet.
    NotReady(String),
    /// internal server error (500).
    Internal(String),
}

impl ApiError {
    /// create a bad request error.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// create a not-ready error.
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    /// create an internal server error from any error type.
    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::NotReady(msg) => (StatusCode::PRECONDITION_FAILED, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, message).into_response()
    }
}
