//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a specific HTTP status code and structured JSON error response.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::SessionId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1101,
///     "message": "unauthorized: missing token",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status                  |
/// |-----------|-------------------|------------------------------|
/// | 1000–1999 | Request / Admission | 400 / 401 / 403            |
/// | 2000–2999 | Session           | 404 / 500                    |
/// | 3000–3999 | Server            | 500 Internal Server Error    |
/// | 5000–5999 | Backing store     | 500 / 503                    |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The session could not be authenticated.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The session was authenticated but is not allowed to start.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// No live session with the given identifier.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The OS random source could not produce a session identifier.
    #[error("unable to generate session identifier: {0}")]
    IdentifierGeneration(String),

    /// `listen` was called before a transport was attached, or twice.
    #[error("session has no transport attached")]
    TransportMissing,

    /// The underlying connection failed (distinct from a clean close).
    #[error("transport failure: {0}")]
    Transport(String),

    /// A store address could not be parsed.
    #[error("invalid store address: {0}")]
    InvalidStoreAddress(String),

    /// Error returned by the backing store client.
    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    /// A store round-trip did not complete within the caller's deadline.
    #[error("store did not answer within {0:?}")]
    StoreTimeout(Duration),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Unauthorized(_) => 1101,
            Self::Forbidden(_) => 1102,
            Self::SessionNotFound(_) => 2001,
            Self::TransportMissing => 2002,
            Self::Transport(_) => 2003,
            Self::IdentifierGeneration(_) => 3001,
            Self::Serialization(_) => 3002,
            Self::Internal(_) => 3000,
            Self::InvalidStoreAddress(_) => 5001,
            Self::Store(_) => 5002,
            Self::StoreTimeout(_) => 5003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::StoreTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::TransportMissing
            | Self::Transport(_)
            | Self::IdentifierGeneration(_)
            | Self::Serialization(_)
            | Self::InvalidStoreAddress(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn admission_errors_map_to_client_statuses() {
        assert_eq!(
            GatewayError::Unauthorized("no token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::Forbidden("nope".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GatewayError::InvalidRequest("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn store_errors_are_unavailable() {
        let err = GatewayError::StoreTimeout(Duration::from_millis(10));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_code(), 5003);
    }

    #[test]
    fn into_response_sets_status() {
        let response = GatewayError::TransportMissing.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
