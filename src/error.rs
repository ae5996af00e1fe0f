//! Grid error types with HTTP status code mapping.
//!
//! [`GridError`] is the central error type for the grid. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! The two timeout variants are deliberately distinct: [`GridError::MatchTimeout`]
//! means a matching token exists but none became free in time (transient,
//! retryable), while [`GridError::NoMatchingToken`] means no registered token
//! can ever satisfy the selection criteria (a configuration mismatch).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2002,
///     "message": "timed out after 60000 ms waiting for a matching token to become free",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges below).
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
/// | Range     | Category           | HTTP Status                 |
/// |-----------|--------------------|-----------------------------|
/// | 1000–1999 | Validation         | 400 Bad Request             |
/// | 2000–2999 | Selection/Registry | 404 / 408 / 422             |
/// | 3000–3999 | Server/Lifecycle   | 500 / 503                   |
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A selection pattern could not be compiled as a regular expression.
    #[error("invalid selection pattern: {0}")]
    InvalidPattern(String),

    /// No token with the given ID is registered in the pool.
    #[error("unknown token: {0}")]
    UnknownToken(String),

    /// A matching token exists but none became free within the timeout.
    ///
    /// Transient contention; callers may legitimately retry.
    #[error("timed out after {waited_ms} ms waiting for a matching token to become free")]
    MatchTimeout {
        /// Milliseconds spent waiting before giving up.
        waited_ms: u64,
    },

    /// No registered token, free or reserved, can satisfy the selection
    /// criteria. Indicates a criteria/capacity mismatch rather than
    /// contention.
    #[error("no registered token matches the selection criteria (waited {waited_ms} ms)")]
    NoMatchingToken {
        /// Milliseconds spent waiting before giving up.
        waited_ms: u64,
    },

    /// The token pool was shut down while the caller was waiting (or
    /// before it started to). Distinct from both timeout outcomes so
    /// callers can tell an aborted wait from an unsatisfied one.
    #[error("token pool is closed")]
    PoolClosed,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GridError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidPattern(_) => 1002,
            Self::UnknownToken(_) => 2001,
            Self::MatchTimeout { .. } => 2002,
            Self::NoMatchingToken { .. } => 2003,
            Self::PoolClosed => 3002,
            Self::Internal(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidPattern(_) => StatusCode::BAD_REQUEST,
            Self::UnknownToken(_) => StatusCode::NOT_FOUND,
            Self::MatchTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            Self::NoMatchingToken { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PoolClosed => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GridError {
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
