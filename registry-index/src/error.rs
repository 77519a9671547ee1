//! # Error Handling and Response Types
//!
//! This module provides the error taxonomy for the index service together with
//! the HTTP status mapping used by the API layer.
//!
//! ## Key Types
//!
//! - [`AppError`]: Main error enum covering every failure the index can report
//! - [`ApiErrorResponse`]: Standardized JSON error response format
//! - [`ErrorCode`]: Machine-readable error classification
//! - [`AppResult<T>`]: Convenience type alias for Results using `AppError`
//!
//! ## Error Response Format
//!
//! All API errors are returned in a consistent JSON format:
//!
//! ```json
//! {
//!   "error": "images not found for arch/os pair",
//!   "code": "not_found",
//!   "details": {"arch": "arm", "os": "linux"},
//!   "timestamp": "2024-01-01T12:00:00Z"
//! }
//! ```
//!
//! ## Error Classifications
//!
//! - **Validation Errors** (400 Bad Request): undecodable payloads, records without an id
//! - **Not Found** (404 Not Found): missing index, platform mismatch
//! - **Conflict** (409 Conflict): concurrent push to the same repository index
//! - **Upstream Errors** (502 Bad Gateway): mirror source failures
//! - **Internal Errors** (500 Internal Server Error): storage and server-side errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

/// Standardized error response structure for consistent API error handling
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,          // Human-readable error message
    pub code: String,           // Machine-readable error code
    pub details: Option<Value>, // Additional error details
    pub timestamp: String,      // ISO 8601 timestamp
}

/// Error code classification for machine-readable error types
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCode {
    ValidationError, // For malformed payloads and records
    NotFound,        // For missing indexes and platform mismatches
    Conflict,        // For lost conditional writes
    UpstreamError,   // For mirror source failures
    InternalError,   // For server-side errors
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::UpstreamError => "upstream_error",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::UpstreamError => StatusCode::BAD_GATEWAY,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application-specific error types with error codes
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The pushed image list could not be decoded or is not a list.
    #[error("{0}")]
    MalformedInput(String),

    /// An image record lacks a usable `id`.
    #[error("Malformed image record: {0}")]
    MalformedRecord(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Stored images exist but were built for another platform. Reported as
    /// a 404 so callers cannot tell it apart from a missing index.
    #[error("images not found for arch/os pair")]
    PlatformMismatch { arch: String, os: String },

    #[error("Conflicting write to {0}")]
    Conflict(String),

    #[error("Upstream source error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    /// Get the appropriate error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::MalformedInput(_)
            | AppError::MalformedRecord(_)
            | AppError::BadRequest(_) => ErrorCode::ValidationError,
            AppError::NotFound(_) | AppError::PlatformMismatch { .. } => ErrorCode::NotFound,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::Upstream(_) => ErrorCode::UpstreamError,
            AppError::Json(_)
            | AppError::Io(_)
            | AppError::InternalError(_)
            | AppError::Anyhow(_) => ErrorCode::InternalError,
        }
    }

    /// True for both flavours of "nothing to serve".
    pub fn is_not_found(&self) -> bool {
        self.error_code() == ErrorCode::NotFound
    }

    /// Get additional error details if available
    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::PlatformMismatch { arch, os } => Some(json!({"arch": arch, "os": os})),
            AppError::Anyhow(e) => e
                .source()
                .map(|source| json!({"source": source.to_string()})),
            _ => None,
        }
    }

    /// Create a standardized error response
    pub fn to_error_response(&self) -> ApiErrorResponse {
        let code = self.error_code();
        ApiErrorResponse {
            error: self.to_string(),
            code: code.as_str().to_string(),
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_response = self.to_error_response();
        let status = self.error_code().http_status();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        tracing::debug!(status = %status, code = %error_response.code, "Returning standardized error response");

        (status, axum::Json(error_response)).into_response()
    }
}

/// Convenient result type for index operations.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_mismatch_is_reported_as_not_found() {
        let err = AppError::PlatformMismatch {
            arch: "arm".to_string(),
            os: "linux".to_string(),
        };
        assert_eq!(err.error_code().http_status(), StatusCode::NOT_FOUND);
        assert!(err.is_not_found());

        let body = err.to_error_response();
        assert_eq!(body.error, "images not found for arch/os pair");
        assert_eq!(body.code, "not_found");
        assert_eq!(body.details, Some(json!({"arch": "arm", "os": "linux"})));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::MalformedInput("Invalid data".into())
                .error_code()
                .http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::MalformedRecord("missing id".into())
                .error_code()
                .http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Conflict("repositories/library/busybox/_index_images".into())
                .error_code()
                .http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Upstream("timeout".into())
                .error_code()
                .http_status(),
            StatusCode::BAD_GATEWAY
        );
        assert!(!AppError::InternalError("boom".into()).is_not_found());
    }
}
