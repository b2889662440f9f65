//! # Error Handling
//!
//! This module defines the HTTP-facing error type and how it is converted to responses.
//!
//! ## Error taxonomy:
//! - **Unauthorized / Forbidden**: missing or wrong `x-api-key` (401 / 403)
//! - **BadRequest**: malformed JSON, oversized body, invalid base64 (400)
//! - **Internal**: staging I/O or worker pool failures (500)
//! - **ValidationError**: structurally valid input that breaks a rule (400)
//!
//! Analysis failures are deliberately *not* represented here: the analyzer
//! folds them into an `ERROR` classification that the detection handler
//! reports inside a 200 body.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::BadRequest("audioBase64 is not valid base64".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (disk failures, worker pool shutdown, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Missing or incorrect API key on the detection endpoint
    Unauthorized(String),

    /// Missing or incorrect API key on the legacy detect endpoint
    Forbidden(String),

    /// User input failed validation rules
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl AppError {
    fn parts(&self) -> (actix_web::http::StatusCode, &'static str, &str) {
        use actix_web::http::StatusCode;

        match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.as_str()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.as_str()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.as_str()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.as_str()),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.as_str()),
        }
    }
}

/// Converts errors into HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "unauthorized",
///     "message": "Invalid API Key",
///     "timestamp": "2026-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        self.parts().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = self.parts();

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Any anyhow error reaching the HTTP boundary is a server-side failure.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}

/// JSON parsing errors are almost always the client's fault, so they become a 400.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

/// A payload that is not base64 never reaches the staging directory.
impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        AppError::BadRequest(format!("audioBase64 is not valid base64: {}", err))
    }
}

/// Blocking-pool failures mean the analysis worker was cancelled or panicked.
impl From<actix_web::error::BlockingError> for AppError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        AppError::Internal(format!("Analysis worker failed: {}", err))
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Unauthorized("Invalid API Key".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden("Access Denied".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::BadRequest("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_base64_error_is_bad_request() {
        use base64::Engine as _;

        let err = base64::engine::general_purpose::STANDARD
            .decode("not*base64")
            .unwrap_err();
        let app_err: AppError = err.into();

        assert!(matches!(app_err, AppError::BadRequest(_)));
        assert!(app_err.to_string().contains("audioBase64"));
    }

    #[test]
    fn test_anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("disk full").context("Failed to stage upload");
        let app_err: AppError = err.into();

        match app_err {
            AppError::Internal(msg) => {
                assert!(msg.contains("Failed to stage upload"));
                assert!(msg.contains("disk full"));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
