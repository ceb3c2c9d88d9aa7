//! Error types for terra-scraper
//!
//! [`ScrapeError`] is the pipeline taxonomy. Whether an error is fatal to the
//! job, retried, or recorded against a single item is decided by its variant:
//!
//! | Variant            | Scope       | Retried |
//! |--------------------|-------------|---------|
//! | `Authentication`   | job         | no      |
//! | `TransientNetwork` | item/session| yes     |
//! | `Parse`            | item        | yes     |
//! | `NotFound`         | item        | no      |
//! | `SessionExpired`   | session     | re-login|
//! | `Export`           | target      | no      |
//!
//! [`ApiError`] maps failures onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::SectionKind;

/// Scrape pipeline errors
#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    /// Login submission rejected
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Connection failure, timeout, or 5xx from the portal
    #[error("network error: {0}")]
    TransientNetwork(String),

    /// Target yielded no content
    #[error("no content for {section} {id}")]
    NotFound { section: SectionKind, id: String },

    /// Expected page structure absent
    #[error("parse error in {section}: {message} (near: {fragment})")]
    Parse {
        section: SectionKind,
        message: String,
        fragment: String,
    },

    /// Portal bounced the request to its login page
    #[error("session expired")]
    SessionExpired,

    /// Export target failed
    #[error("export to {target} failed: {message}")]
    Export { target: String, message: String },

    /// Missing or unusable credentials/configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl ScrapeError {
    /// Whether the retry helper may try again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScrapeError::TransientNetwork(_) | ScrapeError::Parse { .. }
        )
    }

    /// Build a parse error, truncating the offending fragment
    pub fn parse(section: SectionKind, message: impl Into<String>, fragment: &str) -> Self {
        const MAX_FRAGMENT: usize = 160;
        let compact: String = fragment.split_whitespace().collect::<Vec<_>>().join(" ");
        let fragment = if compact.chars().count() > MAX_FRAGMENT {
            let cut: String = compact.chars().take(MAX_FRAGMENT).collect();
            format!("{}...", cut)
        } else {
            compact
        };
        ScrapeError::Parse {
            section,
            message: message.into(),
            fragment,
        }
    }

    /// Message shown in `JobResult.errors`
    pub fn user_message(&self) -> String {
        match self {
            ScrapeError::Authentication(_) => "authentication failed".to_string(),
            ScrapeError::NotFound { .. } => "not found or not permitted".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        ScrapeError::TransientNetwork(err.to_string())
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. cancelling a finished job
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// terra-common error
    #[error("Common error: {0}")]
    Common(#[from] terra_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(terra_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(terra_common::Error::LockTimeout { .. }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "DATABASE_BUSY",
                "Database is busy, try again".to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
