//! Error types for rippl
//!
//! This module provides the error handling for the library:
//! - [`Error`], the crate-wide error type returned by fallible operations
//! - [`StreamError`], transport failures reported by a post subscription,
//!   classified as terminal or transient
//! - HTTP status mapping and a JSON body for the submission intake API

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for rippl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rippl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "RIPPL_SUBREDDITS")
        key: Option<String>,
    },

    /// A post subscription could not be opened or failed
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// A download sink rejected or failed to process a batch
    #[error("sink error: {0}")]
    Sink(String),

    /// External program execution failed (download script, interpreter)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The dispatch buffer is at capacity and the submission was dropped
    #[error("dispatch buffer full: capacity {capacity}")]
    BufferFull {
        /// Configured buffer capacity
        capacity: usize,
    },

    /// Shutdown in progress - not accepting new submissions
    #[error("shutdown in progress: not accepting new submissions")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Transport failures delivered on a subscription's error channel
#[derive(Debug, Error)]
pub enum StreamError {
    /// The source answered with a non-success HTTP status
    #[error("source {source_name} returned HTTP {status}")]
    Status {
        /// Source (subreddit) that was being polled
        source_name: String,
        /// HTTP status code
        status: u16,
    },

    /// The source redirected the listing request, which is how a missing feed is reported
    #[error("source {source_name} redirected to {location}")]
    Redirected {
        /// Source (subreddit) that was being polled
        source_name: String,
        /// Redirect target, if the server supplied one
        location: String,
    },

    /// Access token could not be obtained
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Request failed before a response was received
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body could not be decoded
    #[error("malformed listing: {0}")]
    Decode(String),
}

impl StreamError {
    /// Whether this error means the feed will never yield records again
    ///
    /// Unauthorized, forbidden and missing feeds do not recover on their own,
    /// so a worker observing one of these stops for good. Everything else is
    /// transient and the subscription keeps polling.
    pub fn is_terminal(&self) -> bool {
        match self {
            StreamError::Status { status, .. } => matches!(status, 401 | 403 | 404),
            StreamError::Redirected { .. } => true,
            StreamError::Auth(_) => true,
            StreamError::Network(_) | StreamError::Decode(_) => false,
        }
    }

    /// HTTP status attached to this error, when there is one
    pub fn status(&self) -> Option<u16> {
        match self {
            StreamError::Status { status, .. } => Some(*status),
            StreamError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// API error response format
///
/// ```json
/// {
///   "error": {
///     "code": "buffer_full",
///     "message": "dispatch buffer full: capacity 10"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "buffer_full", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::Serialization(_) => 422,

            Error::BufferFull { .. } | Error::ShuttingDown => 503,
            Error::ExternalTool(_) => 503,

            Error::Stream(_) | Error::Network(_) | Error::Sink(_) => 502,

            Error::Io(_) | Error::ApiServerError(_) | Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Serialization(_) => "serialization_error",
            Error::BufferFull { .. } => "buffer_full",
            Error::ShuttingDown => "shutting_down",
            Error::ExternalTool(_) => "external_tool_error",
            Error::Stream(_) => "stream_error",
            Error::Network(_) => "network_error",
            Error::Sink(_) => "sink_error",
            Error::Io(_) => "io_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::BufferFull { capacity } => Some(serde_json::json!({
                "capacity": capacity,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> StreamError {
        StreamError::Status {
            source_name: "pics".into(),
            status: code,
        }
    }

    #[test]
    fn unauthorized_forbidden_and_missing_are_terminal() {
        for code in [401, 403, 404] {
            assert!(status(code).is_terminal(), "HTTP {code} should be terminal");
        }
    }

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        for code in [429, 500, 502, 503] {
            assert!(
                !status(code).is_terminal(),
                "HTTP {code} should be transient"
            );
        }
        assert!(!StreamError::Decode("eof".into()).is_terminal());
    }

    #[test]
    fn redirect_and_auth_failures_are_terminal() {
        let redirect = StreamError::Redirected {
            source_name: "doesnotexist".into(),
            location: "/subreddits/search".into(),
        };
        assert!(redirect.is_terminal());
        assert!(StreamError::Auth("invalid_grant".into()).is_terminal());
    }

    #[test]
    fn status_accessor_reports_http_code() {
        assert_eq!(status(503).status(), Some(503));
        assert_eq!(StreamError::Decode("x".into()).status(), None);
    }

    #[test]
    fn buffer_full_maps_to_service_unavailable_with_capacity_detail() {
        let error = Error::BufferFull { capacity: 10 };
        assert_eq!(error.status_code(), 503);
        assert_eq!(error.error_code(), "buffer_full");

        let api: ApiError = error.into();
        assert_eq!(api.error.code, "buffer_full");
        assert_eq!(api.error.details.unwrap()["capacity"], 10);
    }

    #[test]
    fn config_error_carries_key_in_details() {
        let api: ApiError = Error::config("no sources", "RIPPL_SUBREDDITS").into();
        assert_eq!(api.error.code, "config_error");
        assert_eq!(api.error.details.unwrap()["key"], "RIPPL_SUBREDDITS");
    }

    #[test]
    fn shutting_down_is_service_unavailable() {
        assert_eq!(Error::ShuttingDown.status_code(), 503);
        assert_eq!(Error::ShuttingDown.error_code(), "shutting_down");
    }
}
