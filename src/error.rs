//! Error types for ytdl-web
//!
//! This module provides error handling for the library, including:
//! - A single crate-level error type covering tool, infrastructure and policy failures
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for ytdl-web operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ytdl-web
///
/// Workers never let these escape to the dispatcher: every terminal failure of a job is
/// converted into an `error` event. The variants are still distinct so that callers of the
/// service API (and the HTTP adapter) can map them to useful responses.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "web_root")
        key: Option<String>,
    },

    /// The external command could not be started (missing or unexecutable binary)
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// The program that failed to start
        program: PathBuf,
        /// The underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The external command exited unsuccessfully
    #[error("{program} exited with {status}")]
    ProcessExit {
        /// The program that exited
        program: PathBuf,
        /// Rendered exit status (code or terminating signal)
        status: String,
    },

    /// The metadata side-channel file never appeared
    #[error("metadata file {path} did not appear in time after {attempts} attempts")]
    MetadataTimeout {
        /// The side-channel path that was polled
        path: PathBuf,
        /// Number of polling attempts made
        attempts: u32,
    },

    /// The declared media size exceeds the configured ceiling
    #[error("filesize {size} too large (limit {limit})")]
    FileTooLarge {
        /// Declared size in bytes
        size: i64,
        /// Configured ceiling in bytes
        limit: i64,
    },

    /// External tool produced unusable output (missing side-channel, bad probe output, etc.)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Submitted URL could not be parsed
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// The raw URL as submitted
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Path rejected because it escapes the output directory or is malformed
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The offending path
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested file not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "invalid_url",
///     "message": "invalid URL \"\": url was empty"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "invalid_url")
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

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
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
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::InvalidUrl { .. } => 400,
            Error::InvalidPath { .. } => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 413 Payload Too Large - size policy
            Error::FileTooLarge { .. } => 413,

            // 500 Internal Server Error - Server-side issues
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - the external tool misbehaved
            Error::ProcessExit { .. } => 502,
            Error::ExternalTool(_) => 502,
            Error::MetadataTimeout { .. } => 504,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
            Error::Spawn { .. } => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Spawn { .. } => "spawn_failed",
            Error::ProcessExit { .. } => "process_exit",
            Error::MetadataTimeout { .. } => "metadata_timeout",
            Error::FileTooLarge { .. } => "file_too_large",
            Error::ExternalTool(_) => "external_tool_error",
            Error::InvalidUrl { .. } => "invalid_url",
            Error::InvalidPath { .. } => "invalid_path",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
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
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            Error::InvalidUrl { url, .. } => Some(serde_json::json!({
                "url": url,
            })),
            Error::InvalidPath { path, .. } => Some(serde_json::json!({
                "path": path,
            })),
            Error::FileTooLarge { size, limit } => Some(serde_json::json!({
                "size_bytes": size,
                "limit_bytes": limit,
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
