//! Error types for shopfront-core.
//!
//! Fetch failures are transient and never stop a session; setter rejections
//! leave the state store untouched.

use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failure reported by a [`SearchBackend`](crate::backend::SearchBackend) for one request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport-level failure (connection refused, reset, DNS, ...)
    #[error("Network error: {0}")]
    Network(String),
    /// The backend answered with a non-success status
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },
    /// No answer within the configured fetch timeout
    #[error("Fetch timed out after {0} ms")]
    Timeout(u64),
}

/// Errors returned synchronously by the engine and its state store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A setter was called with a value outside the field's domain.
    #[error("Invalid value for {field}: {reason}")]
    InvalidStateValue { field: &'static str, reason: String },
    /// The session was torn down.
    #[error("Engine session has been disposed")]
    Disposed,
    /// The session was created outside a Tokio runtime.
    #[error("Listing engine must be created inside a Tokio runtime")]
    NoRuntime,
}

impl EngineError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidStateValue { field, reason: reason.into() }
    }
}

/// Errors that can occur while loading `.shopfront.toml` or a catalog file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}
