//! Huginn error types

use std::time::Duration;

use crate::retry::ErrorCategory;

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Provider/network errors, as raised by provider ports
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("request timed out: {0}")]
    Timeout(String),

    /// A provider call failed and was not (or no longer) retried.
    ///
    /// Wraps the last provider error with the number of attempts made and
    /// the total time spent, including backoff sleeps.
    #[error("{category} after {attempts} attempt(s) in {elapsed:?}: {source}")]
    RetryFailed {
        category: ErrorCategory,
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: Box<HuginnError>,
    },

    #[error("request cancelled")]
    Cancelled,

    // Streaming errors
    #[error("stream error: {0}")]
    Stream(String),

    #[error("empty response from model")]
    EmptyResponse,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("no provider port configured")]
    NoProvider,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("provider does not support this operation")]
    Unsupported,

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl HuginnError {
    /// The provider-supplied `Retry-After` hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HuginnError::RateLimited { retry_after } => *retry_after,
            HuginnError::RetryFailed { source, .. } => source.retry_after(),
            _ => None,
        }
    }

    /// The original error underneath any retry wrapping.
    pub fn root(&self) -> &HuginnError {
        match self {
            HuginnError::RetryFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Number of provider attempts recorded on a retry failure.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            HuginnError::RetryFailed { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Category assigned by the retry orchestrator, if this error went through it.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            HuginnError::RetryFailed { category, .. } => Some(*category),
            _ => None,
        }
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
