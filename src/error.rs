//! Error types for the feed client and the symbol cache

use thiserror::Error;

/// Failure of a single HTTP fetch, or of the whole retry sequence
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("connection error on {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("request timed out for {url}")]
    Timeout { url: String },

    #[error("too many redirects for {url}")]
    Redirect { url: String },

    #[error("JSON decode error at {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("HTTP request to {url} failed with code {status}: {message}")]
    Http {
        url: String,
        status: u16,
        message: String,
    },

    #[error("request exception at {url}: {reason}")]
    Request { url: String, reason: String },

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("all retries failed for {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },
}

impl FetchError {
    /// Transient failures are retried with backoff; the rest end the fetch
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FetchError::InvalidUrl { .. } | FetchError::RetriesExhausted { .. }
        )
    }

    /// Short label for the failure class, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Connection { .. } => "connection",
            FetchError::Timeout { .. } => "timeout",
            FetchError::Redirect { .. } => "redirect",
            FetchError::Parse { .. } => "parse",
            FetchError::Http { .. } => "http",
            FetchError::Request { .. } => "request",
            FetchError::InvalidUrl { .. } => "invalid-url",
            FetchError::RetriesExhausted { .. } => "exhausted",
        }
    }
}

/// Why a refresh cycle left the cached symbols untouched
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("unexpected data format, expected a list of assets but got {0}")]
    Shape(&'static str),

    #[error("no symbol survived the filters out of {received} assets")]
    NothingToCache { received: usize },

    #[error("a refresh is already in flight")]
    AlreadyRefreshing,
}

/// Invalid coin filter configuration
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid blacklist pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("max_usd_value must be a non-negative number, got {0}")]
    InvalidMaxUsdValue(f64),
}
