//! Error types for search operations

use crate::context::Interrupted;
use crate::error::AppError;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while talking to the search engine
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Transport failure (connection refused, DNS, TLS)
    #[error("Search engine request failed: {0}")]
    Http(String),

    /// Non-success HTTP status
    #[error("Search engine returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Request timed out
    #[error("Search engine request timed out: {0}")]
    Timeout(String),

    /// Index not found
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Name is neither of the two physical index versions
    #[error("Unknown index version: {0}")]
    UnknownVersion(String),

    /// Bulk request rejected as a whole or reported item failures
    #[error("Bulk indexing failed: {0}")]
    BulkFailed(String),

    /// Payload could not be encoded or the response decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl SearchError {
    /// Whether the failure came from the network or a 5xx/429 response
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::Http(_) | SearchError::Timeout(_) => true,
            SearchError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SearchError::Timeout(err.to_string())
        } else if err.is_decode() {
            SearchError::Serialization(err.to_string())
        } else {
            SearchError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Http(_) | SearchError::Status { .. } => AppError::Network(err.to_string()),
            SearchError::Timeout(msg) => AppError::Timeout(msg),
            SearchError::IndexNotFound(name) => AppError::NotFound(format!("index {}", name)),
            SearchError::UnknownVersion(_) => AppError::Invariant(err.to_string()),
            SearchError::BulkFailed(msg) => AppError::PartialFailure(msg),
            SearchError::Serialization(msg) => AppError::Serialization(msg),
            SearchError::InvalidConfiguration(msg) => AppError::Configuration(msg),
            SearchError::Interrupted(i) => i.into(),
        }
    }
}
