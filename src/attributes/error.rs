//! Error types for the attribute cache

use crate::attributes::BulkUpsertReport;
use crate::context::Interrupted;
use crate::error::AppError;

/// Result type for attribute cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No cache row exists for the entity
    #[error("Attribute cache entry not found for entity {0}")]
    NotFound(i64),

    /// Relational store failure
    #[error("Repository error: {0}")]
    Repository(#[from] AppError),

    /// Stored payload could not be encoded or decoded
    #[error("Cache payload error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Some entities in a batch failed; the report has the counts and first errors
    #[error("{} of {} attribute cache upserts failed", .0.failed, .0.requested)]
    PartialFailure(BulkUpsertReport),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::NotFound(id) => {
                AppError::NotFound(format!("attribute cache for entity {}", id))
            }
            CacheError::Repository(inner) => inner,
            CacheError::Serialization(e) => AppError::Serialization(e.to_string()),
            CacheError::PartialFailure(report) => AppError::PartialFailure(report.summary()),
            CacheError::Interrupted(i) => i.into(),
        }
    }
}
