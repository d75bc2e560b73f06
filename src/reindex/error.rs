//! Error types for reindex runs

use crate::context::Interrupted;
use crate::error::AppError;
use crate::reindex::VerificationResult;
use crate::search::{RebuildError, SearchError};

pub type ReindexResult<T> = std::result::Result<T, ReindexError>;

#[derive(Debug, thiserror::Error)]
pub enum ReindexError {
    /// The target failed verification; the alias was not touched
    #[error("Verification of {} failed: {}", .0.index, .0.sample_errors.join("; "))]
    VerificationFailed(Box<VerificationResult>),

    /// The alias points somewhere other than exactly one known version
    #[error("Alias {alias} resolves to unexpected indices {bound:?}")]
    UnexpectedAliasBinding { alias: String, bound: Vec<String> },

    #[error("Rollback target index {0} does not exist")]
    RollbackTargetMissing(String),

    #[error("A reindex run is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Repository(#[from] AppError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl From<RebuildError> for ReindexError {
    fn from(err: RebuildError) -> Self {
        match err {
            RebuildError::Interrupted(e) => ReindexError::Interrupted(e),
            RebuildError::Repository(e) => ReindexError::Repository(e),
        }
    }
}

impl ReindexError {
    /// Metric label for a run that ended with this error
    pub fn outcome_label(&self) -> &'static str {
        match self {
            ReindexError::VerificationFailed(_) => "verification_failed",
            ReindexError::Interrupted(_) => "interrupted",
            _ => "failed",
        }
    }
}

impl From<ReindexError> for AppError {
    fn from(err: ReindexError) -> Self {
        match err {
            ReindexError::VerificationFailed(_) => AppError::Consistency(err.to_string()),
            ReindexError::UnexpectedAliasBinding { .. }
            | ReindexError::RollbackTargetMissing(_)
            | ReindexError::AlreadyRunning => AppError::Invariant(err.to_string()),
            ReindexError::Search(e) => e.into(),
            ReindexError::Repository(e) => e,
            ReindexError::Interrupted(e) => e.into(),
        }
    }
}
