//! Zero-downtime rebuilds of the listing index.
//!
//! [`ReindexManager`] fills the inactive physical version, has
//! [`ReindexVerifier`] check it, and only then flips the alias in one atomic
//! request. The previous version is left in place so [`ReindexManager::rollback`]
//! can flip back.

mod error;
mod orchestrator;
mod progress;
mod verifier;

pub use error::{ReindexError, ReindexResult};
pub use orchestrator::{
    ActiveVersion, IndexStatus, PopulateMode, ReindexManager, ReindexOptions, ReindexOutcome,
    RollbackOutcome, VersionStatus,
};
pub use progress::{PhaseTransition, ProgressTracker, ReindexProgress, ReindexState};
pub use verifier::{
    IndexVerifier, ReindexVerifier, VerificationResult, CRITICAL_FIELDS,
    MIN_FIELD_COVERAGE_PERCENT, MIN_VOLUME_RATIO,
};
