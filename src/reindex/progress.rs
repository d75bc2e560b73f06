//! Reindex state machine states and progress tracking

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::Display;
use uuid::Uuid;

/// Phase of a reindex run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReindexState {
    Idle,
    DetectVersion,
    CreateTarget,
    Populate,
    Verify,
    SwitchAlias,
    /// Alias bound to the new version
    Completed,
    /// Verification rejected the target; alias untouched
    Aborted,
    /// Any other error; alias untouched
    Failed,
}

impl ReindexState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReindexState::Completed | ReindexState::Aborted | ReindexState::Failed
        )
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        !self.is_terminal() && *self != ReindexState::Idle
    }
}

/// A recorded state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: ReindexState,
    pub to: ReindexState,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of the current or last reindex run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReindexProgress {
    pub run_id: Option<Uuid>,
    pub state: ReindexState,
    pub source_index: Option<String>,
    pub target_index: Option<String>,

    /// Documents expected in the target
    pub total: u64,
    pub indexed: u64,
    pub failed: u64,

    pub started_at: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
    pub transitions: Vec<PhaseTransition>,
    pub error: Option<String>,
}

impl ReindexProgress {
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        ((self.indexed + self.failed) as f64 / self.total as f64 * 100.0).min(100.0)
    }
}

impl Default for ReindexProgress {
    fn default() -> Self {
        Self {
            run_id: None,
            state: ReindexState::Idle,
            source_index: None,
            target_index: None,
            total: 0,
            indexed: 0,
            failed: 0,
            started_at: None,
            last_update: Utc::now(),
            transitions: Vec::new(),
            error: None,
        }
    }
}

/// Shared, cheaply cloned progress handle
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<RwLock<ReindexProgress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ReindexProgress {
        self.inner.read().clone()
    }

    pub fn state(&self) -> ReindexState {
        self.inner.read().state
    }

    /// Reset for a new run
    pub fn start(&self, run_id: Uuid) {
        let now = Utc::now();
        *self.inner.write() = ReindexProgress {
            run_id: Some(run_id),
            started_at: Some(now),
            last_update: now,
            ..Default::default()
        };
    }

    pub fn transition(&self, to: ReindexState) {
        let mut progress = self.inner.write();
        let now = Utc::now();
        let from = progress.state;
        progress.transitions.push(PhaseTransition {
            from,
            to,
            timestamp: now,
        });
        progress.state = to;
        progress.last_update = now;
    }

    pub fn set_indices(&self, source: Option<String>, target: String) {
        let mut progress = self.inner.write();
        progress.source_index = source;
        progress.target_index = Some(target);
        progress.last_update = Utc::now();
    }

    pub fn set_total(&self, total: u64) {
        let mut progress = self.inner.write();
        progress.total = total;
        progress.last_update = Utc::now();
    }

    /// Overwrite the running counters
    pub fn set_counts(&self, indexed: u64, failed: u64) {
        let mut progress = self.inner.write();
        progress.indexed = indexed;
        progress.failed = failed;
        progress.last_update = Utc::now();
    }

    /// End the run in `state` with an error message
    pub fn fail(&self, state: ReindexState, error: String) {
        self.transition(state);
        self.inner.write().error = Some(error);
    }
}
