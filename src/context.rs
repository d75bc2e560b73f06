//! Cancellation and deadline context for long-running jobs
//!
//! Every remote call made by a reindex or cache population run goes through a
//! [`JobContext`], so an operator can stop the job and a wall-clock budget can
//! be enforced. Batch loops check the context between batches, never mid-row.

use crate::error::AppError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a job stopped before finishing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Interrupted {
    #[error("job cancelled")]
    Cancelled,

    #[error("job deadline exceeded")]
    DeadlineExceeded,

    #[error("refusing to start {phase}: {remaining:?} left, {required:?} required")]
    InsufficientBudget {
        phase: String,
        remaining: Duration,
        required: Duration,
    },
}

impl From<Interrupted> for AppError {
    fn from(err: Interrupted) -> Self {
        match err {
            Interrupted::Cancelled => AppError::Cancelled(err.to_string()),
            Interrupted::DeadlineExceeded | Interrupted::InsufficientBudget { .. } => {
                AppError::Timeout(err.to_string())
            }
        }
    }
}

/// Cancellation token plus an optional deadline
#[derive(Debug, Clone, Default)]
pub struct JobContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl JobContext {
    /// Context with no deadline that is never cancelled unless asked
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this context (and every clone of it)
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Time left before the deadline; `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Fail if cancelled or past the deadline
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        match self.remaining() {
            Some(left) if left.is_zero() => Err(Interrupted::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Refuse to start `phase` when less than `required` time remains
    pub fn ensure_budget(&self, phase: &str, required: Duration) -> Result<(), Interrupted> {
        self.check()?;
        if let Some(remaining) = self.remaining() {
            if remaining < required {
                return Err(Interrupted::InsufficientBudget {
                    phase: phase.to_string(),
                    remaining,
                    required,
                });
            }
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context is cancelled or the deadline passes first
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Interrupted>
    where
        F: Future,
    {
        self.check()?;
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
                _ = tokio::time::sleep_until(deadline) => Err(Interrupted::DeadlineExceeded),
                output = fut => Ok(output),
            },
            None => tokio::select! {
                _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
                output = fut => Ok(output),
            },
        }
    }
}
