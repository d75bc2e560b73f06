//! Blue-green reindex orchestration.
//!
//! A run moves through `DetectVersion → CreateTarget → Populate → Verify →
//! SwitchAlias`. Nothing is visible to readers until the single atomic alias
//! update at the end. The previous version is kept for rollback.

use crate::config::ReindexConfig;
use crate::context::JobContext;
use crate::metrics::MetricsSink;
use crate::reindex::{
    IndexVerifier, ProgressTracker, ReindexError, ReindexProgress, ReindexResult, ReindexState,
    VerificationResult,
};
use crate::search::{mapping, IndexNaming, IndexVersion, ListingIndexer, SearchBackend};
use crate::state::CatalogRepository;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use strum::Display;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// How the target index was filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PopulateMode {
    /// Server-side copy from the active index
    ServerSideCopy,
    /// Assembled from the relational store
    FullRebuild,
}

/// Tunables of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReindexOptions {
    /// Listings per bulk request during a full rebuild
    pub batch_size: usize,

    /// Minimum time that must remain before a mutating phase or batch starts
    pub min_phase_budget: Duration,
}

impl Default for ReindexOptions {
    fn default() -> Self {
        Self {
            batch_size: crate::search::DEFAULT_REBUILD_BATCH_SIZE,
            min_phase_budget: Duration::from_secs(60),
        }
    }
}

impl From<&ReindexConfig> for ReindexOptions {
    fn from(config: &ReindexConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            min_phase_budget: config.min_phase_budget(),
        }
    }
}

/// Which version is live and what the alias is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveVersion {
    pub version: IndexVersion,
    pub bound: Vec<String>,
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReindexOutcome {
    pub run_id: Uuid,
    pub alias: String,
    pub source_index: String,
    pub target_index: String,
    pub target_version: IndexVersion,
    pub mode: PopulateMode,
    pub indexed: u64,
    pub failed: u64,
    pub verification: VerificationResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Result of a rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub alias: String,
    pub previous: Vec<String>,
    pub target_index: String,

    /// False when the alias already pointed at the target
    pub switched: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStatus {
    pub version: IndexVersion,
    pub index: String,
    pub exists: bool,
    pub documents: Option<u64>,
    pub active: bool,
}

/// Alias binding and per-version state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub alias: String,
    pub bound: Vec<String>,
    pub versions: Vec<VersionStatus>,
}

/// Drives blue-green rebuilds, verification and rollback for one alias
pub struct ReindexManager {
    indexer: ListingIndexer,
    backend: Arc<dyn SearchBackend>,
    repository: Arc<dyn CatalogRepository>,
    verifier: Arc<dyn IndexVerifier>,
    naming: IndexNaming,
    options: ReindexOptions,
    metrics: Arc<dyn MetricsSink>,
    progress: ProgressTracker,
    job: Mutex<()>,
}

impl ReindexManager {
    pub fn new(
        indexer: ListingIndexer,
        backend: Arc<dyn SearchBackend>,
        repository: Arc<dyn CatalogRepository>,
        verifier: Arc<dyn IndexVerifier>,
        options: ReindexOptions,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let naming = indexer.naming().clone();
        Self {
            indexer,
            backend,
            repository,
            verifier,
            naming,
            options,
            metrics,
            progress: ProgressTracker::new(),
            job: Mutex::new(()),
        }
    }

    pub fn naming(&self) -> &IndexNaming {
        &self.naming
    }

    /// Snapshot of the current or last run started through this manager.
    ///
    /// Progress lives in memory only; a fresh process reports `Idle`.
    pub fn progress(&self) -> ReindexProgress {
        self.progress.snapshot()
    }

    /// Live version from the alias, or from which index exists when the alias is missing
    pub async fn detect_active_version(&self, ctx: &JobContext) -> ReindexResult<ActiveVersion> {
        let bound = ctx.run(self.backend.get_alias(self.naming.alias())).await??;

        let version = match bound.as_slice() {
            [] => self.probe_existing(ctx).await?,
            [index] => self.naming.version_of(index).ok_or_else(|| {
                ReindexError::UnexpectedAliasBinding {
                    alias: self.naming.alias().to_string(),
                    bound: bound.clone(),
                }
            })?,
            _ => {
                return Err(ReindexError::UnexpectedAliasBinding {
                    alias: self.naming.alias().to_string(),
                    bound: bound.clone(),
                })
            }
        };

        Ok(ActiveVersion { version, bound })
    }

    async fn probe_existing(&self, ctx: &JobContext) -> ReindexResult<IndexVersion> {
        for version in IndexVersion::ALL {
            let index = self.naming.index_name(version);
            if ctx.run(self.backend.index_exists(&index)).await?? {
                info!(alias = self.naming.alias(), index = %index, "Alias missing, using existing index");
                return Ok(version);
            }
        }
        info!(alias = self.naming.alias(), "No index exists yet, first run");
        Ok(IndexVersion::V1)
    }

    /// Rebuild the inactive version and switch the alias to it.
    ///
    /// On any failure the alias is left as it was and the target index stays
    /// for inspection. Runs are never retried automatically.
    pub async fn run(&self, ctx: &JobContext) -> ReindexResult<ReindexOutcome> {
        let _job = self.job.try_lock().map_err(|_| ReindexError::AlreadyRunning)?;

        let run_id = Uuid::new_v4();
        self.progress.start(run_id);
        info!(%run_id, alias = self.naming.alias(), "Reindex started");

        let result = self.run_phases(ctx, run_id).await;
        match &result {
            Ok(outcome) => {
                self.progress.transition(ReindexState::Completed);
                self.metrics.record_reindex_outcome("completed");
                info!(
                    %run_id,
                    target = %outcome.target_index,
                    mode = %outcome.mode,
                    indexed = outcome.indexed,
                    "Reindex completed"
                );
            }
            Err(e) => {
                let state = match e {
                    ReindexError::VerificationFailed(_) => ReindexState::Aborted,
                    _ => ReindexState::Failed,
                };
                self.progress.fail(state, e.to_string());
                self.metrics.record_reindex_outcome(e.outcome_label());
                error!(%run_id, error = %e, "Reindex did not complete, alias unchanged");
            }
        }
        result
    }

    async fn run_phases(&self, ctx: &JobContext, run_id: Uuid) -> ReindexResult<ReindexOutcome> {
        let started_at = Utc::now();

        let phase = self.enter(ReindexState::DetectVersion);
        let active = self.detect_active_version(ctx).await?;
        let target_version = active.version.other();
        let source = self.naming.index_name(active.version);
        let target = self.naming.index_name(target_version);
        self.progress.set_indices(Some(source.clone()), target.clone());
        info!(source = %source, target = %target, "Versions resolved");
        self.leave(ReindexState::DetectVersion, phase);

        let phase = self.enter(ReindexState::CreateTarget);
        ctx.ensure_budget("create_target", self.options.min_phase_budget)?;
        if ctx.run(self.backend.index_exists(&target)).await?? {
            warn!(target = %target, "Deleting stale target index from an earlier run");
            ctx.run(self.backend.delete_index(&target)).await??;
        }
        ctx.run(self.backend.create_index(&target, &mapping::listing_index_body()))
            .await??;
        self.leave(ReindexState::CreateTarget, phase);

        let phase = self.enter(ReindexState::Populate);
        ctx.ensure_budget("populate", self.options.min_phase_budget)?;
        let (mode, indexed, failed) = if ctx.run(self.backend.index_exists(&source)).await?? {
            let summary = ctx.run(self.backend.reindex(&source, &target)).await??;
            self.progress.set_total(summary.total);
            self.progress.set_counts(summary.created + summary.updated, 0);
            (PopulateMode::ServerSideCopy, summary.created + summary.updated, 0)
        } else {
            let total = ctx.run(self.repository.count_eligible_listings()).await??;
            self.progress.set_total(total);
            let tracker = self.progress.clone();
            let stats = self
                .indexer
                .rebuild_into(
                    ctx,
                    &target,
                    self.options.batch_size,
                    self.options.min_phase_budget,
                    move |stats| tracker.set_counts(stats.indexed, stats.failed),
                )
                .await?;
            if stats.failed > 0 {
                warn!(target = %target, failed = stats.failed, "Full rebuild finished with failures");
            }
            (PopulateMode::FullRebuild, stats.indexed, stats.failed)
        };
        ctx.run(self.backend.refresh(&target)).await??;
        self.leave(ReindexState::Populate, phase);

        let phase = self.enter(ReindexState::Verify);
        let verification = self.verifier.verify(ctx, &target).await?;
        self.leave(ReindexState::Verify, phase);
        if !verification.valid {
            return Err(ReindexError::VerificationFailed(Box::new(verification)));
        }
        if let Ok(count) = ctx.run(self.backend.count(&target, None)).await? {
            self.metrics.set_index_documents(&target, count);
        }

        let phase = self.enter(ReindexState::SwitchAlias);
        ctx.check()?;
        let actions = self.naming.switch_actions(&active.bound, target_version);
        // One request; never raced against cancellation
        self.backend.update_aliases(&actions).await?;
        info!(alias = self.naming.alias(), from = ?active.bound, to = %target, "Alias switched");
        self.leave(ReindexState::SwitchAlias, phase);

        Ok(ReindexOutcome {
            run_id,
            alias: self.naming.alias().to_string(),
            source_index: source,
            target_index: target,
            target_version,
            mode,
            indexed,
            failed,
            verification,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn enter(&self, state: ReindexState) -> Instant {
        self.progress.transition(state);
        info!(state = %state, "Reindex phase started");
        Instant::now()
    }

    fn leave(&self, state: ReindexState, started: Instant) {
        self.metrics
            .record_phase_duration(&state.to_string(), started.elapsed());
    }

    /// Bind the alias back to `target` (`v1`, `v2` or an index name).
    ///
    /// Fails without touching the alias when the target index no longer exists.
    pub async fn rollback(&self, ctx: &JobContext, target: &str) -> ReindexResult<RollbackOutcome> {
        let version = self.naming.parse_version(target)?;
        let index = self.naming.index_name(version);

        if !ctx.run(self.backend.index_exists(&index)).await?? {
            error!(index = %index, "Rollback target does not exist");
            return Err(ReindexError::RollbackTargetMissing(index));
        }

        let previous = ctx.run(self.backend.get_alias(self.naming.alias())).await??;
        if previous.len() == 1 && previous[0] == index {
            info!(index = %index, "Alias already bound to rollback target");
            return Ok(RollbackOutcome {
                alias: self.naming.alias().to_string(),
                previous,
                target_index: index,
                switched: false,
            });
        }

        ctx.check()?;
        let actions = self.naming.switch_actions(&previous, version);
        self.backend.update_aliases(&actions).await?;
        self.metrics.record_reindex_outcome("rolled_back");
        info!(alias = self.naming.alias(), from = ?previous, to = %index, "Alias rolled back");

        Ok(RollbackOutcome {
            alias: self.naming.alias().to_string(),
            previous,
            target_index: index,
            switched: true,
        })
    }

    /// Verify the live index (`current`/`None`) or an explicit version
    pub async fn verify(&self, ctx: &JobContext, target: Option<&str>) -> ReindexResult<VerificationResult> {
        let index = match target.map(str::trim) {
            None | Some("current") => {
                let active = self.detect_active_version(ctx).await?;
                self.naming.index_name(active.version)
            }
            Some(explicit) => self.naming.index_name(self.naming.parse_version(explicit)?),
        };

        if !ctx.run(self.backend.index_exists(&index)).await?? {
            return Err(crate::search::SearchError::IndexNotFound(index).into());
        }
        self.verifier.verify(ctx, &index).await
    }

    /// Alias binding plus existence and size of both versions
    pub async fn status(&self, ctx: &JobContext) -> ReindexResult<IndexStatus> {
        let bound = ctx.run(self.backend.get_alias(self.naming.alias())).await??;

        let mut versions = Vec::with_capacity(IndexVersion::ALL.len());
        for version in IndexVersion::ALL {
            let index = self.naming.index_name(version);
            let exists = ctx.run(self.backend.index_exists(&index)).await??;
            let documents = if exists {
                Some(ctx.run(self.backend.count(&index, None)).await??)
            } else {
                None
            };
            versions.push(VersionStatus {
                version,
                active: bound.contains(&index),
                index,
                exists,
                documents,
            });
        }

        Ok(IndexStatus {
            alias: self.naming.alias().to_string(),
            bound,
            versions,
        })
    }
}
