//! Keeps search documents in step with the relational store

use crate::attributes::AttributeCacheStore;
use crate::context::{Interrupted, JobContext};
use crate::error::{AppError, Result};
use crate::metrics::MetricsSink;
use crate::models::Listing;
use crate::search::backend::{BulkOutcome, SearchBackend};
use crate::search::{DocumentAssembler, IndexNaming, ListingDocument};
use crate::state::CatalogRepository;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Listings per bulk request when none is given
pub const DEFAULT_REBUILD_BATCH_SIZE: usize = 500;

/// Counters of a full rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildStats {
    pub batches: u64,
    pub indexed: u64,
    pub failed: u64,
}

/// Why a full rebuild stopped early
#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    #[error(transparent)]
    Repository(#[from] AppError),
}

impl From<RebuildError> for AppError {
    fn from(err: RebuildError) -> Self {
        match err {
            RebuildError::Interrupted(e) => e.into(),
            RebuildError::Repository(e) => e,
        }
    }
}

/// Result of indexing one listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed,
    /// Listing exists but is not eligible for search; its document was removed
    Removed,
}

/// Assembles listings with their attribute cache and writes them to the index
#[derive(Clone)]
pub struct ListingIndexer {
    repository: Arc<dyn CatalogRepository>,
    cache: AttributeCacheStore,
    backend: Arc<dyn SearchBackend>,
    naming: IndexNaming,
    metrics: Arc<dyn MetricsSink>,
    reference_time: Option<DateTime<Utc>>,
}

impl ListingIndexer {
    pub fn new(
        repository: Arc<dyn CatalogRepository>,
        cache: AttributeCacheStore,
        backend: Arc<dyn SearchBackend>,
        naming: IndexNaming,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            repository,
            cache,
            backend,
            naming,
            metrics,
            reference_time: None,
        }
    }

    /// Pin time-dependent document fields to `reference_time` instead of the
    /// moment each write starts
    pub fn with_reference_time(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = Some(reference_time);
        self
    }

    fn assembler(&self) -> DocumentAssembler {
        self.reference_time
            .map_or_else(DocumentAssembler::now, DocumentAssembler::new)
    }

    pub fn naming(&self) -> &IndexNaming {
        &self.naming
    }

    /// Assemble one listing and upsert it into the alias
    pub async fn index_listing(&self, id: i64) -> Result<IndexOutcome> {
        let listing = self
            .repository
            .get_listing(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("listing {}", id)))?;

        if !listing.is_eligible() {
            self.delete_listing(id).await?;
            debug!(listing_id = id, "Listing not eligible, document removed");
            return Ok(IndexOutcome::Removed);
        }

        let document = self.assemble(&self.assembler(), &listing).await;
        self.backend
            .upsert_document(self.naming.alias(), &document)
            .await?;
        self.metrics
            .record_documents_indexed(self.naming.alias(), 1, 0);

        info!(listing_id = id, index = self.naming.alias(), "Listing indexed");
        Ok(IndexOutcome::Indexed)
    }

    /// Remove one listing's document; a missing document is not an error
    pub async fn delete_listing(&self, id: i64) -> Result<bool> {
        let removed = self
            .backend
            .delete_document(self.naming.alias(), &id.to_string())
            .await?;
        debug!(listing_id = id, removed, "Listing document deleted");
        Ok(removed)
    }

    /// Assemble and bulk-write listings into the alias.
    ///
    /// Listings that are not eligible for search are not written; they are
    /// reported in `skipped`.
    pub async fn bulk_index(&self, listings: &[Listing]) -> Result<BulkOutcome> {
        let (eligible, ineligible): (Vec<&Listing>, Vec<&Listing>) =
            listings.iter().partition(|listing| listing.is_eligible());

        let mut outcome = if eligible.is_empty() {
            BulkOutcome::default()
        } else {
            let eligible: Vec<Listing> = eligible.into_iter().cloned().collect();
            self.bulk_index_into(&self.assembler(), self.naming.alias(), &eligible)
                .await?
        };

        for listing in ineligible {
            debug!(listing_id = listing.id, "Listing not eligible, left out of bulk request");
            outcome
                .skipped
                .push((listing.id.to_string(), "not eligible for search".to_string()));
        }
        Ok(outcome)
    }

    async fn bulk_index_into(
        &self,
        assembler: &DocumentAssembler,
        index: &str,
        listings: &[Listing],
    ) -> Result<BulkOutcome> {
        let mut documents = Vec::with_capacity(listings.len());
        for listing in listings {
            documents.push(self.assemble(assembler, listing).await);
        }

        match self.backend.bulk_upsert(index, &documents).await {
            Ok(outcome) => {
                self.metrics.record_documents_indexed(
                    index,
                    outcome.indexed,
                    outcome.skipped.len() as u64,
                );
                Ok(outcome)
            }
            Err(e) => {
                self.metrics
                    .record_documents_indexed(index, 0, listings.len() as u64);
                Err(e.into())
            }
        }
    }

    /// Stream every eligible listing from the store into `index`.
    ///
    /// Pages are keyed by listing id. The context budget is checked before
    /// each batch; a failed bulk request counts its listings as failed and the
    /// rebuild moves on, as do rows the store could not map. `on_batch` sees
    /// the running totals after each batch.
    pub async fn rebuild_into<F>(
        &self,
        ctx: &JobContext,
        index: &str,
        batch_size: usize,
        min_batch_budget: Duration,
        mut on_batch: F,
    ) -> std::result::Result<RebuildStats, RebuildError>
    where
        F: FnMut(&RebuildStats) + Send,
    {
        let batch_size = if batch_size == 0 {
            DEFAULT_REBUILD_BATCH_SIZE
        } else {
            batch_size
        };
        let assembler = self.assembler();
        let mut stats = RebuildStats::default();
        let mut after_id = 0;

        loop {
            ctx.ensure_budget("rebuild batch", min_batch_budget)?;

            let page = ctx
                .run(self.repository.list_eligible_listings(after_id, batch_size))
                .await??;
            let Some(last_id) = page.last_id else {
                break;
            };
            after_id = last_id;
            stats.batches += 1;

            let unreadable = page.skipped() as u64;
            if unreadable > 0 {
                warn!(index, batch = stats.batches, unreadable, "Listings could not be read from the store");
                self.metrics.record_documents_indexed(index, 0, unreadable);
                stats.failed += unreadable;
            }

            if !page.listings.is_empty() {
                match ctx
                    .run(self.bulk_index_into(&assembler, index, &page.listings))
                    .await?
                {
                    Ok(outcome) => {
                        stats.indexed += outcome.indexed;
                        stats.failed += outcome.skipped.len() as u64;
                    }
                    Err(e) => {
                        warn!(index, batch = stats.batches, listings = page.listings.len(), error = %e, "Bulk batch failed");
                        stats.failed += page.listings.len() as u64;
                    }
                }
            }

            debug!(
                index,
                batch = stats.batches,
                indexed = stats.indexed,
                failed = stats.failed,
                "Rebuild batch done"
            );
            on_batch(&stats);

            if page.is_last(batch_size) {
                break;
            }
        }

        info!(
            index,
            batches = stats.batches,
            indexed = stats.indexed,
            failed = stats.failed,
            "Full rebuild finished"
        );
        Ok(stats)
    }

    async fn assemble(&self, assembler: &DocumentAssembler, listing: &Listing) -> ListingDocument {
        let cache = match self.cache.find(listing.id).await {
            Ok(entry) => {
                if entry.is_none() {
                    debug!(listing_id = listing.id, "No attribute cache entry");
                }
                entry
            }
            Err(e) => {
                warn!(listing_id = listing.id, error = %e, "Attribute cache unreadable, indexing without attributes");
                None
            }
        };
        assembler.assemble(listing, cache.as_ref())
    }
}
