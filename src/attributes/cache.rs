use crate::attributes::{AttributeCacheBuilder, CacheError, CacheResult};
use crate::context::JobContext;
use crate::metrics::MetricsSink;
use crate::models::{AttributeCacheEntry, AttributeForIndex};
use crate::state::{CacheRow, CatalogRepository};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Version stamped on every cache row; bump when the payload layout changes
pub const CACHE_FORMAT_VERSION: i32 = 1;

/// Batch size used by [`AttributeCacheStore::populate_all`] when none is given
pub const DEFAULT_POPULATE_BATCH_SIZE: usize = 100;

/// Error messages kept per report
const MAX_REPORTED_ERRORS: usize = 20;

/// Outcome of a bulk upsert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkUpsertReport {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,

    /// First failures as (entity id, message)
    pub errors: Vec<(i64, String)>,
}

impl BulkUpsertReport {
    fn record_failure(&mut self, entity_id: i64, message: String) {
        self.failed += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push((entity_id, message));
        }
    }

    fn merge(&mut self, other: BulkUpsertReport) {
        self.requested += other.requested;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        let room = MAX_REPORTED_ERRORS.saturating_sub(self.errors.len());
        self.errors.extend(other.errors.into_iter().take(room));
    }

    pub fn summary(&self) -> String {
        format!(
            "{}/{} succeeded, {} failed",
            self.succeeded, self.requested, self.failed
        )
    }

    fn into_result(self) -> CacheResult<BulkUpsertReport> {
        if self.failed > 0 {
            Err(CacheError::PartialFailure(self))
        } else {
            Ok(self)
        }
    }
}

/// Persists built attributes keyed by entity id
#[derive(Clone)]
pub struct AttributeCacheStore {
    repository: Arc<dyn CatalogRepository>,
    builder: AttributeCacheBuilder,
    metrics: Arc<dyn MetricsSink>,
}

impl AttributeCacheStore {
    pub fn new(
        repository: Arc<dyn CatalogRepository>,
        builder: AttributeCacheBuilder,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            repository,
            builder,
            metrics,
        }
    }

    /// Rebuild and store the cache row for one entity
    pub async fn upsert(&self, entity_id: i64) -> CacheResult<AttributeCacheEntry> {
        let result = self.upsert_inner(entity_id).await;
        self.metrics.record_cache_upsert(result.is_ok());
        result
    }

    async fn upsert_inner(&self, entity_id: i64) -> CacheResult<AttributeCacheEntry> {
        let built = self.builder.build(entity_id).await?;

        let row = CacheRow {
            entity_id,
            attributes_flat: serde_json::to_string(&built.flat)?,
            attributes_searchable: built.searchable.clone(),
            attributes_filterable: serde_json::to_string(&built.filterable)?,
            cache_version: CACHE_FORMAT_VERSION,
            last_updated: Utc::now(),
        };
        self.repository.upsert_cache_row(&row).await?;

        debug!(entity_id, attributes = built.flat.len(), "Attribute cache updated");

        Ok(AttributeCacheEntry {
            entity_id,
            attributes_flat: built.flat,
            attributes_searchable: built.searchable,
            attributes_filterable: built.filterable,
            cache_version: row.cache_version,
            last_updated: row.last_updated,
        })
    }

    /// Stored entry; `NotFound` when the entity has never been cached
    pub async fn get(&self, entity_id: i64) -> CacheResult<AttributeCacheEntry> {
        self.find(entity_id)
            .await?
            .ok_or(CacheError::NotFound(entity_id))
    }

    /// Stored flat attribute list
    pub async fn get_attributes(&self, entity_id: i64) -> CacheResult<Vec<AttributeForIndex>> {
        Ok(self.get(entity_id).await?.attributes_flat)
    }

    /// Stored entry, if any
    pub async fn find(&self, entity_id: i64) -> CacheResult<Option<AttributeCacheEntry>> {
        let Some(row) = self.repository.get_cache_row(entity_id).await? else {
            return Ok(None);
        };

        Ok(Some(AttributeCacheEntry {
            entity_id: row.entity_id,
            attributes_flat: serde_json::from_str(&row.attributes_flat)?,
            attributes_searchable: row.attributes_searchable,
            attributes_filterable: serde_json::from_str(&row.attributes_filterable)?,
            cache_version: row.cache_version,
            last_updated: row.last_updated,
        }))
    }

    /// Remove the row as part of entity lifecycle cleanup; idempotent
    pub async fn delete(&self, entity_id: i64) -> CacheResult<bool> {
        let removed = self.repository.delete_cache_row(entity_id).await?;
        debug!(entity_id, removed, "Attribute cache row deleted");
        Ok(removed)
    }

    /// Mark the entry stale by removing it; the next upsert rebuilds it
    pub async fn invalidate(&self, entity_id: i64) -> CacheResult<bool> {
        self.delete(entity_id).await
    }

    /// Invalidate several entries, returning how many rows existed
    pub async fn invalidate_many(&self, entity_ids: &[i64]) -> CacheResult<usize> {
        let mut removed = 0;
        for &entity_id in entity_ids {
            if self.delete(entity_id).await? {
                removed += 1;
            }
        }
        debug!(requested = entity_ids.len(), removed, "Attribute cache rows invalidated");
        Ok(removed)
    }

    /// Upsert each entity, continuing past failures.
    ///
    /// Returns `PartialFailure` carrying the report when any entity failed.
    pub async fn bulk_upsert(&self, entity_ids: &[i64]) -> CacheResult<BulkUpsertReport> {
        self.upsert_batch(entity_ids).await.into_result()
    }

    async fn upsert_batch(&self, entity_ids: &[i64]) -> BulkUpsertReport {
        let mut report = BulkUpsertReport {
            requested: entity_ids.len(),
            ..Default::default()
        };

        for &entity_id in entity_ids {
            match self.upsert(entity_id).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    warn!(entity_id, error = %e, "Attribute cache upsert failed");
                    report.record_failure(entity_id, e.to_string());
                }
            }
        }

        report
    }

    /// Cache every entity that has attribute values and still exists.
    ///
    /// Cancellation is checked between batches. A `batch_size` of 0 uses
    /// [`DEFAULT_POPULATE_BATCH_SIZE`].
    pub async fn populate_all(
        &self,
        ctx: &JobContext,
        batch_size: usize,
    ) -> CacheResult<BulkUpsertReport> {
        let batch_size = if batch_size == 0 {
            DEFAULT_POPULATE_BATCH_SIZE
        } else {
            batch_size
        };

        let entity_ids = ctx.run(self.repository.entity_ids_with_attributes()).await??;
        let batches = entity_ids.len().div_ceil(batch_size);
        info!(
            entities = entity_ids.len(),
            batch_size, batches, "Populating attribute cache"
        );

        let mut total = BulkUpsertReport::default();
        for (batch, chunk) in entity_ids.chunks(batch_size).enumerate() {
            ctx.check()?;

            let report = self.upsert_batch(chunk).await;
            info!(
                batch = batch + 1,
                batches,
                succeeded = report.succeeded,
                failed = report.failed,
                "Attribute cache batch done"
            );
            total.merge(report);
        }

        info!(summary = %total.summary(), "Attribute cache population finished");
        total.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_caps_errors() {
        let mut report = BulkUpsertReport::default();
        for id in 0..50 {
            report.record_failure(id, "boom".to_string());
        }
        assert_eq!(report.failed, 50);
        assert_eq!(report.errors.len(), MAX_REPORTED_ERRORS);
    }

    #[test]
    fn test_merge_accumulates_counts() {
        let mut total = BulkUpsertReport {
            requested: 2,
            succeeded: 2,
            ..Default::default()
        };
        let mut batch = BulkUpsertReport {
            requested: 3,
            succeeded: 2,
            ..Default::default()
        };
        batch.record_failure(9, "scan failed".to_string());

        total.merge(batch);
        assert_eq!(total.requested, 5);
        assert_eq!(total.succeeded, 4);
        assert_eq!(total.failed, 1);
        assert_eq!(total.errors, vec![(9, "scan failed".to_string())]);
        assert_eq!(total.summary(), "4/5 succeeded, 1 failed");
    }

    #[test]
    fn test_clean_report_is_ok() {
        let report = BulkUpsertReport {
            requested: 1,
            succeeded: 1,
            ..Default::default()
        };
        assert!(report.into_result().is_ok());
    }
}
