//! Correctness gate run against a freshly populated index before it goes live

use crate::context::JobContext;
use crate::metrics::MetricsSink;
use crate::reindex::ReindexResult;
use crate::search::SearchBackend;
use crate::state::CatalogRepository;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Target must hold at least this share of the expected documents
pub const MIN_VOLUME_RATIO: f64 = 0.95;

/// Every critical field must be present in at least this percentage of documents
pub const MIN_FIELD_COVERAGE_PERCENT: f64 = 99.0;

/// Fields every listing document must carry
pub const CRITICAL_FIELDS: [&str; 4] = ["title", "price", "category_id", "status"];

/// Findings of one verification pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub index: String,
    pub valid: bool,
    pub total_docs: u64,
    pub expected_docs: u64,

    /// Expected documents missing from the index
    pub mismatched_count: u64,

    /// Percentage of documents carrying each critical field
    pub field_coverage: BTreeMap<String, f64>,

    /// Hits per sanity query
    pub sanity_hits: BTreeMap<String, u64>,

    /// Everything that made the result invalid
    pub sample_errors: Vec<String>,

    /// Findings that do not affect validity
    pub warnings: Vec<String>,
}

impl VerificationResult {
    fn new(index: &str) -> Self {
        Self {
            index: index.to_string(),
            valid: true,
            total_docs: 0,
            expected_docs: 0,
            mismatched_count: 0,
            field_coverage: BTreeMap::new(),
            sanity_hits: BTreeMap::new(),
            sample_errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn reject(&mut self, finding: String) {
        self.valid = false;
        self.sample_errors.push(finding);
    }

    /// Target count as a percentage of the expected count
    pub fn volume_percent(&self) -> f64 {
        if self.expected_docs == 0 {
            return 100.0;
        }
        self.total_docs as f64 / self.expected_docs as f64 * 100.0
    }
}

/// Decides whether an index may replace the live one
#[async_trait]
pub trait IndexVerifier: Send + Sync {
    /// Run every check against `index` and return all findings.
    ///
    /// Only interruption is an error; failed checks are findings.
    async fn verify(&self, ctx: &JobContext, index: &str) -> ReindexResult<VerificationResult>;
}

/// Volume, field coverage and sanity query checks
pub struct ReindexVerifier {
    repository: Arc<dyn CatalogRepository>,
    backend: Arc<dyn SearchBackend>,
    sanity_queries: Vec<String>,
    metrics: Arc<dyn MetricsSink>,
}

impl ReindexVerifier {
    pub fn new(
        repository: Arc<dyn CatalogRepository>,
        backend: Arc<dyn SearchBackend>,
        sanity_queries: Vec<String>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            repository,
            backend,
            sanity_queries,
            metrics,
        }
    }

    async fn check_volume(&self, ctx: &JobContext, result: &mut VerificationResult) -> ReindexResult<bool> {
        let expected = match ctx.run(self.repository.count_eligible_listings()).await? {
            Ok(count) => count,
            Err(e) => {
                result.reject(format!("could not count eligible listings: {}", e));
                return Ok(false);
            }
        };
        let total = match ctx.run(self.backend.count(&result.index, None)).await? {
            Ok(count) => count,
            Err(e) => {
                result.reject(format!("could not count documents in {}: {}", result.index, e));
                return Ok(false);
            }
        };

        result.expected_docs = expected;
        result.total_docs = total;
        result.mismatched_count = expected.saturating_sub(total);

        if expected > 0 && (total as f64) < expected as f64 * MIN_VOLUME_RATIO {
            result.reject(format!(
                "document count too low: expected {}, got {} ({:.2}%)",
                expected,
                total,
                result.volume_percent()
            ));
        }
        Ok(true)
    }

    async fn check_field_coverage(
        &self,
        ctx: &JobContext,
        result: &mut VerificationResult,
    ) -> ReindexResult<()> {
        if result.total_docs == 0 {
            result
                .warnings
                .push("index is empty, field coverage not checked".to_string());
            return Ok(());
        }

        for field in CRITICAL_FIELDS {
            let present = match ctx
                .run(self.backend.count_field_exists(&result.index, field))
                .await?
            {
                Ok(count) => count,
                Err(e) => {
                    result.reject(format!("could not count field {}: {}", field, e));
                    continue;
                }
            };

            let coverage = present as f64 / result.total_docs as f64 * 100.0;
            result.field_coverage.insert(field.to_string(), coverage);
            if coverage < MIN_FIELD_COVERAGE_PERCENT {
                result.reject(format!("field {} coverage too low: {:.2}%", field, coverage));
            }
        }
        Ok(())
    }

    async fn check_sanity_queries(
        &self,
        ctx: &JobContext,
        result: &mut VerificationResult,
    ) -> ReindexResult<()> {
        for query in &self.sanity_queries {
            match ctx
                .run(self.backend.sample_query(&result.index, query))
                .await?
            {
                Ok(hits) => {
                    if hits == 0 {
                        warn!(index = %result.index, query = %query, "Sanity query returned no hits");
                        result
                            .warnings
                            .push(format!("sanity query '{}' returned no hits", query));
                    }
                    result.sanity_hits.insert(query.clone(), hits);
                }
                Err(e) => result.reject(format!("sanity query '{}' failed: {}", query, e)),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IndexVerifier for ReindexVerifier {
    async fn verify(&self, ctx: &JobContext, index: &str) -> ReindexResult<VerificationResult> {
        let mut result = VerificationResult::new(index);

        if self.check_volume(ctx, &mut result).await? {
            self.check_field_coverage(ctx, &mut result).await?;
        }
        self.check_sanity_queries(ctx, &mut result).await?;

        self.metrics.record_verification(result.valid);
        if result.valid {
            info!(
                index,
                total = result.total_docs,
                expected = result.expected_docs,
                warnings = result.warnings.len(),
                "Verification passed"
            );
        } else {
            error!(
                index,
                total = result.total_docs,
                expected = result.expected_docs,
                errors = ?result.sample_errors,
                "Verification failed"
            );
        }
        Ok(result)
    }
}
