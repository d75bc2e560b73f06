//! Metrics for cache population, indexing and reindex runs.
//!
//! Components receive an `Arc<dyn MetricsSink>` instead of touching a global
//! registry. [`NoopMetrics`] is used by tests and when Prometheus is disabled;
//! [`PrometheusMetrics`] owns its own [`Registry`] and renders the text
//! exposition format on demand.

use crate::error::{AppError, Result};
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const NAMESPACE: &str = "catalog_indexer";

/// Receiver for operational measurements
pub trait MetricsSink: Send + Sync {
    /// One attribute cache upsert finished
    fn record_cache_upsert(&self, success: bool);

    /// A bulk write to `index` finished
    fn record_documents_indexed(&self, index: &str, indexed: u64, failed: u64);

    /// A reindex phase finished
    fn record_phase_duration(&self, phase: &str, duration: Duration);

    /// A reindex run ended (`completed`, `verification_failed`, `failed`, `rolled_back`)
    fn record_reindex_outcome(&self, outcome: &str);

    fn record_verification(&self, valid: bool);

    /// Document count of a physical index after population
    fn set_index_documents(&self, index: &str, count: u64);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl NoopMetrics {
    pub fn shared() -> Arc<dyn MetricsSink> {
        Arc::new(NoopMetrics)
    }
}

impl MetricsSink for NoopMetrics {
    fn record_cache_upsert(&self, _success: bool) {}
    fn record_documents_indexed(&self, _index: &str, _indexed: u64, _failed: u64) {}
    fn record_phase_duration(&self, _phase: &str, _duration: Duration) {}
    fn record_reindex_outcome(&self, _outcome: &str) {}
    fn record_verification(&self, _valid: bool) {}
    fn set_index_documents(&self, _index: &str, _count: u64) {}
}

/// Prometheus-backed sink with a private registry
pub struct PrometheusMetrics {
    registry: Registry,
    cache_upserts: CounterVec,
    documents: CounterVec,
    phase_duration: HistogramVec,
    reindex_runs: CounterVec,
    verifications: CounterVec,
    index_documents: IntGaugeVec,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let cache_upserts = CounterVec::new(
            Opts::new("attribute_cache_upserts_total", "Attribute cache upserts by result")
                .namespace(NAMESPACE),
            &["result"],
        )
        .map_err(metrics_error)?;

        let documents = CounterVec::new(
            Opts::new("documents_indexed_total", "Documents written to the search engine")
                .namespace(NAMESPACE),
            &["index", "result"],
        )
        .map_err(metrics_error)?;

        let phase_duration = HistogramVec::new(
            HistogramOpts::new("reindex_phase_duration_seconds", "Duration of reindex phases")
                .namespace(NAMESPACE)
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
            &["phase"],
        )
        .map_err(metrics_error)?;

        let reindex_runs = CounterVec::new(
            Opts::new("reindex_runs_total", "Reindex runs by outcome").namespace(NAMESPACE),
            &["outcome"],
        )
        .map_err(metrics_error)?;

        let verifications = CounterVec::new(
            Opts::new("reindex_verifications_total", "Index verifications by result")
                .namespace(NAMESPACE),
            &["result"],
        )
        .map_err(metrics_error)?;

        let index_documents = IntGaugeVec::new(
            Opts::new("index_documents", "Documents in a physical index").namespace(NAMESPACE),
            &["index"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(cache_upserts.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(documents.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(phase_duration.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(reindex_runs.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(verifications.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(index_documents.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            cache_upserts,
            documents,
            phase_duration,
            reindex_runs,
            verifications,
            index_documents,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Export metrics in Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| AppError::Internal(e.to_string()))
    }

    /// Write the exposition to a node-exporter textfile, replacing it atomically
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, rendered)?;
        std::fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), "Metrics textfile written");
        Ok(())
    }
}

fn metrics_error(err: prometheus::Error) -> AppError {
    AppError::Internal(format!("metrics: {}", err))
}

fn result_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

impl MetricsSink for PrometheusMetrics {
    fn record_cache_upsert(&self, success: bool) {
        self.cache_upserts
            .with_label_values(&[result_label(success)])
            .inc();
    }

    fn record_documents_indexed(&self, index: &str, indexed: u64, failed: u64) {
        self.documents
            .with_label_values(&[index, "success"])
            .inc_by(indexed as f64);
        self.documents
            .with_label_values(&[index, "failure"])
            .inc_by(failed as f64);
    }

    fn record_phase_duration(&self, phase: &str, duration: Duration) {
        self.phase_duration
            .with_label_values(&[phase])
            .observe(duration.as_secs_f64());
    }

    fn record_reindex_outcome(&self, outcome: &str) {
        self.reindex_runs.with_label_values(&[outcome]).inc();
    }

    fn record_verification(&self, valid: bool) {
        let label = if valid { "valid" } else { "invalid" };
        self.verifications.with_label_values(&[label]).inc();
    }

    fn set_index_documents(&self, index: &str, count: u64) {
        self.index_documents
            .with_label_values(&[index])
            .set(count.min(i64::MAX as u64) as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_series() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_cache_upsert(true);
        metrics.record_cache_upsert(false);
        metrics.record_documents_indexed("marketplace_listings_v2", 10, 1);
        metrics.record_reindex_outcome("completed");
        metrics.record_phase_duration("populate", Duration::from_millis(1500));

        let text = metrics.render().unwrap();
        assert!(text.contains("catalog_indexer_attribute_cache_upserts_total{result=\"success\"} 1"));
        assert!(text.contains("catalog_indexer_documents_indexed_total{index=\"marketplace_listings_v2\",result=\"success\"} 10"));
        assert!(text.contains("catalog_indexer_reindex_runs_total{outcome=\"completed\"} 1"));
        assert!(text.contains("catalog_indexer_reindex_phase_duration_seconds_count{phase=\"populate\"} 1"));
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let first = PrometheusMetrics::new().unwrap();
        let second = PrometheusMetrics::new().unwrap();
        first.record_verification(false);

        assert!(first.render().unwrap().contains("result=\"invalid\"} 1"));
        assert!(!second.render().unwrap().contains("result=\"invalid\"} 1"));
    }

    #[test]
    fn test_write_textfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog_indexer.prom");

        let metrics = PrometheusMetrics::new().unwrap();
        metrics.set_index_documents("marketplace_listings_v1", 42);
        metrics.write_textfile(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("catalog_indexer_index_documents{index=\"marketplace_listings_v1\"} 42"));
    }

    #[test]
    fn test_noop_accepts_everything() {
        let sink = NoopMetrics::shared();
        sink.record_cache_upsert(true);
        sink.record_documents_indexed("x", 1, 0);
        sink.record_verification(true);
    }
}
