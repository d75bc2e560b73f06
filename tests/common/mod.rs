//! Shared fixtures for integration tests
//!
//! Wires the cache store, indexer and reindex manager against the in-memory
//! catalog and search backend.

#![allow(dead_code)]

use catalog_indexer::{
    attributes::{AttributeCacheBuilder, AttributeCacheStore, LocalePreference},
    metrics::{MetricsSink, NoopMetrics},
    models::{AttributeDefinition, AttributeValue, Listing},
    reindex::{IndexVerifier, ReindexManager, ReindexOptions, ReindexVerifier},
    search::{IndexNaming, InMemorySearchBackend, ListingIndexer, SearchBackend},
    state::{CatalogRepository, InMemoryCatalog},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const ALIAS: &str = "marketplace_listings";

pub struct Harness {
    pub catalog: InMemoryCatalog,
    pub backend: InMemorySearchBackend,
    pub repository: Arc<dyn CatalogRepository>,
    pub cache: AttributeCacheStore,
    pub indexer: ListingIndexer,
    pub metrics: Arc<dyn MetricsSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_metrics(NoopMetrics::shared())
    }

    pub fn with_metrics(metrics: Arc<dyn MetricsSink>) -> Self {
        Self::with_repository(metrics, |catalog| Arc::new(catalog) as Arc<dyn CatalogRepository>)
    }

    /// Harness whose components read the catalog through `wrap`
    pub fn with_repository<F>(metrics: Arc<dyn MetricsSink>, wrap: F) -> Self
    where
        F: FnOnce(InMemoryCatalog) -> Arc<dyn CatalogRepository>,
    {
        let catalog = InMemoryCatalog::new();
        let repository = wrap(catalog.clone());
        let backend = InMemorySearchBackend::new();

        let builder = AttributeCacheBuilder::new(repository.clone(), LocalePreference::default());
        let cache = AttributeCacheStore::new(repository.clone(), builder, metrics.clone());
        let indexer = ListingIndexer::new(
            repository.clone(),
            cache.clone(),
            Arc::new(backend.clone()),
            IndexNaming::new(ALIAS),
            metrics.clone(),
        );

        Self {
            catalog,
            backend,
            repository,
            cache,
            indexer,
            metrics,
        }
    }

    pub fn naming(&self) -> IndexNaming {
        IndexNaming::new(ALIAS)
    }

    pub fn search_backend(&self) -> Arc<dyn SearchBackend> {
        Arc::new(self.backend.clone())
    }

    pub fn verifier(&self, sanity_queries: &[&str]) -> ReindexVerifier {
        ReindexVerifier::new(
            self.repository.clone(),
            self.search_backend(),
            sanity_queries.iter().map(|q| q.to_string()).collect(),
            self.metrics.clone(),
        )
    }

    /// Manager with the standard verifier and no phase budget floor
    pub fn manager(&self) -> ReindexManager {
        self.manager_with_verifier(Arc::new(self.verifier(&["telefon"])))
    }

    pub fn manager_with_verifier(&self, verifier: Arc<dyn IndexVerifier>) -> ReindexManager {
        ReindexManager::new(
            self.indexer.clone(),
            self.search_backend(),
            self.repository.clone(),
            verifier,
            ReindexOptions {
                batch_size: 4,
                min_phase_budget: Duration::ZERO,
            },
            self.metrics.clone(),
        )
    }

    /// Insert `count` eligible listings with ids `1..=count`
    pub fn seed_listings(&self, count: i64) {
        for id in 1..=count {
            let title = if id % 2 == 0 {
                format!("Telefon {}", id)
            } else {
                format!("Patike {}", id)
            };
            self.catalog
                .insert_listing(Listing::new(id, title, 100.0 + id as f64, "electronics"));
        }
    }

    /// Brand (text, searchable and filterable), price (number, filterable)
    /// and used (boolean, unflagged)
    pub fn seed_definitions(&self) {
        self.catalog.insert_definition(
            AttributeDefinition::new(1, "brand")
                .with_name("en", "Brand")
                .with_name("sr", "Marka")
                .searchable(true)
                .filterable(true),
        );
        self.catalog.insert_definition(
            AttributeDefinition::new(2, "price")
                .with_name("en", "Price")
                .filterable(true)
                .with_sort_order(1),
        );
        self.catalog.insert_definition(
            AttributeDefinition::new(3, "used")
                .with_name("en", "Used")
                .with_sort_order(2),
        );
    }

    pub fn seed_values(&self, entity_id: i64, brand: &str, price: f64, used: bool) {
        self.catalog.set_value(AttributeValue::new(entity_id, 1, brand));
        self.catalog.set_value(AttributeValue::new(entity_id, 2, price));
        self.catalog.set_value(AttributeValue::new(entity_id, 3, used));
    }
}

/// Parse Prometheus exposition text into metric name -> sample lines
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics: HashMap<String, Vec<String>> = HashMap::new();

    for line in output.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let name = line
            .split(|c| c == '{' || c == ' ')
            .next()
            .unwrap_or_default()
            .to_string();
        metrics.entry(name).or_default().push(line.to_string());
    }

    metrics
}
