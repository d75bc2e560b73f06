mod common;

use async_trait::async_trait;
use catalog_indexer::{
    attributes::{
        AttributeCacheBuilder, AttributeCacheStore, CacheError, LocalePreference,
        CACHE_FORMAT_VERSION,
    },
    context::{Interrupted, JobContext},
    error::{AppError, Result},
    metrics::NoopMetrics,
    models::{AttributeRow, Listing},
    state::{CacheRow, CatalogRepository, InMemoryCatalog, ListingPage},
};
use common::Harness;
use std::collections::HashSet;
use std::sync::Arc;

/// Catalog whose attribute reads fail for selected entities
struct FlakyCatalog {
    inner: InMemoryCatalog,
    failing: HashSet<i64>,
}

#[async_trait]
impl CatalogRepository for FlakyCatalog {
    async fn get_listing(&self, id: i64) -> Result<Option<Listing>> {
        self.inner.get_listing(id).await
    }

    async fn list_eligible_listings(&self, after_id: i64, limit: usize) -> Result<ListingPage> {
        self.inner.list_eligible_listings(after_id, limit).await
    }

    async fn count_eligible_listings(&self) -> Result<u64> {
        self.inner.count_eligible_listings().await
    }

    async fn attribute_rows(&self, entity_id: i64) -> Result<Vec<AttributeRow>> {
        if self.failing.contains(&entity_id) {
            return Err(AppError::Database(format!("connection reset reading {}", entity_id)));
        }
        self.inner.attribute_rows(entity_id).await
    }

    async fn entity_ids_with_attributes(&self) -> Result<Vec<i64>> {
        self.inner.entity_ids_with_attributes().await
    }

    async fn upsert_cache_row(&self, row: &CacheRow) -> Result<()> {
        self.inner.upsert_cache_row(row).await
    }

    async fn get_cache_row(&self, entity_id: i64) -> Result<Option<CacheRow>> {
        self.inner.get_cache_row(entity_id).await
    }

    async fn delete_cache_row(&self, entity_id: i64) -> Result<bool> {
        self.inner.delete_cache_row(entity_id).await
    }
}

fn flaky_store(harness: &Harness, failing: &[i64]) -> AttributeCacheStore {
    let repository: Arc<dyn CatalogRepository> = Arc::new(FlakyCatalog {
        inner: harness.catalog.clone(),
        failing: failing.iter().copied().collect(),
    });
    let builder = AttributeCacheBuilder::new(repository.clone(), LocalePreference::default());
    AttributeCacheStore::new(repository, builder, NoopMetrics::shared())
}

#[tokio::test]
async fn test_entity_with_mixed_attributes() {
    let h = Harness::new();
    h.seed_listings(110);
    h.seed_definitions();
    h.seed_values(106, "Nike", 99.99, true);

    let entry = h.cache.upsert(106).await.unwrap();

    assert_eq!(entry.attributes_flat.len(), 3);
    assert_eq!(entry.attributes_searchable, "Nike");
    assert_eq!(
        serde_json::to_value(&entry.attributes_filterable).unwrap(),
        serde_json::json!({"brand": "Nike", "price": 99.99})
    );
    assert_eq!(entry.cache_version, CACHE_FORMAT_VERSION);

    let names: Vec<&str> = entry.attributes_flat.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Brand", "Price", "Used"]);

    for attribute in &entry.attributes_flat {
        let populated = [
            attribute.value_text.is_some(),
            attribute.value_number.is_some(),
            attribute.value_boolean.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        assert_eq!(populated, 1, "{} has {} value slots set", attribute.code, populated);
    }
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let h = Harness::new();
    h.seed_listings(3);
    h.seed_definitions();
    h.seed_values(2, "Samsung", 450.0, false);

    h.cache.upsert(2).await.unwrap();
    let first = h.cache.get(2).await.unwrap();
    h.cache.upsert(2).await.unwrap();
    let second = h.cache.get(2).await.unwrap();

    assert_eq!(
        serde_json::to_string(&first.attributes_flat).unwrap(),
        serde_json::to_string(&second.attributes_flat).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&first.attributes_filterable).unwrap(),
        serde_json::to_string(&second.attributes_filterable).unwrap()
    );
    assert_eq!(first.attributes_searchable, second.attributes_searchable);
    assert_eq!(first.cache_version, second.cache_version);
    assert!(second.last_updated >= first.last_updated);
}

#[tokio::test]
async fn test_get_distinguishes_missing_from_empty() {
    let h = Harness::new();
    h.seed_listings(1);

    assert!(matches!(h.cache.get(1).await, Err(CacheError::NotFound(1))));

    h.cache.upsert(1).await.unwrap();
    let entry = h.cache.get(1).await.unwrap();
    assert!(entry.attributes_flat.is_empty());
    assert_eq!(entry.attributes_searchable, "");
    assert!(entry.attributes_filterable.is_empty());
    assert!(h.cache.get_attributes(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_and_invalidate() {
    let h = Harness::new();
    h.seed_listings(2);
    h.seed_definitions();
    h.seed_values(1, "Nike", 10.0, true);
    h.seed_values(2, "Adidas", 20.0, false);
    h.cache.bulk_upsert(&[1, 2]).await.unwrap();

    assert!(h.cache.delete(1).await.unwrap());
    assert!(!h.cache.delete(1).await.unwrap());
    assert!(h.cache.invalidate(2).await.unwrap());
    assert!(h.cache.find(2).await.unwrap().is_none());
    assert_eq!(h.catalog.cache_len(), 0);
}

#[tokio::test]
async fn test_invalidate_many_counts_existing_rows() {
    let h = Harness::new();
    h.seed_listings(3);
    h.seed_definitions();
    for id in 1..=3 {
        h.seed_values(id, "Nike", 10.0, true);
    }
    h.cache.bulk_upsert(&[1, 2, 3]).await.unwrap();

    assert_eq!(h.cache.invalidate_many(&[1, 3, 7]).await.unwrap(), 2);
    assert_eq!(h.catalog.cache_len(), 1);
    assert!(h.cache.find(2).await.unwrap().is_some());
}

#[tokio::test]
async fn test_listing_removal_cascades_to_cache() {
    let h = Harness::new();
    h.seed_listings(1);
    h.seed_definitions();
    h.seed_values(1, "Nike", 10.0, true);
    h.cache.upsert(1).await.unwrap();

    h.catalog.remove_listing(1);
    assert!(h.cache.find(1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_bulk_upsert_reports_partial_failure() {
    let h = Harness::new();
    h.seed_listings(5);
    h.seed_definitions();
    for id in 1..=5 {
        h.seed_values(id, "Brand", id as f64, false);
    }
    let store = flaky_store(&h, &[2, 4]);

    let err = store.bulk_upsert(&[1, 2, 3, 4, 5]).await.unwrap_err();
    let report = match err {
        CacheError::PartialFailure(report) => report,
        other => panic!("expected partial failure, got {:?}", other),
    };

    assert_eq!(report.requested, 5);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 2);
    assert_eq!(
        report.errors.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        vec![2, 4]
    );
    assert!(report.errors[0].1.contains("connection reset"));
    assert_eq!(report.summary(), "3/5 succeeded, 2 failed");

    // Successful entities were still written
    assert!(h.cache.find(3).await.unwrap().is_some());
    assert!(h.cache.find(2).await.unwrap().is_none());
}

#[tokio::test]
async fn test_populate_all_skips_orphans() {
    let h = Harness::new();
    h.seed_listings(6);
    h.seed_definitions();
    for id in 1..=6 {
        h.seed_values(id, "Brand", 1.0, true);
    }
    h.catalog.remove_listing_row(6);

    let report = h.cache.populate_all(&JobContext::new(), 0).await.unwrap();

    assert_eq!(report.requested, 5);
    assert_eq!(report.succeeded, 5);
    assert_eq!(h.catalog.cache_len(), 5);
    assert!(h.cache.find(6).await.unwrap().is_none());
}

#[tokio::test]
async fn test_populate_all_in_small_batches_aggregates_failures() {
    let h = Harness::new();
    h.seed_listings(7);
    h.seed_definitions();
    for id in 1..=7 {
        h.seed_values(id, "Brand", 1.0, true);
    }
    let store = flaky_store(&h, &[5]);

    let err = store.populate_all(&JobContext::new(), 2).await.unwrap_err();
    let report = match err {
        CacheError::PartialFailure(report) => report,
        other => panic!("expected partial failure, got {:?}", other),
    };
    assert_eq!(report.requested, 7);
    assert_eq!(report.failed, 1);
    assert_eq!(h.catalog.cache_len(), 6);
}

#[tokio::test]
async fn test_populate_all_stops_when_cancelled() {
    let h = Harness::new();
    h.seed_listings(2);
    h.seed_definitions();
    h.seed_values(1, "Brand", 1.0, true);

    let ctx = JobContext::new();
    ctx.cancel();

    let err = h.cache.populate_all(&ctx, 10).await.unwrap_err();
    assert!(matches!(err, CacheError::Interrupted(Interrupted::Cancelled)));
    assert_eq!(h.catalog.cache_len(), 0);
}

#[tokio::test]
async fn test_secondary_locale_is_used_when_preferred_missing() {
    let h = Harness::new();
    h.seed_listings(1);
    h.catalog.insert_definition(
        catalog_indexer::models::AttributeDefinition::new(9, "material")
            .with_name("sr", "Materijal")
            .with_name("de", "Material"),
    );
    h.catalog
        .set_value(catalog_indexer::models::AttributeValue::new(1, 9, "koža"));

    let entry = h.cache.upsert(1).await.unwrap();
    assert_eq!(entry.attributes_flat[0].name, "Materijal");
}
