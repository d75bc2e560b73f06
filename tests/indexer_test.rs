mod common;

use async_trait::async_trait;
use catalog_indexer::{
    context::JobContext,
    error::Result,
    metrics::NoopMetrics,
    models::{AttributeRow, Listing},
    search::{AliasAction, RebuildStats, SearchBackend},
    state::{CacheRow, CatalogRepository, InMemoryCatalog, ListingPage},
};
use chrono::{TimeZone, Utc};
use common::{Harness, ALIAS};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const V1: &str = "marketplace_listings_v1";
const V2: &str = "marketplace_listings_v2";

/// Catalog that reads some rows but cannot map them into listings
struct UnreadableRows {
    inner: InMemoryCatalog,
    unreadable: HashSet<i64>,
}

#[async_trait]
impl CatalogRepository for UnreadableRows {
    async fn get_listing(&self, id: i64) -> Result<Option<Listing>> {
        self.inner.get_listing(id).await
    }

    async fn list_eligible_listings(&self, after_id: i64, limit: usize) -> Result<ListingPage> {
        let mut page = self.inner.list_eligible_listings(after_id, limit).await?;
        page.listings
            .retain(|listing| !self.unreadable.contains(&listing.id));
        Ok(page)
    }

    async fn count_eligible_listings(&self) -> Result<u64> {
        self.inner.count_eligible_listings().await
    }

    async fn attribute_rows(&self, entity_id: i64) -> Result<Vec<AttributeRow>> {
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

fn with_unreadable(ids: &[i64]) -> Harness {
    let unreadable: HashSet<i64> = ids.iter().copied().collect();
    Harness::with_repository(NoopMetrics::shared(), move |catalog| {
        Arc::new(UnreadableRows {
            inner: catalog,
            unreadable,
        }) as Arc<dyn CatalogRepository>
    })
}

async fn bind_alias(h: &Harness, index: &str) {
    h.backend.create_index(index, &json!({})).await.unwrap();
    h.backend
        .update_aliases(&[AliasAction::Add {
            index: index.to_string(),
            alias: ALIAS.to_string(),
        }])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unreadable_row_is_counted_and_rebuild_continues() {
    let h = with_unreadable(&[2]);
    h.seed_listings(10);
    h.backend.create_index(V2, &json!({})).await.unwrap();

    let stats = h
        .indexer
        .rebuild_into(&JobContext::new(), V2, 3, Duration::ZERO, |_| {})
        .await
        .unwrap();

    assert_eq!(
        stats,
        RebuildStats {
            batches: 4,
            indexed: 9,
            failed: 1,
        }
    );
    assert_eq!(h.backend.count(V2, None).await.unwrap(), 9);
    assert!(h.backend.document(V2, "2").is_none());
    assert!(h.backend.document(V2, "10").is_some());
}

#[tokio::test]
async fn test_page_of_only_unreadable_rows_does_not_end_rebuild() {
    let h = with_unreadable(&[1, 2]);
    h.seed_listings(5);
    h.backend.create_index(V2, &json!({})).await.unwrap();

    let mut seen = Vec::new();
    let stats = h
        .indexer
        .rebuild_into(&JobContext::new(), V2, 2, Duration::ZERO, |s| {
            seen.push((s.indexed, s.failed))
        })
        .await
        .unwrap();

    assert_eq!(seen, vec![(0, 2), (2, 2), (3, 2)]);
    assert_eq!(stats.indexed, 3);
    assert_eq!(h.backend.count(V2, None).await.unwrap(), 3);
}

#[tokio::test]
async fn test_bulk_and_single_indexing_store_the_same_document() {
    let h = Harness::new();
    h.seed_listings(4);
    h.seed_definitions();
    h.seed_values(4, "Samsung", 450.0, false);
    h.cache.upsert(4).await.unwrap();
    bind_alias(&h, V1).await;

    let indexer = h
        .indexer
        .clone()
        .with_reference_time(Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap());

    indexer.index_listing(4).await.unwrap();
    let single = h.backend.document(ALIAS, "4").unwrap();

    assert!(indexer.delete_listing(4).await.unwrap());
    let listing = h.repository.get_listing(4).await.unwrap().unwrap();
    let outcome = indexer.bulk_index(&[listing]).await.unwrap();
    assert_eq!(outcome.indexed, 1);
    let bulk = h.backend.document(ALIAS, "4").unwrap();

    assert_eq!(single, bulk);
    assert_eq!(bulk["attributes_searchable_text"], json!("Samsung"));
    assert_eq!(bulk["title"], json!("Telefon 4"));
}
