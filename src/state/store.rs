use crate::error::Result;
use crate::models::{AttributeDefinition, AttributeRow, AttributeValue, Listing};
use crate::state::{CacheRow, CatalogRepository, ListingPage};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory catalog (for development and testing)
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    listings: Arc<DashMap<i64, Listing>>,
    definitions: Arc<DashMap<i32, AttributeDefinition>>,
    values: Arc<DashMap<(i64, i32), AttributeValue>>,
    cache: Arc<DashMap<i64, CacheRow>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_listing(&self, listing: Listing) {
        self.listings.insert(listing.id, listing);
    }

    /// Remove a listing, cascading to its attribute values and cache row
    pub fn remove_listing(&self, id: i64) -> Option<Listing> {
        self.values.retain(|(entity_id, _), _| *entity_id != id);
        self.cache.remove(&id);
        self.listings.remove(&id).map(|(_, listing)| listing)
    }

    /// Remove only the listing row, leaving attribute values orphaned
    pub fn remove_listing_row(&self, id: i64) -> Option<Listing> {
        self.listings.remove(&id).map(|(_, listing)| listing)
    }

    pub fn insert_definition(&self, definition: AttributeDefinition) {
        self.definitions.insert(definition.id, definition);
    }

    /// Set the value of one attribute for one listing (one row per pair)
    pub fn set_value(&self, value: AttributeValue) {
        self.values.insert((value.entity_id, value.attribute_id), value);
    }

    pub fn remove_value(&self, entity_id: i64, attribute_id: i32) {
        self.values.remove(&(entity_id, attribute_id));
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn get_listing(&self, id: i64) -> Result<Option<Listing>> {
        Ok(self.listings.get(&id).map(|entry| entry.clone()))
    }

    async fn list_eligible_listings(&self, after_id: i64, limit: usize) -> Result<ListingPage> {
        let mut listings: Vec<Listing> = self
            .listings
            .iter()
            .filter(|entry| *entry.key() > after_id && entry.value().is_eligible())
            .map(|entry| entry.value().clone())
            .collect();

        listings.sort_by_key(|listing| listing.id);
        listings.truncate(limit);
        Ok(ListingPage::from_listings(listings))
    }

    async fn count_eligible_listings(&self) -> Result<u64> {
        let count = self
            .listings
            .iter()
            .filter(|entry| entry.value().is_eligible())
            .count();
        Ok(count as u64)
    }

    async fn attribute_rows(&self, entity_id: i64) -> Result<Vec<AttributeRow>> {
        let mut rows: Vec<AttributeRow> = self
            .values
            .iter()
            .filter(|entry| entry.key().0 == entity_id)
            .filter_map(|entry| {
                let definition = self.definitions.get(&entry.key().1)?;
                if !definition.is_active {
                    return None;
                }
                Some(AttributeRow {
                    definition: definition.clone(),
                    value: entry.value().clone(),
                })
            })
            .collect();

        rows.sort_by_key(|row| (row.definition.sort_order, row.definition.id));
        Ok(rows)
    }

    async fn entity_ids_with_attributes(&self) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = self
            .values
            .iter()
            .map(|entry| entry.key().0)
            .filter(|id| self.listings.contains_key(id))
            .collect();

        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn upsert_cache_row(&self, row: &CacheRow) -> Result<()> {
        self.cache.insert(row.entity_id, row.clone());
        tracing::debug!(entity_id = row.entity_id, "Attribute cache row upserted");
        Ok(())
    }

    async fn get_cache_row(&self, entity_id: i64) -> Result<Option<CacheRow>> {
        Ok(self.cache.get(&entity_id).map(|entry| entry.clone()))
    }

    async fn delete_cache_row(&self, entity_id: i64) -> Result<bool> {
        Ok(self.cache.remove(&entity_id).is_some())
    }
}
