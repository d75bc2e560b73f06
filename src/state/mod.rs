pub mod factory;
pub mod postgres_store;
pub mod store;

pub use factory::{create_in_memory_repository, create_repository};
pub use postgres_store::PgCatalogRepository;
pub use store::*;

use crate::error::Result;
use crate::models::{AttributeRow, Listing};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read access to the catalog plus read/write access to the attribute cache table
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Get a listing by ID regardless of status
    async fn get_listing(&self, id: i64) -> Result<Option<Listing>>;

    /// Page through eligible (active, public, non-deleted) listings in ID order,
    /// starting after `after_id`. Images, location and storefront are loaded.
    ///
    /// Rows that cannot be mapped are left out of `listings` but still move
    /// the page cursor and count towards `scanned`.
    async fn list_eligible_listings(&self, after_id: i64, limit: usize) -> Result<ListingPage>;

    /// Authoritative count of eligible listings
    async fn count_eligible_listings(&self) -> Result<u64>;

    /// Attribute values of one listing joined to their active definitions
    async fn attribute_rows(&self, entity_id: i64) -> Result<Vec<AttributeRow>>;

    /// IDs of listings that have at least one attribute value and still exist, ascending
    async fn entity_ids_with_attributes(&self) -> Result<Vec<i64>>;

    /// Insert or replace the cache row keyed by entity ID
    async fn upsert_cache_row(&self, row: &CacheRow) -> Result<()>;

    /// Get the cache row for an entity
    async fn get_cache_row(&self, entity_id: i64) -> Result<Option<CacheRow>>;

    /// Delete the cache row; returns whether a row was removed
    async fn delete_cache_row(&self, entity_id: i64) -> Result<bool>;
}

/// One keyset page of eligible listings
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub listings: Vec<Listing>,

    /// Highest row id read, mapped or not; resume after it
    pub last_id: Option<i64>,

    /// Rows read from the store
    pub scanned: usize,
}

impl ListingPage {
    /// Page where every row mapped
    pub fn from_listings(listings: Vec<Listing>) -> Self {
        Self {
            last_id: listings.iter().map(|listing| listing.id).max(),
            scanned: listings.len(),
            listings,
        }
    }

    /// Rows read but dropped while mapping
    pub fn skipped(&self) -> usize {
        self.scanned.saturating_sub(self.listings.len())
    }

    /// Whether the store ran out of rows before `limit`
    pub fn is_last(&self, limit: usize) -> bool {
        self.scanned < limit || self.last_id.is_none()
    }
}

/// Persisted form of an attribute cache entry
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRow {
    pub entity_id: i64,

    /// Serialized `Vec<AttributeForIndex>`
    pub attributes_flat: String,

    pub attributes_searchable: String,

    /// Serialized filterable map
    pub attributes_filterable: String,

    pub cache_version: i32,

    pub last_updated: DateTime<Utc>,
}
