use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use uuid::Uuid;

/// A marketplace listing as read from the relational store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Primary key
    pub id: i64,

    /// External identifier
    pub uuid: Uuid,

    /// Owner
    pub user_id: i64,

    /// Storefront for B2C listings
    pub storefront_id: Option<i64>,

    /// Title in the original language
    pub title: String,

    /// Description in the original language
    pub description: Option<String>,

    pub price: f64,

    pub currency: String,

    /// Category key (stored as text, UUID in the catalog schema)
    pub category_id: String,

    pub category_slug: Option<String>,

    pub status: ListingStatus,

    pub visibility: Visibility,

    pub quantity: i32,

    pub sku: Option<String>,

    pub source_type: SourceType,

    pub stock_status: Option<String>,

    pub views_count: i64,

    pub favorites_count: i64,

    /// Soft-delete flag
    pub is_deleted: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub published_at: Option<DateTime<Utc>>,

    pub original_language: Option<String>,

    /// Title translations keyed by language code
    pub title_translations: BTreeMap<String, String>,

    /// Description translations keyed by language code
    pub description_translations: BTreeMap<String, String>,

    pub tags: Vec<String>,

    /// Images ordered primary first, then by display order
    pub images: Vec<ListingImage>,

    pub location: Option<ListingLocation>,

    /// Storefront details, loaded for B2C listings
    pub storefront: Option<StorefrontSummary>,
}

impl Listing {
    /// Create an active public C2C listing with the required fields set
    pub fn new(id: i64, title: impl Into<String>, price: f64, category_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            uuid: Uuid::new_v4(),
            user_id: 0,
            storefront_id: None,
            title: title.into(),
            description: None,
            price,
            currency: "RSD".to_string(),
            category_id: category_id.into(),
            category_slug: None,
            status: ListingStatus::Active,
            visibility: Visibility::Public,
            quantity: 1,
            sku: None,
            source_type: SourceType::C2c,
            stock_status: None,
            views_count: 0,
            favorites_count: 0,
            is_deleted: false,
            created_at: now,
            updated_at: now,
            published_at: None,
            original_language: None,
            title_translations: BTreeMap::new(),
            description_translations: BTreeMap::new(),
            tags: Vec::new(),
            images: Vec::new(),
            location: None,
            storefront: None,
        }
    }

    /// Whether the listing belongs in the search index (active, public, not deleted)
    pub fn is_eligible(&self) -> bool {
        self.status == ListingStatus::Active
            && self.visibility == Visibility::Public
            && !self.is_deleted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ListingStatus {
    Draft,
    Active,
    Inactive,
    Sold,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    Unlisted,
}

/// Consumer-to-consumer or storefront (business) listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceType {
    C2c,
    B2c,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingImage {
    pub id: i64,
    pub url: String,
    pub storage_path: Option<String>,
    pub thumbnail_url: Option<String>,
    pub display_order: i32,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ListingLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
}

impl ListingLocation {
    /// Coordinates, only when both are known
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Storefront fields denormalized into B2C listing documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorefrontSummary {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub rating: f64,
    pub is_verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_eligibility() {
        let mut listing = Listing::new(1, "Bike", 120.0, "sports");
        assert!(listing.is_eligible());

        listing.visibility = Visibility::Private;
        assert!(!listing.is_eligible());

        listing.visibility = Visibility::Public;
        listing.is_deleted = true;
        assert!(!listing.is_eligible());

        listing.is_deleted = false;
        listing.status = ListingStatus::Sold;
        assert!(!listing.is_eligible());
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        assert_eq!(ListingStatus::from_str("active").unwrap(), ListingStatus::Active);
        assert_eq!(SourceType::B2c.to_string(), "b2c");
        assert_eq!(Visibility::from_str("unlisted").unwrap(), Visibility::Unlisted);
    }

    #[test]
    fn test_coordinates_require_both_values() {
        let partial = ListingLocation {
            latitude: Some(44.8),
            ..Default::default()
        };
        assert!(partial.coordinates().is_none());

        let full = ListingLocation {
            latitude: Some(44.8),
            longitude: Some(20.46),
            ..Default::default()
        };
        assert_eq!(full.coordinates(), Some((44.8, 20.46)));
    }
}
