//! Search document structures and assembly

use crate::models::{
    AttributeCacheEntry, AttributeForIndex, Listing, ListingStatus, SourceType, Visibility,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Value of the `document_type` field for listings
pub const LISTING_DOCUMENT_TYPE: &str = "listing";

/// Listings created this recently are flagged as new arrivals
pub const NEW_ARRIVAL_WINDOW_DAYS: i64 = 7;

const POPULARITY_VIEW_WEIGHT: f64 = 0.3;
const POPULARITY_FAVORITE_WEIGHT: f64 = 0.5;

/// Trait for documents that can be written to the search engine
pub trait SearchDocument: Serialize {
    /// Get document ID
    fn document_id(&self) -> String;
}

/// Listing document as sent to the search engine.
///
/// Optional fields are omitted when absent; empty collections are omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingDocument {
    pub id: i64,
    pub uuid: Uuid,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storefront_id: Option<i64>,
    pub document_type: &'static str,

    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_language: Option<String>,

    /// `title_<lang>` and `description_<lang>` fields
    #[serde(flatten)]
    pub translations: BTreeMap<String, String>,

    pub price: f64,
    pub currency: String,
    pub category_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_slug: Option<String>,
    pub status: ListingStatus,
    pub visibility: Visibility,
    pub quantity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub source_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_status: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storefront_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storefront_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storefront_rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_verified: Option<bool>,

    pub views_count: i64,
    pub favorites_count: i64,
    pub popularity_score: f64,
    pub is_new_arrival: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<DocumentImage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_individual_location: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub individual_latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub individual_longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeForIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes_searchable_text: Option<String>,
}

impl SearchDocument for ListingDocument {
    fn document_id(&self) -> String {
        self.id.to_string()
    }
}

/// Image entry as the search API reads it; images arrive primary first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentImage {
    pub id: i64,
    pub public_url: String,
    pub file_path: String,
    pub is_main: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Builds listing documents from a listing and its attribute cache entry.
///
/// Assembly does no I/O. Time-dependent fields use the reference time fixed at
/// construction, so the same inputs always give the same document.
#[derive(Debug, Clone, Copy)]
pub struct DocumentAssembler {
    reference_time: DateTime<Utc>,
}

impl DocumentAssembler {
    pub fn new(reference_time: DateTime<Utc>) -> Self {
        Self { reference_time }
    }

    /// Assembler anchored at the current time
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn reference_time(&self) -> DateTime<Utc> {
        self.reference_time
    }

    pub fn assemble(&self, listing: &Listing, cache: Option<&AttributeCacheEntry>) -> ListingDocument {
        let mut translations = BTreeMap::new();
        for (lang, text) in &listing.title_translations {
            if !text.is_empty() {
                translations.insert(format!("title_{}", lang), text.clone());
            }
        }
        for (lang, text) in &listing.description_translations {
            if !text.is_empty() {
                translations.insert(format!("description_{}", lang), text.clone());
            }
        }

        let images = listing
            .images
            .iter()
            .map(|image| DocumentImage {
                id: image.id,
                public_url: image.url.clone(),
                file_path: image.url.clone(),
                is_main: image.is_primary,
            })
            .collect();

        let coordinates = listing.location.as_ref().and_then(|l| l.coordinates());
        let storefront = listing.storefront.as_ref();

        let (attributes, searchable_text) = match cache {
            Some(entry) => (
                entry.attributes_flat.clone(),
                Some(entry.attributes_searchable.clone()).filter(|text| !text.is_empty()),
            ),
            None => (Vec::new(), None),
        };

        ListingDocument {
            id: listing.id,
            uuid: listing.uuid,
            user_id: listing.user_id,
            storefront_id: listing.storefront_id,
            document_type: LISTING_DOCUMENT_TYPE,
            title: listing.title.clone(),
            description: listing.description.clone(),
            original_language: listing.original_language.clone(),
            translations,
            price: listing.price,
            currency: listing.currency.clone(),
            category_id: listing.category_id.clone(),
            category_slug: listing.category_slug.clone(),
            status: listing.status,
            visibility: listing.visibility,
            quantity: listing.quantity,
            sku: listing.sku.clone(),
            source_type: listing.source_type,
            stock_status: listing.stock_status.clone(),
            tags: unique_tags(&listing.tags),
            brand: extract_brand(&attributes),
            storefront_name: storefront.map(|s| s.name.clone()),
            storefront_slug: storefront.map(|s| s.slug.clone()),
            storefront_rating: storefront.map(|s| s.rating),
            seller_verified: storefront.map(|s| s.is_verified),
            views_count: listing.views_count,
            favorites_count: listing.favorites_count,
            popularity_score: popularity_score(listing),
            is_new_arrival: self.is_new_arrival(listing.created_at),
            created_at: listing.created_at,
            updated_at: listing.updated_at,
            published_at: listing.published_at,
            images,
            location: coordinates.map(|(lat, lon)| GeoPoint { lat, lon }),
            has_individual_location: coordinates.map(|_| true),
            individual_latitude: coordinates.map(|(lat, _)| lat),
            individual_longitude: coordinates.map(|(_, lon)| lon),
            country: listing.location.as_ref().and_then(|l| l.country.clone()),
            city: listing.location.as_ref().and_then(|l| l.city.clone()),
            attributes,
            attributes_searchable_text: searchable_text,
        }
    }

    fn is_new_arrival(&self, created_at: DateTime<Utc>) -> bool {
        self.reference_time - created_at < Duration::days(NEW_ARRIVAL_WINDOW_DAYS)
    }
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::now()
    }
}

pub fn popularity_score(listing: &Listing) -> f64 {
    listing.views_count as f64 * POPULARITY_VIEW_WEIGHT
        + listing.favorites_count as f64 * POPULARITY_FAVORITE_WEIGHT
}

/// Text value of the attribute coded `brand`, any case
fn extract_brand(attributes: &[AttributeForIndex]) -> Option<String> {
    attributes
        .iter()
        .find(|attr| attr.code.eq_ignore_ascii_case("brand") && attr.value_text.is_some())
        .and_then(|attr| attr.value_text.clone())
        .filter(|brand| !brand.is_empty())
}

fn unique_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .filter(|tag| !tag.is_empty() && seen.insert(tag.as_str()))
        .cloned()
        .collect()
}
