use crate::config::DatabaseConfig;
use crate::error::{AppError, Result};
use crate::models::{
    AttributeDefinition, AttributeRow, AttributeValue, Listing, ListingImage, ListingLocation,
    StorefrontSummary,
};
use crate::state::{CacheRow, CatalogRepository, ListingPage};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

const LISTING_COLUMNS: &str = r#"
    l.id::bigint AS id, l.uuid, l.user_id::bigint AS user_id, l.storefront_id::bigint AS storefront_id,
    l.title, l.description, l.price::float8 AS price, l.currency, l.category_id::text AS category_id,
    c.slug AS category_slug, l.status, l.visibility, l.quantity, l.sku,
    l.source_type, l.stock_status, l.view_count::bigint AS view_count,
    l.favorites_count::bigint AS favorites_count, l.is_deleted,
    l.created_at, l.updated_at, l.published_at,
    COALESCE(l.title_translations, '{}'::jsonb) AS title_translations,
    COALESCE(l.description_translations, '{}'::jsonb) AS description_translations,
    l.original_language, COALESCE(l.tags, '{}'::text[]) AS tags
"#;

const ELIGIBLE: &str =
    "l.status = 'active' AND l.visibility = 'public' AND l.is_deleted = false";

/// Postgres-backed catalog repository
#[derive(Clone)]
pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    /// Connect using the database section of the configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            AppError::Configuration("database.url is required for the postgres backend".to_string())
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await?;

        info!(max_connections = config.max_connections, "Connected to catalog database");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_listing(row: &PgRow) -> Result<Listing> {
        let status: String = row.try_get("status")?;
        let visibility: String = row.try_get("visibility")?;
        let source_type: String = row.try_get("source_type")?;
        let title_translations: Json<BTreeMap<String, String>> = row.try_get("title_translations")?;
        let description_translations: Json<BTreeMap<String, String>> =
            row.try_get("description_translations")?;

        Ok(Listing {
            id: row.try_get("id")?,
            uuid: row.try_get("uuid")?,
            user_id: row.try_get("user_id")?,
            storefront_id: row.try_get("storefront_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            price: row.try_get("price")?,
            currency: row.try_get("currency")?,
            category_id: row.try_get("category_id")?,
            category_slug: row.try_get("category_slug")?,
            status: parse_enum("status", &status)?,
            visibility: parse_enum("visibility", &visibility)?,
            quantity: row.try_get("quantity")?,
            sku: row.try_get("sku")?,
            source_type: parse_enum("source_type", &source_type)?,
            stock_status: row.try_get("stock_status")?,
            views_count: row.try_get("view_count")?,
            favorites_count: row.try_get("favorites_count")?,
            is_deleted: row.try_get("is_deleted")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            published_at: row.try_get("published_at")?,
            original_language: row.try_get("original_language")?,
            title_translations: title_translations.0,
            description_translations: description_translations.0,
            tags: row.try_get("tags")?,
            images: Vec::new(),
            location: None,
            storefront: None,
        })
    }

    /// Attach images, locations and storefronts to a page of listings
    async fn load_relations(&self, listings: &mut [Listing]) -> Result<()> {
        if listings.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = listings.iter().map(|l| l.id).collect();

        let image_rows = sqlx::query(
            r#"
            SELECT id::bigint AS id, listing_id::bigint AS listing_id, url, storage_path,
                   thumbnail_url, display_order, is_primary
            FROM listing_images
            WHERE listing_id = ANY($1)
            ORDER BY listing_id, is_primary DESC, display_order ASC, id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut images: HashMap<i64, Vec<ListingImage>> = HashMap::new();
        for row in image_rows {
            let listing_id: i64 = row.try_get("listing_id")?;
            images.entry(listing_id).or_default().push(ListingImage {
                id: row.try_get("id")?,
                url: row.try_get("url")?,
                storage_path: row.try_get("storage_path")?,
                thumbnail_url: row.try_get("thumbnail_url")?,
                display_order: row.try_get("display_order")?,
                is_primary: row.try_get("is_primary")?,
            });
        }

        let location_rows = sqlx::query(
            r#"
            SELECT listing_id::bigint AS listing_id, latitude::float8 AS latitude,
                   longitude::float8 AS longitude, country, city, address
            FROM listing_locations
            WHERE listing_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut locations: HashMap<i64, ListingLocation> = HashMap::new();
        for row in location_rows {
            let listing_id: i64 = row.try_get("listing_id")?;
            locations.insert(
                listing_id,
                ListingLocation {
                    latitude: row.try_get("latitude")?,
                    longitude: row.try_get("longitude")?,
                    country: row.try_get("country")?,
                    city: row.try_get("city")?,
                    address: row.try_get("address")?,
                },
            );
        }

        let storefront_ids: Vec<i64> = listings.iter().filter_map(|l| l.storefront_id).collect();
        let mut storefronts: HashMap<i64, StorefrontSummary> = HashMap::new();
        if !storefront_ids.is_empty() {
            let rows = sqlx::query(
                r#"
                SELECT id::bigint AS id, slug, name, COALESCE(rating, 0)::float8 AS rating, is_verified
                FROM storefronts
                WHERE id = ANY($1) AND deleted_at IS NULL
                "#,
            )
            .bind(&storefront_ids)
            .fetch_all(&self.pool)
            .await?;

            for row in rows {
                let storefront = StorefrontSummary {
                    id: row.try_get("id")?,
                    slug: row.try_get("slug")?,
                    name: row.try_get("name")?,
                    rating: row.try_get("rating")?,
                    is_verified: row.try_get("is_verified")?,
                };
                storefronts.insert(storefront.id, storefront);
            }
        }

        for listing in listings.iter_mut() {
            listing.images = images.remove(&listing.id).unwrap_or_default();
            listing.location = locations.remove(&listing.id);
            listing.storefront = listing
                .storefront_id
                .and_then(|id| storefronts.get(&id).cloned());
        }

        Ok(())
    }
}

fn parse_enum<T: FromStr>(column: &str, value: &str) -> Result<T> {
    T::from_str(value)
        .map_err(|_| AppError::Database(format!("unexpected {} value '{}'", column, value)))
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn get_listing(&self, id: i64) -> Result<Option<Listing>> {
        let query = format!(
            "SELECT {} FROM listings l LEFT JOIN categories c ON l.category_id = c.id WHERE l.id = $1",
            LISTING_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let mut listings = vec![Self::map_listing(&row)?];
                self.load_relations(&mut listings).await?;
                Ok(listings.pop())
            }
            None => Ok(None),
        }
    }

    async fn list_eligible_listings(&self, after_id: i64, limit: usize) -> Result<ListingPage> {
        let query = format!(
            "SELECT {} FROM listings l LEFT JOIN categories c ON l.category_id = c.id \
             WHERE {} AND l.id > $1 ORDER BY l.id ASC LIMIT $2",
            LISTING_COLUMNS, ELIGIBLE
        );
        let rows = sqlx::query(&query)
            .bind(after_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut listings = Vec::with_capacity(rows.len());
        let mut last_id = None;
        for row in &rows {
            let id: Option<i64> = row.try_get("id").ok();
            last_id = last_id.max(id);
            match Self::map_listing(row) {
                Ok(listing) => listings.push(listing),
                Err(e) => {
                    warn!(listing_id = ?id, error = %e, "Skipping listing row that failed to map");
                }
            }
        }

        self.load_relations(&mut listings).await?;
        let page = ListingPage {
            listings,
            last_id,
            scanned: rows.len(),
        };
        debug!(
            after_id,
            scanned = page.scanned,
            skipped = page.skipped(),
            "Loaded eligible listings page"
        );
        Ok(page)
    }

    async fn count_eligible_listings(&self) -> Result<u64> {
        let query = format!("SELECT COUNT(*) AS total FROM listings l WHERE {}", ELIGIBLE);
        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as u64)
    }

    async fn attribute_rows(&self, entity_id: i64) -> Result<Vec<AttributeRow>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.code, a.name, a.is_searchable, a.is_filterable, a.sort_order, a.is_active,
                   lav.value_text, lav.value_number::float8 AS value_number, lav.value_boolean
            FROM listing_attribute_values lav
            JOIN attributes a ON a.id = lav.attribute_id
            WHERE lav.listing_id = $1 AND a.is_active = true
            ORDER BY a.sort_order ASC, a.id ASC
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let name: Json<BTreeMap<String, String>> = row.try_get("name")?;
            let definition = AttributeDefinition {
                id: row.try_get("id")?,
                code: row.try_get("code")?,
                name: name.0,
                is_searchable: row.try_get("is_searchable")?,
                is_filterable: row.try_get("is_filterable")?,
                sort_order: row.try_get("sort_order")?,
                is_active: row.try_get("is_active")?,
            };

            let value = AttributeValue::from_columns(
                entity_id,
                definition.id,
                row.try_get("value_text")?,
                row.try_get("value_number")?,
                row.try_get("value_boolean")?,
            );

            match value {
                Some(value) => result.push(AttributeRow { definition, value }),
                None => debug!(
                    entity_id,
                    attribute = %definition.code,
                    "Attribute value has no populated column"
                ),
            }
        }

        Ok(result)
    }

    async fn entity_ids_with_attributes(&self) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT lav.listing_id::bigint AS listing_id
            FROM listing_attribute_values lav
            JOIN listings l ON l.id = lav.listing_id
            ORDER BY listing_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("listing_id").map_err(AppError::from))
            .collect()
    }

    async fn upsert_cache_row(&self, row: &CacheRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attribute_search_cache (
                listing_id, attributes_flat, attributes_searchable,
                attributes_filterable, cache_version, last_updated
            )
            VALUES ($1, $2::jsonb, $3, $4::jsonb, $5, $6)
            ON CONFLICT (listing_id) DO UPDATE SET
                attributes_flat = EXCLUDED.attributes_flat,
                attributes_searchable = EXCLUDED.attributes_searchable,
                attributes_filterable = EXCLUDED.attributes_filterable,
                cache_version = EXCLUDED.cache_version,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(row.entity_id)
        .bind(&row.attributes_flat)
        .bind(&row.attributes_searchable)
        .bind(&row.attributes_filterable)
        .bind(row.cache_version)
        .bind(row.last_updated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_cache_row(&self, entity_id: i64) -> Result<Option<CacheRow>> {
        let row = sqlx::query(
            r#"
            SELECT listing_id::bigint AS listing_id, attributes_flat::text AS attributes_flat,
                   COALESCE(attributes_searchable, '') AS attributes_searchable,
                   attributes_filterable::text AS attributes_filterable,
                   cache_version, last_updated
            FROM attribute_search_cache
            WHERE listing_id = $1
            "#,
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(CacheRow {
                entity_id: row.try_get("listing_id")?,
                attributes_flat: row.try_get("attributes_flat")?,
                attributes_searchable: row.try_get("attributes_searchable")?,
                attributes_filterable: row.try_get("attributes_filterable")?,
                cache_version: row.try_get("cache_version")?,
                last_updated: row.try_get("last_updated")?,
            })
        })
        .transpose()
    }

    async fn delete_cache_row(&self, entity_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM attribute_search_cache WHERE listing_id = $1")
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
