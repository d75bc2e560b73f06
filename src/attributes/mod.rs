//! Attribute cache: flattens EAV attribute rows per listing into a
//! denormalized, rebuildable cache consumed by document assembly.
//!
//! - [`AttributeCacheBuilder`] reads rows and produces the flat list,
//!   searchable text and filterable map
//! - [`AttributeCacheStore`] persists the result with upsert semantics

pub mod builder;
pub mod cache;
pub mod error;

pub use builder::{searchable_token, AttributeCacheBuilder, BuiltAttributes, LocalePreference};
pub use cache::{
    AttributeCacheStore, BulkUpsertReport, CACHE_FORMAT_VERSION, DEFAULT_POPULATE_BATCH_SIZE,
};
pub use error::{CacheError, CacheResult};
