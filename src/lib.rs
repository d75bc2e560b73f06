//! Catalog indexer
//!
//! Keeps the marketplace search index in step with the relational catalog:
//!
//! - [`attributes`]: flattens EAV attribute rows into a per-listing cache
//! - [`search`]: assembles listing documents and writes them to the search engine
//! - [`reindex`]: blue-green rebuilds with verification, alias switch and rollback
//!
//! Storage is reached through [`state::CatalogRepository`] and the search
//! engine through [`search::SearchBackend`], so every component runs against
//! in-memory implementations in tests.

pub mod attributes;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod models;
pub mod reindex;
pub mod search;
pub mod state;

pub use crate::config::Config;
pub use context::{Interrupted, JobContext};
pub use error::{AppError, Result};
