//! Search index maintenance for marketplace listings
//!
//! This module turns listings into search documents and manages the physical
//! indices behind the public alias:
//!
//! - **Document Assembly**: typed listing documents, optional fields omitted
//! - **Index Naming**: two physical versions (`<alias>_v1`, `<alias>_v2`) behind one alias
//! - **Backends**: HTTP client for OpenSearch/Elasticsearch and an in-memory backend
//! - **Indexing**: single-listing upserts and keyset-paged full rebuilds
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              ListingIndexer                   │
//! │  - index_listing()   - delete_listing()       │
//! │  - bulk_index()      - rebuild_into()         │
//! └──────────────────────────────────────────────┘
//!          │                         │
//!          ▼                         ▼
//! ┌──────────────────┐   ┌──────────────────────────┐
//! │ DocumentAssembler │   │  SearchBackend            │
//! │ (pure)            │   │  OpenSearchClient (HTTP)  │
//! └──────────────────┘   │  InMemorySearchBackend    │
//!                        └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use catalog_indexer::search::{IndexNaming, IndexVersion, OpenSearchClient, SearchBackend, SearchConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SearchConfig::default();
//!     let client = OpenSearchClient::new(&config)?;
//!     let naming = IndexNaming::new(&config.alias);
//!
//!     let bound = client.get_alias(naming.alias()).await?;
//!     println!("{} -> {:?}", naming.alias(), bound);
//!     println!("v2 would be {}", naming.index_name(IndexVersion::V2));
//!
//!     Ok(())
//! }
//! ```

mod alias;
mod backend;
mod bulk;
mod client;
mod config;
mod document;
mod error;
mod indexer;
pub mod mapping;
mod memory;

pub use alias::{AliasAction, IndexNaming, IndexVersion};
pub use backend::{BulkOutcome, ClusterHealth, ReindexSummary, SearchBackend};
pub use bulk::{check_bulk_response, encode_bulk, BulkBody};
pub use client::OpenSearchClient;
pub use self::config::{SearchConfig, SearchConfigBuilder};
pub use document::{
    popularity_score, DocumentAssembler, DocumentImage, GeoPoint, ListingDocument, SearchDocument,
    LISTING_DOCUMENT_TYPE, NEW_ARRIVAL_WINDOW_DAYS,
};
pub use error::{SearchError, SearchResult};
pub use indexer::{
    IndexOutcome, ListingIndexer, RebuildError, RebuildStats, DEFAULT_REBUILD_BATCH_SIZE,
};
pub use memory::InMemorySearchBackend;
