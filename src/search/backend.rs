use crate::search::{AliasAction, ListingDocument, SearchResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Capabilities the indexer, orchestrator and verifier need from a search engine.
///
/// Idempotent: everything except `bulk_upsert` with new IDs and `reindex`,
/// which write whatever the source holds at call time.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn index_exists(&self, index: &str) -> SearchResult<bool>;

    /// Create an index with the given settings/mappings body
    async fn create_index(&self, index: &str, body: &Value) -> SearchResult<()>;

    /// Delete an index; a missing index is not an error
    async fn delete_index(&self, index: &str) -> SearchResult<()>;

    /// Insert or replace one document (index or alias name)
    async fn upsert_document(&self, index: &str, document: &ListingDocument) -> SearchResult<()>;

    /// Delete one document; returns whether it existed
    async fn delete_document(&self, index: &str, id: &str) -> SearchResult<bool>;

    /// Write documents in one bulk request.
    ///
    /// Documents that fail to serialize are skipped and reported. Fails when
    /// nothing serialized or the engine flags item errors.
    async fn bulk_upsert(&self, index: &str, documents: &[ListingDocument])
        -> SearchResult<BulkOutcome>;

    /// Physical indices the alias is bound to; empty when the alias does not exist
    async fn get_alias(&self, alias: &str) -> SearchResult<Vec<String>>;

    /// Apply all actions in one atomic request
    async fn update_aliases(&self, actions: &[AliasAction]) -> SearchResult<()>;

    /// Make recent writes visible to search and count
    async fn refresh(&self, index: &str) -> SearchResult<()>;

    /// Number of documents, optionally restricted by a query clause
    async fn count(&self, index: &str, query: Option<&Value>) -> SearchResult<u64>;

    /// Number of documents where `field` exists
    async fn count_field_exists(&self, index: &str, field: &str) -> SearchResult<u64> {
        let query = json!({ "exists": { "field": field } });
        self.count(index, Some(&query)).await
    }

    /// Total hits of a free-text query
    async fn sample_query(&self, index: &str, text: &str) -> SearchResult<u64>;

    /// Server-side copy of every document from `source` into `dest`, waiting for completion
    async fn reindex(&self, source: &str, dest: &str) -> SearchResult<ReindexSummary>;

    async fn cluster_health(&self) -> SearchResult<ClusterHealth>;
}

/// Result of a bulk write
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkOutcome {
    /// Documents sent and accepted
    pub indexed: u64,

    /// Documents dropped before sending, as (id, reason)
    pub skipped: Vec<(String, String)>,
}

/// Response of a server-side reindex
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReindexSummary {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub failures: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterHealth {
    #[serde(default)]
    pub cluster_name: String,

    /// `green`, `yellow` or `red`
    pub status: String,

    #[serde(default)]
    pub number_of_nodes: u64,

    #[serde(default)]
    pub active_shards: u64,

    #[serde(default)]
    pub unassigned_shards: u64,
}

impl ClusterHealth {
    pub fn is_available(&self) -> bool {
        self.status == "green" || self.status == "yellow"
    }
}
