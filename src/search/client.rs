//! OpenSearch/Elasticsearch HTTP client

use crate::search::backend::{BulkOutcome, ClusterHealth, ReindexSummary, SearchBackend};
use crate::search::bulk::{check_bulk_response, encode_bulk};
use crate::search::{AliasAction, ListingDocument, SearchConfig, SearchDocument, SearchError, SearchResult};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const NDJSON: &str = "application/x-ndjson";

/// Fields searched by sanity queries
const SAMPLE_QUERY_FIELDS: [&str; 3] = ["title^3", "description", "attributes_searchable_text"];

/// Search engine client over its REST API
#[derive(Clone)]
pub struct OpenSearchClient {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    reindex_timeout: Duration,
}

impl OpenSearchClient {
    pub fn new(config: &SearchConfig) -> SearchResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SearchError::InvalidConfiguration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            reindex_timeout: config.reindex_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.client.request(method, url);
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_deref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> SearchResult<Response> {
        Ok(builder.send().await?)
    }

    /// Turn a non-success response into `Status` with its body
    async fn expect_success(response: Response) -> SearchResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(SearchError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn json_body(response: Response) -> SearchResult<Value> {
        let response = Self::expect_success(response).await?;
        Ok(response.json::<Value>().await?)
    }

    fn index_not_found(index: &str, response: &Response) -> Option<SearchError> {
        (response.status() == StatusCode::NOT_FOUND).then(|| SearchError::IndexNotFound(index.to_string()))
    }
}

#[async_trait]
impl SearchBackend for OpenSearchClient {
    async fn index_exists(&self, index: &str) -> SearchResult<bool> {
        let response = self.send(self.request(Method::HEAD, index)).await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(SearchError::Status {
                status: status.as_u16(),
                body: String::new(),
            }),
        }
    }

    async fn create_index(&self, index: &str, body: &Value) -> SearchResult<()> {
        let response = self
            .send(self.request(Method::PUT, index).json(body))
            .await?;
        Self::expect_success(response).await?;

        info!(index, "Index created");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> SearchResult<()> {
        let response = self.send(self.request(Method::DELETE, index)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(index, "Index already absent");
            return Ok(());
        }
        Self::expect_success(response).await?;

        info!(index, "Index deleted");
        Ok(())
    }

    async fn upsert_document(&self, index: &str, document: &ListingDocument) -> SearchResult<()> {
        let path = format!("{}/_doc/{}", index, document.document_id());
        let response = self
            .send(self.request(Method::PUT, &path).json(document))
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn delete_document(&self, index: &str, id: &str) -> SearchResult<bool> {
        let path = format!("{}/_doc/{}", index, id);
        let response = self.send(self.request(Method::DELETE, &path)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::expect_success(response).await?;
        Ok(true)
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        documents: &[ListingDocument],
    ) -> SearchResult<BulkOutcome> {
        let body = encode_bulk(index, documents);
        if body.serialized == 0 {
            return Err(SearchError::BulkFailed(format!(
                "none of {} documents could be serialized",
                documents.len()
            )));
        }

        let response = self
            .send(
                self.request(Method::POST, "_bulk")
                    .header(reqwest::header::CONTENT_TYPE, NDJSON)
                    .body(body.payload),
            )
            .await?;
        let envelope = Self::json_body(response).await?;
        let indexed = check_bulk_response(&envelope)?;

        debug!(index, indexed, skipped = body.skipped.len(), "Bulk request accepted");
        Ok(BulkOutcome {
            indexed,
            skipped: body.skipped,
        })
    }

    async fn get_alias(&self, alias: &str) -> SearchResult<Vec<String>> {
        let response = self
            .send(self.request(Method::GET, &format!("_alias/{}", alias)))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let body = Self::json_body(response).await?;
        let mut indices: Vec<String> = body
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        indices.sort();
        Ok(indices)
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> SearchResult<()> {
        let response = self
            .send(
                self.request(Method::POST, "_aliases")
                    .json(&json!({ "actions": actions })),
            )
            .await?;
        let body = Self::json_body(response).await?;

        if body.get("acknowledged").and_then(Value::as_bool) == Some(false) {
            return Err(SearchError::Status {
                status: 200,
                body: "alias update not acknowledged".to_string(),
            });
        }
        Ok(())
    }

    async fn refresh(&self, index: &str) -> SearchResult<()> {
        let response = self
            .send(self.request(Method::POST, &format!("{}/_refresh", index)))
            .await?;
        if let Some(err) = Self::index_not_found(index, &response) {
            return Err(err);
        }
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn count(&self, index: &str, query: Option<&Value>) -> SearchResult<u64> {
        let path = format!("{}/_count", index);
        let builder = match query {
            Some(query) => self
                .request(Method::POST, &path)
                .json(&json!({ "query": query })),
            None => self.request(Method::GET, &path),
        };

        let response = self.send(builder).await?;
        if let Some(err) = Self::index_not_found(index, &response) {
            return Err(err);
        }
        let body = Self::json_body(response).await?;

        body.get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| SearchError::Serialization("count response has no count".to_string()))
    }

    async fn sample_query(&self, index: &str, text: &str) -> SearchResult<u64> {
        let query = json!({
            "size": 0,
            "track_total_hits": true,
            "query": {
                "multi_match": {
                    "query": text,
                    "fields": SAMPLE_QUERY_FIELDS
                }
            }
        });

        let response = self
            .send(
                self.request(Method::POST, &format!("{}/_search", index))
                    .json(&query),
            )
            .await?;
        if let Some(err) = Self::index_not_found(index, &response) {
            return Err(err);
        }
        let body = Self::json_body(response).await?;

        let total = &body["hits"]["total"];
        total
            .get("value")
            .and_then(Value::as_u64)
            .or_else(|| total.as_u64())
            .ok_or_else(|| SearchError::Serialization("search response has no hit total".to_string()))
    }

    async fn reindex(&self, source: &str, dest: &str) -> SearchResult<ReindexSummary> {
        let body = json!({
            "source": { "index": source },
            "dest": { "index": dest }
        });

        info!(source, dest, "Starting server-side reindex");
        let response = self
            .send(
                self.request(Method::POST, "_reindex?wait_for_completion=true&refresh=true")
                    .timeout(self.reindex_timeout)
                    .json(&body),
            )
            .await?;
        let summary: ReindexSummary = serde_json::from_value(Self::json_body(response).await?)?;

        if !summary.failures.is_empty() {
            warn!(source, dest, failures = summary.failures.len(), "Server-side reindex reported failures");
            return Err(SearchError::BulkFailed(format!(
                "reindex {} -> {} had {} failures, first: {}",
                source,
                dest,
                summary.failures.len(),
                summary.failures[0]
            )));
        }

        info!(source, dest, total = summary.total, took_ms = summary.took, "Server-side reindex finished");
        Ok(summary)
    }

    async fn cluster_health(&self) -> SearchResult<ClusterHealth> {
        let response = self.send(self.request(Method::GET, "_cluster/health")).await?;
        let body = Self::json_body(response).await?;
        Ok(serde_json::from_value(body)?)
    }
}
