//! In-process search backend for tests and dry runs

use crate::search::backend::{BulkOutcome, ClusterHealth, ReindexSummary, SearchBackend};
use crate::search::bulk::encode_bulk;
use crate::search::{AliasAction, ListingDocument, SearchDocument, SearchError, SearchResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct IndexState {
    body: Value,
    documents: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct Inner {
    indices: HashMap<String, IndexState>,
    aliases: HashMap<String, Vec<String>>,
    alias_updates: Vec<Vec<AliasAction>>,
    failing: HashSet<&'static str>,
}

/// Search backend holding indices and aliases in memory.
///
/// Writes through an alias go to the single index it is bound to. Counts
/// understand `exists` queries; free-text queries match on title,
/// description and searchable attribute text.
#[derive(Debug, Clone, Default)]
pub struct InMemorySearchBackend {
    inner: Arc<RwLock<Inner>>,
}

impl InMemorySearchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `operation` (trait method name) fail with a 503
    pub fn fail_on(&self, operation: &'static str) {
        self.inner.write().failing.insert(operation);
    }

    pub fn clear_failures(&self) {
        self.inner.write().failing.clear();
    }

    /// Every `update_aliases` call received, in order
    pub fn alias_updates(&self) -> Vec<Vec<AliasAction>> {
        self.inner.read().alias_updates.clone()
    }

    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().indices.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stored source of one document
    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        let inner = self.inner.read();
        let name = resolve(&inner, index).ok()?;
        inner.indices.get(&name)?.documents.get(id).cloned()
    }

    /// Store a raw document, bypassing assembly
    pub fn insert_raw(&self, index: &str, id: impl Into<String>, source: Value) -> SearchResult<()> {
        let mut inner = self.inner.write();
        let name = resolve(&inner, index)?;
        if let Some(state) = inner.indices.get_mut(&name) {
            state.documents.insert(id.into(), source);
        }
        Ok(())
    }

    /// Settings/mappings body an index was created with
    pub fn index_body(&self, index: &str) -> Option<Value> {
        self.inner.read().indices.get(index).map(|state| state.body.clone())
    }

    fn guard(&self, operation: &'static str) -> SearchResult<()> {
        if self.inner.read().failing.contains(operation) {
            return Err(SearchError::Status {
                status: 503,
                body: format!("injected failure in {}", operation),
            });
        }
        Ok(())
    }
}

/// Physical index behind `name`, following a single-index alias
fn resolve(inner: &Inner, name: &str) -> SearchResult<String> {
    if inner.indices.contains_key(name) {
        return Ok(name.to_string());
    }
    match inner.aliases.get(name).map(Vec::as_slice) {
        Some([index]) => Ok(index.clone()),
        _ => Err(SearchError::IndexNotFound(name.to_string())),
    }
}

fn field_present(source: &Value, field: &str) -> bool {
    source.get(field).is_some_and(|value| match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        _ => true,
    })
}

fn matches_text(source: &Value, text: &str) -> bool {
    let needle = text.to_lowercase();
    ["title", "description", "attributes_searchable_text"]
        .iter()
        .filter_map(|field| source.get(*field).and_then(Value::as_str))
        .any(|haystack| haystack.to_lowercase().contains(&needle))
}

#[async_trait]
impl SearchBackend for InMemorySearchBackend {
    async fn index_exists(&self, index: &str) -> SearchResult<bool> {
        self.guard("index_exists")?;
        Ok(self.inner.read().indices.contains_key(index))
    }

    async fn create_index(&self, index: &str, body: &Value) -> SearchResult<()> {
        self.guard("create_index")?;
        let mut inner = self.inner.write();
        if inner.indices.contains_key(index) {
            return Err(SearchError::Status {
                status: 400,
                body: format!("resource_already_exists_exception: {}", index),
            });
        }
        inner.indices.insert(
            index.to_string(),
            IndexState {
                body: body.clone(),
                documents: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> SearchResult<()> {
        self.guard("delete_index")?;
        let mut inner = self.inner.write();
        inner.indices.remove(index);
        for bound in inner.aliases.values_mut() {
            bound.retain(|name| name != index);
        }
        inner.aliases.retain(|_, bound| !bound.is_empty());
        Ok(())
    }

    async fn upsert_document(&self, index: &str, document: &ListingDocument) -> SearchResult<()> {
        self.guard("upsert_document")?;
        let source = serde_json::to_value(document)?;
        let mut inner = self.inner.write();
        let name = resolve(&inner, index)?;
        if let Some(state) = inner.indices.get_mut(&name) {
            state.documents.insert(document.document_id(), source);
        }
        Ok(())
    }

    async fn delete_document(&self, index: &str, id: &str) -> SearchResult<bool> {
        self.guard("delete_document")?;
        let mut inner = self.inner.write();
        let name = resolve(&inner, index)?;
        Ok(inner
            .indices
            .get_mut(&name)
            .and_then(|state| state.documents.remove(id))
            .is_some())
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        documents: &[ListingDocument],
    ) -> SearchResult<BulkOutcome> {
        self.guard("bulk_upsert")?;
        let body = encode_bulk(index, documents);
        if body.serialized == 0 {
            return Err(SearchError::BulkFailed(format!(
                "none of {} documents could be serialized",
                documents.len()
            )));
        }

        let mut inner = self.inner.write();
        let name = resolve(&inner, index)?;
        let skipped: HashSet<&str> = body.skipped.iter().map(|(id, _)| id.as_str()).collect();
        let mut indexed = 0;
        if let Some(state) = inner.indices.get_mut(&name) {
            for document in documents {
                let id = document.document_id();
                if skipped.contains(id.as_str()) {
                    continue;
                }
                state.documents.insert(id, serde_json::to_value(document)?);
                indexed += 1;
            }
        }

        Ok(BulkOutcome {
            indexed,
            skipped: body.skipped,
        })
    }

    async fn get_alias(&self, alias: &str) -> SearchResult<Vec<String>> {
        self.guard("get_alias")?;
        let mut bound = self
            .inner
            .read()
            .aliases
            .get(alias)
            .cloned()
            .unwrap_or_default();
        bound.sort();
        Ok(bound)
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> SearchResult<()> {
        self.guard("update_aliases")?;
        let mut inner = self.inner.write();

        // Validate everything before applying anything
        for action in actions {
            if let AliasAction::Add { index, .. } = action {
                if !inner.indices.contains_key(index) {
                    return Err(SearchError::IndexNotFound(index.clone()));
                }
            }
        }

        let mut aliases = inner.aliases.clone();
        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    let bound = aliases.entry(alias.clone()).or_default();
                    if !bound.contains(index) {
                        bound.push(index.clone());
                    }
                }
                AliasAction::Remove { index, alias } => {
                    let Some(bound) = aliases.get_mut(alias) else {
                        return Err(SearchError::Status {
                            status: 404,
                            body: format!("aliases [{}] missing", alias),
                        });
                    };
                    bound.retain(|name| name != index);
                }
            }
        }
        aliases.retain(|_, bound| !bound.is_empty());

        inner.aliases = aliases;
        inner.alias_updates.push(actions.to_vec());
        Ok(())
    }

    async fn refresh(&self, index: &str) -> SearchResult<()> {
        self.guard("refresh")?;
        resolve(&self.inner.read(), index).map(|_| ())
    }

    async fn count(&self, index: &str, query: Option<&Value>) -> SearchResult<u64> {
        self.guard("count")?;
        let inner = self.inner.read();
        let name = resolve(&inner, index)?;
        let Some(state) = inner.indices.get(&name) else {
            return Err(SearchError::IndexNotFound(index.to_string()));
        };

        let exists_field = query
            .and_then(|q| q.get("exists"))
            .and_then(|exists| exists.get("field"))
            .and_then(Value::as_str);

        let count = match exists_field {
            Some(field) => state
                .documents
                .values()
                .filter(|source| field_present(source, field))
                .count(),
            None => state.documents.len(),
        };
        Ok(count as u64)
    }

    async fn sample_query(&self, index: &str, text: &str) -> SearchResult<u64> {
        self.guard("sample_query")?;
        let inner = self.inner.read();
        let name = resolve(&inner, index)?;
        Ok(inner
            .indices
            .get(&name)
            .map(|state| {
                state
                    .documents
                    .values()
                    .filter(|source| matches_text(source, text))
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn reindex(&self, source: &str, dest: &str) -> SearchResult<ReindexSummary> {
        self.guard("reindex")?;
        let mut inner = self.inner.write();
        let source_name = resolve(&inner, source)?;
        let dest_name = resolve(&inner, dest)?;

        let documents = inner
            .indices
            .get(&source_name)
            .map(|state| state.documents.clone())
            .unwrap_or_default();

        let mut summary = ReindexSummary {
            total: documents.len() as u64,
            ..Default::default()
        };
        if let Some(target) = inner.indices.get_mut(&dest_name) {
            for (id, document) in documents {
                if target.documents.insert(id, document).is_some() {
                    summary.updated += 1;
                } else {
                    summary.created += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn cluster_health(&self) -> SearchResult<ClusterHealth> {
        self.guard("cluster_health")?;
        let inner = self.inner.read();
        Ok(ClusterHealth {
            cluster_name: "in-memory".to_string(),
            status: "green".to_string(),
            number_of_nodes: 1,
            active_shards: inner.indices.len() as u64,
            unassigned_shards: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_alias_update_is_all_or_nothing() {
        let backend = InMemorySearchBackend::new();
        backend.create_index("items_v1", &json!({})).await.unwrap();

        let actions = vec![
            AliasAction::Add {
                index: "items_v1".into(),
                alias: "items".into(),
            },
            AliasAction::Add {
                index: "items_v2".into(),
                alias: "items".into(),
            },
        ];
        assert!(backend.update_aliases(&actions).await.is_err());
        assert!(backend.get_alias("items").await.unwrap().is_empty());
        assert!(backend.alias_updates().is_empty());
    }

    #[tokio::test]
    async fn test_writes_through_alias_and_exists_count() {
        let backend = InMemorySearchBackend::new();
        backend.create_index("items_v1", &json!({})).await.unwrap();
        backend
            .update_aliases(&[AliasAction::Add {
                index: "items_v1".into(),
                alias: "items".into(),
            }])
            .await
            .unwrap();

        backend.insert_raw("items", "1", json!({"title": "Telefon", "price": 10.0})).unwrap();
        backend.insert_raw("items", "2", json!({"title": "Patike"})).unwrap();

        assert_eq!(backend.count("items_v1", None).await.unwrap(), 2);
        assert_eq!(backend.count_field_exists("items", "price").await.unwrap(), 1);
        assert_eq!(backend.sample_query("items", "telefon").await.unwrap(), 1);
        assert!(backend.delete_document("items", "2").await.unwrap());
        assert!(!backend.delete_document("items", "2").await.unwrap());
    }

    #[tokio::test]
    async fn test_deleting_index_unbinds_alias() {
        let backend = InMemorySearchBackend::new();
        backend.create_index("items_v1", &json!({})).await.unwrap();
        backend
            .update_aliases(&[AliasAction::Add {
                index: "items_v1".into(),
                alias: "items".into(),
            }])
            .await
            .unwrap();

        backend.delete_index("items_v1").await.unwrap();
        backend.delete_index("items_v1").await.unwrap();
        assert!(backend.get_alias("items").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let backend = InMemorySearchBackend::new();
        backend.fail_on("cluster_health");
        let err = backend.cluster_health().await.unwrap_err();
        assert!(err.is_transient());

        backend.clear_failures();
        assert!(backend.cluster_health().await.unwrap().is_available());
    }
}
