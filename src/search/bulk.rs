//! Newline-delimited bulk request encoding and response checks

use crate::search::{SearchDocument, SearchError, SearchResult};
use serde_json::{json, Value};
use tracing::warn;

/// Item errors quoted in a bulk failure message
const MAX_QUOTED_ITEM_ERRORS: usize = 5;

/// Encoded bulk request body
#[derive(Debug, Clone, Default)]
pub struct BulkBody {
    pub payload: String,
    pub serialized: usize,
    pub skipped: Vec<(String, String)>,
}

/// Encode one action line and one source line per document.
///
/// A document that fails to serialize is logged and left out.
pub fn encode_bulk<T: SearchDocument>(index: &str, documents: &[T]) -> BulkBody {
    let mut body = BulkBody::default();

    for document in documents {
        let id = document.document_id();
        let source = match serde_json::to_string(document) {
            Ok(source) => source,
            Err(e) => {
                warn!(index, document_id = %id, error = %e, "Skipping document that failed to serialize");
                body.skipped.push((id, e.to_string()));
                continue;
            }
        };

        let action = json!({ "index": { "_index": index, "_id": id } });
        body.payload.push_str(&action.to_string());
        body.payload.push('\n');
        body.payload.push_str(&source);
        body.payload.push('\n');
        body.serialized += 1;
    }

    body
}

/// Fail when the response envelope reports item errors
pub fn check_bulk_response(response: &Value) -> SearchResult<u64> {
    let items = response
        .get("items")
        .and_then(Value::as_array)
        .map(|items| items.len() as u64)
        .unwrap_or(0);

    if !response.get("errors").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(items);
    }

    let failed: Vec<String> = response
        .get("items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.as_object()?.values().next())
        .filter_map(|result| {
            let error = result.get("error")?;
            let id = result.get("_id").and_then(Value::as_str).unwrap_or("?");
            let reason = error
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            Some(format!("{}: {}", id, reason))
        })
        .collect();

    Err(SearchError::BulkFailed(format!(
        "{} of {} items failed (first: {})",
        failed.len(),
        items,
        failed
            .iter()
            .take(MAX_QUOTED_ITEM_ERRORS)
            .cloned()
            .collect::<Vec<_>>()
            .join("; ")
    )))
}
