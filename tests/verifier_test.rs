mod common;

use catalog_indexer::{
    context::{Interrupted, JobContext},
    reindex::{IndexVerifier, ReindexError, CRITICAL_FIELDS},
    search::SearchBackend,
};
use common::Harness;
use serde_json::{json, Value};

const INDEX: &str = "listings_candidate";

fn source(id: i64, with_title: bool, with_price: bool) -> Value {
    let mut doc = json!({
        "id": id,
        "category_id": "electronics",
        "status": "active",
    });
    if with_title {
        doc["title"] = json!(format!("Telefon {}", id));
    }
    if with_price {
        doc["price"] = json!(100.0 + id as f64);
    }
    doc
}

/// Candidate index of `docs` documents; the first `titled` carry a title, the first `priced` a price
async fn candidate(h: &Harness, docs: i64, titled: i64, priced: i64) {
    h.backend.create_index(INDEX, &json!({})).await.unwrap();
    for id in 1..=docs {
        h.backend
            .insert_raw(INDEX, id.to_string(), source(id, id <= titled, id <= priced))
            .unwrap();
    }
}

#[tokio::test]
async fn test_low_field_coverage_is_rejected() {
    let h = Harness::new();
    h.seed_listings(1000);
    candidate(&h, 960, 940, 960).await;

    let result = h
        .verifier(&["telefon"])
        .verify(&JobContext::new(), INDEX)
        .await
        .unwrap();

    assert!(!result.valid);
    assert_eq!(result.total_docs, 960);
    assert_eq!(result.expected_docs, 1000);
    assert_eq!(result.mismatched_count, 40);
    assert_eq!(
        result.sample_errors,
        vec!["field title coverage too low: 97.92%".to_string()]
    );
    assert_eq!(result.field_coverage["price"], 100.0);
    assert_eq!(result.field_coverage.len(), CRITICAL_FIELDS.len());
}

#[tokio::test]
async fn test_low_volume_is_rejected() {
    let h = Harness::new();
    h.seed_listings(1000);
    candidate(&h, 900, 900, 900).await;

    let result = h
        .verifier(&[])
        .verify(&JobContext::new(), INDEX)
        .await
        .unwrap();

    assert!(!result.valid);
    assert_eq!(
        result.sample_errors,
        vec!["document count too low: expected 1000, got 900 (90.00%)".to_string()]
    );
    assert!((result.volume_percent() - 90.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_volume_at_threshold_passes() {
    let h = Harness::new();
    h.seed_listings(100);
    candidate(&h, 95, 95, 95).await;

    let result = h
        .verifier(&["telefon"])
        .verify(&JobContext::new(), INDEX)
        .await
        .unwrap();

    assert!(result.valid, "{:?}", result.sample_errors);
    assert_eq!(result.sanity_hits["telefon"], 95);
}

#[tokio::test]
async fn test_findings_accumulate() {
    let h = Harness::new();
    h.seed_listings(1000);
    candidate(&h, 900, 900, 850).await;

    let result = h
        .verifier(&[])
        .verify(&JobContext::new(), INDEX)
        .await
        .unwrap();

    assert!(!result.valid);
    assert_eq!(result.sample_errors.len(), 2);
    assert!(result.sample_errors[0].starts_with("document count too low"));
    assert_eq!(result.sample_errors[1], "field price coverage too low: 94.44%");
}

#[tokio::test]
async fn test_zero_hit_sanity_query_only_warns() {
    let h = Harness::new();
    h.seed_listings(10);
    candidate(&h, 10, 10, 10).await;

    let result = h
        .verifier(&["telefon", "bicikl"])
        .verify(&JobContext::new(), INDEX)
        .await
        .unwrap();

    assert!(result.valid);
    assert_eq!(result.sanity_hits["bicikl"], 0);
    assert_eq!(
        result.warnings,
        vec!["sanity query 'bicikl' returned no hits".to_string()]
    );
}

#[tokio::test]
async fn test_failed_sanity_query_is_a_finding() {
    let h = Harness::new();
    h.seed_listings(10);
    candidate(&h, 10, 10, 10).await;
    h.backend.fail_on("sample_query");

    let result = h
        .verifier(&["telefon"])
        .verify(&JobContext::new(), INDEX)
        .await
        .unwrap();

    assert!(!result.valid);
    assert_eq!(result.sample_errors.len(), 1);
    assert!(result.sample_errors[0].starts_with("sanity query 'telefon' failed"));
}

#[tokio::test]
async fn test_unreachable_index_is_a_finding() {
    let h = Harness::new();
    h.seed_listings(5);
    candidate(&h, 5, 5, 5).await;
    h.backend.fail_on("count");

    let result = h
        .verifier(&[])
        .verify(&JobContext::new(), INDEX)
        .await
        .unwrap();

    assert!(!result.valid);
    assert!(result.sample_errors[0].starts_with("could not count documents in listings_candidate"));
    assert!(result.field_coverage.is_empty());
}

#[tokio::test]
async fn test_empty_catalog_and_index_are_valid() {
    let h = Harness::new();
    h.backend.create_index(INDEX, &json!({})).await.unwrap();

    let result = h
        .verifier(&[])
        .verify(&JobContext::new(), INDEX)
        .await
        .unwrap();

    assert!(result.valid);
    assert_eq!(result.volume_percent(), 100.0);
    assert_eq!(
        result.warnings,
        vec!["index is empty, field coverage not checked".to_string()]
    );
}

#[tokio::test]
async fn test_cancellation_is_an_error() {
    let h = Harness::new();
    h.seed_listings(3);
    candidate(&h, 3, 3, 3).await;
    let ctx = JobContext::new();
    ctx.cancel();

    let err = h.verifier(&["telefon"]).verify(&ctx, INDEX).await.unwrap_err();
    assert!(matches!(err, ReindexError::Interrupted(Interrupted::Cancelled)));
}
