//! Index settings and mapping for listing documents

use serde_json::{json, Map, Value};

const CYRILLIC_TO_LATIN: &[&str] = &[
    "а=>a", "б=>b", "в=>v", "г=>g", "д=>d", "ђ=>đ", "е=>e", "ж=>ž", "з=>z", "и=>i",
    "ј=>j", "к=>k", "л=>l", "љ=>lj", "м=>m", "н=>n", "њ=>nj", "о=>o", "п=>p", "р=>r",
    "с=>s", "т=>t", "ћ=>ć", "у=>u", "ф=>f", "х=>h", "ц=>c", "ч=>č", "џ=>dž", "ш=>š",
];

/// Settings and mappings sent when a physical index is created
pub fn listing_index_body() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1,
            "analysis": analysis()
        },
        "mappings": {
            "dynamic_templates": [
                {
                    "translated_titles": {
                        "match": "title_*",
                        "match_mapping_type": "string",
                        "mapping": { "type": "text", "analyzer": "universal_analyzer" }
                    }
                },
                {
                    "translated_descriptions": {
                        "match": "description_*",
                        "match_mapping_type": "string",
                        "mapping": { "type": "text", "analyzer": "universal_analyzer" }
                    }
                }
            ],
            "properties": properties()
        }
    })
}

fn analysis() -> Value {
    json!({
        "char_filter": {
            "serbian_cyrillic_to_latin": {
                "type": "mapping",
                "mappings": CYRILLIC_TO_LATIN
            }
        },
        "filter": {
            "universal_synonyms": {
                "type": "synonym",
                "synonyms": [
                    "telefon,mobilni,smartphone,phone",
                    "patike,sneakers,trainers",
                    "auto,automobil,kola,car",
                    "bicikl,bike,bicycle",
                    "laptop,notebook,računar"
                ]
            },
            "autocomplete_filter": {
                "type": "edge_ngram",
                "min_gram": 2,
                "max_gram": 20
            }
        },
        "analyzer": {
            "universal_analyzer": {
                "type": "custom",
                "tokenizer": "standard",
                "char_filter": ["serbian_cyrillic_to_latin"],
                "filter": ["lowercase", "asciifolding", "universal_synonyms"]
            },
            "autocomplete_analyzer": {
                "type": "custom",
                "tokenizer": "standard",
                "char_filter": ["serbian_cyrillic_to_latin"],
                "filter": ["lowercase", "asciifolding", "autocomplete_filter"]
            },
            "autocomplete_search_analyzer": {
                "type": "custom",
                "tokenizer": "standard",
                "char_filter": ["serbian_cyrillic_to_latin"],
                "filter": ["lowercase", "asciifolding"]
            }
        }
    })
}

fn keyword() -> Value {
    json!({ "type": "keyword" })
}

fn searchable_text() -> Value {
    json!({
        "type": "text",
        "analyzer": "universal_analyzer",
        "fields": {
            "keyword": { "type": "keyword", "ignore_above": 256 },
            "autocomplete": {
                "type": "text",
                "analyzer": "autocomplete_analyzer",
                "search_analyzer": "autocomplete_search_analyzer"
            }
        }
    })
}

fn identity_fields() -> Value {
    json!({
        "id": { "type": "long" },
        "uuid": keyword(),
        "user_id": { "type": "long" },
        "storefront_id": { "type": "long" },
        "document_type": keyword(),
        "title": searchable_text(),
        "description": { "type": "text", "analyzer": "universal_analyzer" },
        "original_language": keyword()
    })
}

fn catalog_fields() -> Value {
    json!({
        "price": { "type": "double" },
        "currency": keyword(),
        "category_id": keyword(),
        "category_slug": keyword(),
        "status": keyword(),
        "visibility": keyword(),
        "quantity": { "type": "integer" },
        "sku": keyword(),
        "source_type": keyword(),
        "stock_status": keyword(),
        "tags": keyword()
    })
}

fn seller_fields() -> Value {
    json!({
        "brand": {
            "type": "keyword",
            "fields": { "text": { "type": "text", "analyzer": "universal_analyzer" } }
        },
        "storefront_name": {
            "type": "keyword",
            "fields": { "text": { "type": "text", "analyzer": "universal_analyzer" } }
        },
        "storefront_slug": keyword(),
        "storefront_rating": { "type": "float" },
        "seller_verified": { "type": "boolean" }
    })
}

fn ranking_fields() -> Value {
    json!({
        "views_count": { "type": "integer" },
        "favorites_count": { "type": "integer" },
        "popularity_score": { "type": "float" },
        "is_new_arrival": { "type": "boolean" },
        "created_at": { "type": "date" },
        "updated_at": { "type": "date" },
        "published_at": { "type": "date" }
    })
}

fn location_fields() -> Value {
    json!({
        "location": { "type": "geo_point" },
        "has_individual_location": { "type": "boolean" },
        "individual_latitude": { "type": "double" },
        "individual_longitude": { "type": "double" },
        "country": keyword(),
        "city": keyword()
    })
}

fn nested_fields() -> Value {
    json!({
        "images": {
            "type": "nested",
            "properties": {
                "id": { "type": "long" },
                "public_url": keyword(),
                "file_path": keyword(),
                "is_main": { "type": "boolean" }
            }
        },
        "attributes": {
            "type": "nested",
            "properties": {
                "id": { "type": "integer" },
                "code": keyword(),
                "name": { "type": "text", "fields": { "keyword": keyword() } },
                "value_text": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword", "ignore_above": 256 } }
                },
                "value_number": { "type": "double" },
                "value_boolean": { "type": "boolean" },
                "is_searchable": { "type": "boolean" },
                "is_filterable": { "type": "boolean" }
            }
        },
        "attributes_searchable_text": { "type": "text", "analyzer": "universal_analyzer" }
    })
}

fn properties() -> Value {
    let mut properties = Map::new();
    for group in [
        identity_fields(),
        catalog_fields(),
        seller_fields(),
        ranking_fields(),
        location_fields(),
        nested_fields(),
    ] {
        if let Value::Object(fields) = group {
            properties.extend(fields);
        }
    }
    Value::Object(properties)
}

/// Top-level field names declared in the mapping
pub fn mapped_fields() -> Vec<String> {
    match properties() {
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Whether a document field is covered by the mapping or a dynamic template
pub fn is_mapped(field: &str) -> bool {
    field.starts_with("title_")
        || field.starts_with("description_")
        || properties().get(field).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_fields_are_mapped() {
        for field in ["title", "price", "category_id", "status"] {
            assert!(is_mapped(field), "{} missing from mapping", field);
        }
    }

    #[test]
    fn test_body_shape() {
        let body = listing_index_body();
        assert_eq!(body["mappings"]["properties"]["location"]["type"], "geo_point");
        assert_eq!(body["mappings"]["properties"]["attributes"]["type"], "nested");
        assert!(body["settings"]["analysis"]["analyzer"]["universal_analyzer"].is_object());
    }

    #[test]
    fn test_image_properties() {
        let body = listing_index_body();
        let images = &body["mappings"]["properties"]["images"];
        assert_eq!(images["type"], "nested");

        let mut names: Vec<&String> = images["properties"].as_object().unwrap().keys().collect();
        names.sort();
        assert_eq!(names, vec!["file_path", "id", "is_main", "public_url"]);
        assert_eq!(images["properties"]["is_main"]["type"], "boolean");
    }

    #[test]
    fn test_translations_use_dynamic_templates() {
        assert!(is_mapped("title_en"));
        assert!(is_mapped("description_ru"));
        assert!(!is_mapped("unknown_field"));
        assert!(mapped_fields().contains(&"attributes_searchable_text".to_string()));
    }
}
