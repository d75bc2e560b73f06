use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute metadata owned by catalog administration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub id: i32,

    /// Stable external key
    pub code: String,

    /// Localized names keyed by locale code
    pub name: BTreeMap<String, String>,

    pub is_searchable: bool,

    pub is_filterable: bool,

    pub sort_order: i32,

    pub is_active: bool,
}

impl AttributeDefinition {
    pub fn new(id: i32, code: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            name: BTreeMap::new(),
            is_searchable: false,
            is_filterable: false,
            sort_order: 0,
            is_active: true,
        }
    }

    pub fn with_name(mut self, locale: impl Into<String>, name: impl Into<String>) -> Self {
        self.name.insert(locale.into(), name.into());
        self
    }

    pub fn searchable(mut self, searchable: bool) -> Self {
        self.is_searchable = searchable;
        self
    }

    pub fn filterable(mut self, filterable: bool) -> Self {
        self.is_filterable = filterable;
        self
    }

    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }
}

/// A single typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeScalar {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl From<&str> for AttributeScalar {
    fn from(value: &str) -> Self {
        AttributeScalar::Text(value.to_string())
    }
}

impl From<String> for AttributeScalar {
    fn from(value: String) -> Self {
        AttributeScalar::Text(value)
    }
}

impl From<f64> for AttributeScalar {
    fn from(value: f64) -> Self {
        AttributeScalar::Number(value)
    }
}

impl From<bool> for AttributeScalar {
    fn from(value: bool) -> Self {
        AttributeScalar::Boolean(value)
    }
}

/// One EAV row: the value of one attribute for one listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub entity_id: i64,
    pub attribute_id: i32,
    pub value: AttributeScalar,
}

impl AttributeValue {
    pub fn new(entity_id: i64, attribute_id: i32, value: impl Into<AttributeScalar>) -> Self {
        Self {
            entity_id,
            attribute_id,
            value: value.into(),
        }
    }

    /// Build from the three nullable storage columns.
    ///
    /// Text wins over number, number over boolean. Returns `None` when every
    /// column is null.
    pub fn from_columns(
        entity_id: i64,
        attribute_id: i32,
        value_text: Option<String>,
        value_number: Option<f64>,
        value_boolean: Option<bool>,
    ) -> Option<Self> {
        let value = match (value_text, value_number, value_boolean) {
            (Some(text), _, _) => AttributeScalar::Text(text),
            (None, Some(number), _) => AttributeScalar::Number(number),
            (None, None, Some(flag)) => AttributeScalar::Boolean(flag),
            (None, None, None) => return None,
        };
        Some(Self {
            entity_id,
            attribute_id,
            value,
        })
    }
}

/// An attribute value joined to its definition
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRow {
    pub definition: AttributeDefinition,
    pub value: AttributeValue,
}

/// Flattened attribute as stored in the cache and copied into documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeForIndex {
    pub id: i32,
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_number: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_boolean: Option<bool>,
    pub is_searchable: bool,
    pub is_filterable: bool,
}

impl AttributeForIndex {
    pub fn new(definition: &AttributeDefinition, name: String, value: &AttributeScalar) -> Self {
        let (value_text, value_number, value_boolean) = match value {
            AttributeScalar::Text(text) => (Some(text.clone()), None, None),
            AttributeScalar::Number(number) => (None, Some(*number), None),
            AttributeScalar::Boolean(flag) => (None, None, Some(*flag)),
        };
        Self {
            id: definition.id,
            code: definition.code.clone(),
            name,
            value_text,
            value_number,
            value_boolean,
            is_searchable: definition.is_searchable,
            is_filterable: definition.is_filterable,
        }
    }

    /// The populated value slot, if any
    pub fn scalar(&self) -> Option<AttributeScalar> {
        if let Some(ref text) = self.value_text {
            return Some(AttributeScalar::Text(text.clone()));
        }
        if let Some(number) = self.value_number {
            return Some(AttributeScalar::Number(number));
        }
        self.value_boolean.map(AttributeScalar::Boolean)
    }
}

/// Denormalized, rebuildable attribute state for one listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeCacheEntry {
    pub entity_id: i64,
    pub attributes_flat: Vec<AttributeForIndex>,
    pub attributes_searchable: String,
    pub attributes_filterable: BTreeMap<String, AttributeScalar>,
    pub cache_version: i32,
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_columns_prefers_text() {
        let value = AttributeValue::from_columns(1, 2, Some("red".into()), Some(3.0), None).unwrap();
        assert_eq!(value.value, AttributeScalar::Text("red".into()));

        let value = AttributeValue::from_columns(1, 2, None, None, Some(false)).unwrap();
        assert_eq!(value.value, AttributeScalar::Boolean(false));

        assert!(AttributeValue::from_columns(1, 2, None, None, None).is_none());
    }

    #[test]
    fn test_flat_entry_has_exactly_one_slot() {
        let def = AttributeDefinition::new(7, "weight");
        let entry = AttributeForIndex::new(&def, "Weight".into(), &AttributeScalar::Number(1.5));

        let populated = [
            entry.value_text.is_some(),
            entry.value_number.is_some(),
            entry.value_boolean.is_some(),
        ];
        assert_eq!(populated.iter().filter(|p| **p).count(), 1);
        assert_eq!(entry.scalar(), Some(AttributeScalar::Number(1.5)));
    }

    #[test]
    fn test_flat_entry_serialization_omits_empty_slots() {
        let def = AttributeDefinition::new(3, "brand").searchable(true);
        let entry = AttributeForIndex::new(&def, "Brand".into(), &AttributeScalar::from("Nike"));
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["value_text"], "Nike");
        assert!(json.get("value_number").is_none());
        assert!(json.get("value_boolean").is_none());
    }

    #[test]
    fn test_scalar_untagged_serialization() {
        let mut map = BTreeMap::new();
        map.insert("brand".to_string(), AttributeScalar::from("Nike"));
        map.insert("price".to_string(), AttributeScalar::from(99.99));
        map.insert("used".to_string(), AttributeScalar::from(true));

        let text = serde_json::to_string(&map).unwrap();
        assert_eq!(text, r#"{"brand":"Nike","price":99.99,"used":true}"#);

        let back: BTreeMap<String, AttributeScalar> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, map);
    }
}
