use crate::attributes::CacheResult;
use crate::config::AttributesConfig;
use crate::models::{AttributeDefinition, AttributeForIndex, AttributeRow, AttributeScalar};
use crate::state::CatalogRepository;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Locale order used to pick an attribute's display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalePreference {
    pub preferred: String,
    pub secondary: String,
}

impl LocalePreference {
    pub fn new(preferred: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            preferred: preferred.into(),
            secondary: secondary.into(),
        }
    }

    /// Preferred locale, then secondary, then the lowest locale code present,
    /// then the attribute code itself
    pub fn resolve(&self, definition: &AttributeDefinition) -> String {
        let named = |locale: &str| {
            definition
                .name
                .get(locale)
                .filter(|name| !name.trim().is_empty())
                .cloned()
        };

        named(&self.preferred)
            .or_else(|| named(&self.secondary))
            .or_else(|| {
                definition
                    .name
                    .values()
                    .find(|name| !name.trim().is_empty())
                    .cloned()
            })
            .unwrap_or_else(|| definition.code.clone())
    }
}

impl Default for LocalePreference {
    fn default() -> Self {
        Self::from(&AttributesConfig::default())
    }
}

impl From<&AttributesConfig> for LocalePreference {
    fn from(config: &AttributesConfig) -> Self {
        Self::new(&config.preferred_locale, &config.secondary_locale)
    }
}

/// The three artifacts derived from one entity's attribute rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltAttributes {
    pub flat: Vec<AttributeForIndex>,
    pub searchable: String,
    pub filterable: BTreeMap<String, AttributeScalar>,
}

impl BuiltAttributes {
    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }
}

/// Searchable text form of a value; `None` for empty text
pub fn searchable_token(value: &AttributeScalar) -> Option<String> {
    match value {
        AttributeScalar::Text(text) if text.trim().is_empty() => None,
        AttributeScalar::Text(text) => Some(text.clone()),
        AttributeScalar::Number(number) => Some(format!("{:.2}", number)),
        AttributeScalar::Boolean(true) => Some("yes".to_string()),
        AttributeScalar::Boolean(false) => Some("no".to_string()),
    }
}

/// Reads EAV rows and flattens them into cacheable form
#[derive(Clone)]
pub struct AttributeCacheBuilder {
    repository: Arc<dyn CatalogRepository>,
    locales: LocalePreference,
}

impl AttributeCacheBuilder {
    pub fn new(repository: Arc<dyn CatalogRepository>, locales: LocalePreference) -> Self {
        Self {
            repository,
            locales,
        }
    }

    pub fn locales(&self) -> &LocalePreference {
        &self.locales
    }

    /// Load and flatten the attributes of one entity
    pub async fn build(&self, entity_id: i64) -> CacheResult<BuiltAttributes> {
        let rows = self.repository.attribute_rows(entity_id).await?;
        debug!(entity_id, rows = rows.len(), "Loaded attribute rows");
        Ok(self.flatten(rows))
    }

    /// Flatten rows in (sort_order, display name, id) order.
    ///
    /// Inactive definitions are dropped. An empty input yields empty output.
    pub fn flatten(&self, rows: Vec<AttributeRow>) -> BuiltAttributes {
        let mut named: Vec<(String, AttributeRow)> = rows
            .into_iter()
            .filter(|row| row.definition.is_active)
            .map(|row| (self.locales.resolve(&row.definition), row))
            .collect();

        named.sort_by(|(a_name, a), (b_name, b)| {
            a.definition
                .sort_order
                .cmp(&b.definition.sort_order)
                .then_with(|| a_name.cmp(b_name))
                .then_with(|| a.definition.id.cmp(&b.definition.id))
        });

        let mut built = BuiltAttributes::default();
        let mut tokens = Vec::new();

        for (name, row) in named {
            let definition = &row.definition;
            let value = &row.value.value;

            if definition.is_searchable {
                if let Some(token) = searchable_token(value) {
                    tokens.push(token);
                }
            }
            if definition.is_filterable {
                built
                    .filterable
                    .insert(definition.code.clone(), value.clone());
            }
            built
                .flat
                .push(AttributeForIndex::new(definition, name, value));
        }

        built.searchable = tokens.join(" ");
        built
    }
}
