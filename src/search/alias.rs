//! Blue-green index naming.
//!
//! Two physical indices, `<alias>_v1` and `<alias>_v2`, take turns being bound
//! to the alias. All index names are derived here.

use crate::search::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One of the two physical index versions
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum IndexVersion {
    V1,
    V2,
}

impl IndexVersion {
    /// Probe order used when the alias is missing
    pub const ALL: [IndexVersion; 2] = [IndexVersion::V1, IndexVersion::V2];

    /// The version that is not `self`
    pub fn other(self) -> Self {
        match self {
            IndexVersion::V1 => IndexVersion::V2,
            IndexVersion::V2 => IndexVersion::V1,
        }
    }
}

/// Naming convention for one alias and its two versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNaming {
    alias: String,
}

impl IndexNaming {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Physical index name for `version`
    pub fn index_name(&self, version: IndexVersion) -> String {
        format!("{}_{}", self.alias, version)
    }

    /// Version of a physical index name belonging to this alias
    pub fn version_of(&self, index: &str) -> Option<IndexVersion> {
        IndexVersion::ALL
            .into_iter()
            .find(|version| self.index_name(*version) == index)
    }

    /// Parse operator input: `v1`, `V2` or a full physical index name
    pub fn parse_version(&self, input: &str) -> SearchResult<IndexVersion> {
        let input = input.trim();
        input
            .parse::<IndexVersion>()
            .ok()
            .or_else(|| self.version_of(input))
            .ok_or_else(|| SearchError::UnknownVersion(input.to_string()))
    }

    /// Actions that leave the alias bound to `target` only.
    ///
    /// `bound` is the alias's current binding. A remove is emitted for every
    /// bound index other than the target, so a first-time bind has no remove.
    pub fn switch_actions(&self, bound: &[String], target: IndexVersion) -> Vec<AliasAction> {
        let target_name = self.index_name(target);
        let mut actions: Vec<AliasAction> = bound
            .iter()
            .filter(|index| **index != target_name)
            .map(|index| AliasAction::Remove {
                index: index.clone(),
                alias: self.alias.clone(),
            })
            .collect();

        actions.push(AliasAction::Add {
            index: target_name,
            alias: self.alias.clone(),
        });
        actions
    }
}

/// One entry of an `_aliases` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasAction {
    Add { index: String, alias: String },
    Remove { index: String, alias: String },
}
