use super::index_spec::{has_json1, validate_soup_name, IndexSpec};
use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Store document bodies as files instead of in the row
pub const FEATURE_EXTERNAL_STORAGE: &str = "externalStorage";

/// Soup name plus its storage features
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SoupSpec {
    pub name: String,
    #[serde(default)]
    pub features: BTreeSet<String>,
}

impl SoupSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: BTreeSet::new(),
        }
    }

    pub fn with_features<I, S>(name: impl Into<String>, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            features: features.into_iter().map(Into::into).collect(),
        }
    }

    /// Shorthand for a soup with externally stored bodies
    pub fn external_storage(name: impl Into<String>) -> Self {
        Self::with_features(name, [FEATURE_EXTERNAL_STORAGE])
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    pub fn uses_external_storage(&self) -> bool {
        self.has_feature(FEATURE_EXTERNAL_STORAGE)
    }

    /// Check the name and the feature/index combination.
    ///
    /// External bodies leave no body column for `json_extract` to read, so
    /// they cannot be combined with `Json1` indexes.
    pub fn validate_with(&self, index_specs: &[IndexSpec]) -> DbResult<()> {
        validate_soup_name(&self.name)?;
        if self.uses_external_storage() && has_json1(index_specs) {
            return Err(DbError::InvalidSoupSpec(format!(
                "soup '{}': external storage cannot be combined with json1 indexes",
                self.name
            )));
        }
        Ok(())
    }
}
