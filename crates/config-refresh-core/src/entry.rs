//! Configuration entry model shared by the snapshot store and remote sources.
//!
//! Entries are partitioned by label (namespace/environment tag). Feature flags
//! are ordinary entries living under a reserved key prefix with a JSON value,
//! so no separate type hierarchy is needed to carry them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Key prefix reserved for feature-flag entries.
pub const FEATURE_FLAG_PREFIX: &str = ".appconfig.featureflag/";
/// Content type advertised by feature-flag entries.
pub const FEATURE_FLAG_CONTENT_TYPE: &str = "application/vnd.microsoft.appconfig.ff+json";
/// Wire spelling of the "no label" scope.
const NULL_LABEL: &str = "\0";

/// A single key/value record scoped by a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    /// Namespace tag; the empty string is the "no label" scope.
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ConfigEntry {
    /// Builds an entry without a content type.
    pub fn new(key: impl Into<String>, value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            label: label.into(),
            content_type: None,
        }
    }

    /// Builds a feature-flag entry for `name` with the given enablement.
    pub fn feature_flag_entry(name: &str, enabled: bool, label: impl Into<String>) -> Self {
        let value = serde_json::json!({ "id": name, "enabled": enabled }).to_string();
        Self {
            key: format!("{FEATURE_FLAG_PREFIX}{name}"),
            value,
            label: label.into(),
            content_type: Some(FEATURE_FLAG_CONTENT_TYPE.to_string()),
        }
    }

    /// Returns `true` when the key lives under the feature-flag prefix.
    pub fn is_feature_flag(&self) -> bool {
        self.key.starts_with(FEATURE_FLAG_PREFIX)
    }

    /// Parses the entry as a feature flag.
    ///
    /// Returns `None` for regular entries and for flags whose value is not
    /// valid flag JSON.
    pub fn feature_flag(&self) -> Option<FeatureFlag> {
        if !self.is_feature_flag() {
            return None;
        }
        serde_json::from_str(&self.value).ok()
    }
}

/// Parsed representation of a feature-flag entry value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeatureFlag {
    pub id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Label selector applied when fetching the full entry set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LabelFilter {
    /// Every label, written `*`.
    #[default]
    Any,
    /// Only entries without a label.
    Null,
    /// Only entries carrying exactly this label.
    Exact(String),
}

impl LabelFilter {
    /// Parses the textual filter form used in configuration.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "*" => Self::Any,
            "" | NULL_LABEL => Self::Null,
            label => Self::Exact(label.to_string()),
        }
    }

    /// Returns `true` when an entry with `label` is selected by the filter.
    pub fn matches(&self, label: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Null => label.is_empty(),
            Self::Exact(expected) => expected == label,
        }
    }

    /// Returns the single label selected by the filter, if it selects exactly one.
    pub fn single_label(&self) -> Option<&str> {
        match self {
            Self::Any => None,
            Self::Null => Some(""),
            Self::Exact(label) => Some(label.as_str()),
        }
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Null => f.write_str("\\0"),
            Self::Exact(label) => f.write_str(label),
        }
    }
}

/// Identifies a sentinel entry watched for changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SentinelKey {
    pub key: String,
    pub label: String,
}

impl SentinelKey {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

impl fmt::Display for SentinelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.label.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}@{}", self.key, self.label)
        }
    }
}
