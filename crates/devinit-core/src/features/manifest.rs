//! devcontainer-feature.json model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File name of a feature's manifest inside its directory or tarball
pub const MANIFEST_FILE: &str = "devcontainer-feature.json";

/// Metadata declared by one feature.
///
/// Only `dependsOn` keys matter for resolution; the rest is carried so
/// callers can render descriptions and options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureManifest {
    pub id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub documentation_url: Option<String>,
    /// Option definitions keyed by option name
    #[serde(default)]
    pub options: BTreeMap<String, FeatureOption>,
    /// Hard dependencies: reference key → options for that dependency
    #[serde(default)]
    pub depends_on: BTreeMap<String, serde_json::Value>,
    /// Soft ordering hints; not followed during resolution
    #[serde(default, alias = "installAfter")]
    pub installs_after: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A single option definition
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct FeatureOption {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub default: Option<serde_json::Value>,
    pub description: Option<String>,
    pub proposals: Vec<serde_json::Value>,
    #[serde(rename = "enum")]
    pub allowed: Vec<serde_json::Value>,
}

impl FeatureManifest {
    /// Manifest with just an id, mostly useful for tests and fixtures
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: None,
            name: None,
            description: None,
            documentation_url: None,
            options: BTreeMap::new(),
            depends_on: BTreeMap::new(),
            installs_after: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Add a `dependsOn` entry with empty options
    pub fn depends_on(mut self, key: impl Into<String>) -> Self {
        self.depends_on
            .insert(key.into(), serde_json::Value::Object(Default::default()));
        self
    }

    /// Parse manifest JSON (comments allowed)
    pub fn parse(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(&devinit_config::strip_json_comments(content))
    }

    /// `dependsOn` keys that are not disabled with `false`, in key order
    pub fn dependency_keys(&self) -> impl Iterator<Item = &str> {
        self.depends_on
            .iter()
            .filter(|(_, value)| !matches!(value, serde_json::Value::Bool(false)))
            .map(|(key, _)| key.as_str())
    }

    /// Human-readable title: `name`, falling back to `id`
    pub fn title(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}
