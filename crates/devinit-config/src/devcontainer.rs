//! devcontainer.json reading and writing
//!
//! Only the keys devinit produces or consumes are modelled; everything else
//! round-trips through `extra` untouched.

use crate::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Relative location of the generated config inside a project
pub const DEVCONTAINER_JSON: &str = ".devcontainer/devcontainer.json";

/// devcontainer.json as far as project scaffolding is concerned
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DevContainerConfig {
    /// Name of the dev container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Base image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Features to install, keyed by reference
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, FeatureConfig>,

    /// Keys we don't explicitly handle
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Feature configuration - can be boolean, string, or object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FeatureConfig {
    /// Enable/disable feature
    Bool(bool),
    /// Feature version
    Version(String),
    /// Full feature options
    Options(BTreeMap<String, serde_json::Value>),
}

impl FeatureConfig {
    /// Empty options object, the form written for resolved features
    pub fn empty() -> Self {
        FeatureConfig::Options(BTreeMap::new())
    }

    /// `false` disables a feature; every other form enables it
    pub fn is_enabled(&self) -> bool {
        !matches!(self, FeatureConfig::Bool(false))
    }
}

impl DevContainerConfig {
    /// Find and load devcontainer.json from a project directory.
    ///
    /// Looks at `.devcontainer/devcontainer.json`, then `.devcontainer.json`.
    pub fn load_from_dir(dir: &Path) -> Result<(Self, PathBuf)> {
        let candidates = [dir.join(DEVCONTAINER_JSON), dir.join(".devcontainer.json")];

        for path in &candidates {
            if path.exists() {
                let config = Self::load_from(path)?;
                return Ok((config, path.clone()));
            }
        }

        Err(ConfigError::NotFound(dir.to_path_buf()))
    }

    /// Load devcontainer.json from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse devcontainer.json content
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        // devcontainer.json is JSONC
        let content = strip_json_comments(content);

        serde_json::from_str(&content).map_err(|e| ConfigError::JsonParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write pretty-printed JSON, creating parent directories as needed
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let mut content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        content.push('\n');

        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Feature keys that are not disabled with `false`
    pub fn enabled_features(&self) -> impl Iterator<Item = &str> {
        self.features
            .iter()
            .filter(|(_, config)| config.is_enabled())
            .map(|(id, _)| id.as_str())
    }
}

/// Strip JSON comments (// and /* */) for JSONC support
pub fn strip_json_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }

        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            result.push(c);
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                result.push(c);
            }
            ('/', Some('/')) => {
                // Line comment: keep the newline so line numbers in errors stay right
                while let Some(&nc) = chars.peek() {
                    if nc == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for nc in chars.by_ref() {
                    if prev == '*' && nc == '/' {
                        break;
                    }
                    if nc == '\n' {
                        result.push('\n');
                    }
                    prev = nc;
                }
            }
            _ => result.push(c),
        }
    }

    result
}
