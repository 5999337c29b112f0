//! Manifest lookup capability and its local implementations
//!
//! The resolver only ever asks one question: "what does this feature
//! declare?". Where the answer comes from (memory, a directory of local
//! features, a registry) is up to the [`ManifestLookup`] it is given.

use super::manifest::{FeatureManifest, MANIFEST_FILE};
use super::reference::FeatureReference;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("manifest not found")]
    NotFound,

    #[error("{0}")]
    Failed(String),
}

/// Fetch a feature's manifest by reference
#[async_trait]
pub trait ManifestLookup: Send + Sync {
    async fn lookup(&self, reference: &FeatureReference) -> Result<FeatureManifest, LookupError>;
}

#[async_trait]
impl<T: ManifestLookup + ?Sized> ManifestLookup for Arc<T> {
    async fn lookup(&self, reference: &FeatureReference) -> Result<FeatureManifest, LookupError> {
        (**self).lookup(reference).await
    }
}

/// Manifests held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryLookup {
    manifests: HashMap<FeatureReference, FeatureManifest>,
}

impl InMemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

impl FromIterator<(FeatureReference, FeatureManifest)> for InMemoryLookup {
    fn from_iter<I: IntoIterator<Item = (FeatureReference, FeatureManifest)>>(iter: I) -> Self {
        Self {
            manifests: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ManifestLookup for InMemoryLookup {
    async fn lookup(&self, reference: &FeatureReference) -> Result<FeatureManifest, LookupError> {
        self.manifests
            .get(reference)
            .cloned()
            .ok_or(LookupError::NotFound)
    }
}

/// Local features laid out as `<root>/<name>/devcontainer-feature.json`.
///
/// Tags are ignored: a local directory holds one version of each feature.
/// When `origin` is set, references from any other origin are `NotFound`.
#[derive(Debug, Clone)]
pub struct DirectoryLookup {
    root: PathBuf,
    origin: Option<String>,
}

impl DirectoryLookup {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            origin: None,
        }
    }

    /// Only answer for references under `origin`
    pub fn for_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    fn manifest_path(&self, name: &str) -> PathBuf {
        self.root.join(name).join(MANIFEST_FILE)
    }

    /// Names of the features present under the root, sorted
    pub fn available(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().join(MANIFEST_FILE).is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ManifestLookup for DirectoryLookup {
    async fn lookup(&self, reference: &FeatureReference) -> Result<FeatureManifest, LookupError> {
        if let Some(ref origin) = self.origin {
            if origin != reference.origin() {
                return Err(LookupError::NotFound);
            }
        }

        let path = self.manifest_path(reference.name());
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LookupError::NotFound)
            }
            Err(e) => {
                return Err(LookupError::Failed(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::debug!("Read manifest for {} from {}", reference, path.display());
        FeatureManifest::parse(&content)
            .map_err(|e| LookupError::Failed(format!("invalid {}: {}", path.display(), e)))
    }
}

/// Try several lookups in order; the first hit wins.
///
/// `NotFound` falls through to the next layer. If no layer has the
/// manifest, the last real failure is reported, otherwise `NotFound`.
#[derive(Clone, Default)]
pub struct LayeredLookup {
    layers: Vec<Arc<dyn ManifestLookup>>,
}

impl LayeredLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, layer: Arc<dyn ManifestLookup>) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[async_trait]
impl ManifestLookup for LayeredLookup {
    async fn lookup(&self, reference: &FeatureReference) -> Result<FeatureManifest, LookupError> {
        let mut failure = None;
        for layer in &self.layers {
            match layer.lookup(reference).await {
                Ok(manifest) => return Ok(manifest),
                Err(LookupError::NotFound) => continue,
                Err(e) => {
                    tracing::debug!("Lookup layer failed for {}: {}", reference, e);
                    failure = Some(e);
                }
            }
        }
        Err(failure.unwrap_or(LookupError::NotFound))
    }
}
