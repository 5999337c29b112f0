//! Devcontainer features: references, manifests, lookup, and dependency resolution
//!
//! Features are self-contained install units described by a
//! `devcontainer-feature.json` manifest. A feature may declare `dependsOn`
//! other features; this module computes which features a project needs in
//! total and which of those the user did not pick directly.

pub mod lookup;
pub mod manifest;
pub mod oci;
pub mod reference;
pub mod resolve;

pub use lookup::{DirectoryLookup, InMemoryLookup, LayeredLookup, LookupError, ManifestLookup};
pub use manifest::{FeatureManifest, FeatureOption, MANIFEST_FILE};
pub use oci::OciLookup;
pub use reference::{normalize_dependency_key, FeatureReference, ReferenceError, DEFAULT_TAG};
pub use resolve::{
    parse_selections, ResolutionResult, ResolutionWarning, Resolver, UnavailableReason,
};

use crate::{CoreError, Result};
use devinit_config::GlobalConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where manifests may come from for one run
#[derive(Debug, Clone, Default)]
pub struct LookupSources {
    /// Local feature directories, consulted first in order
    pub local_dirs: Vec<PathBuf>,
    /// Skip the registry entirely
    pub offline: bool,
}

impl LookupSources {
    /// Local directories from the config plus the project's `.devcontainer/features`
    pub fn from_config(config: &GlobalConfig, project_dir: Option<&Path>) -> Self {
        let mut local_dirs = Vec::new();
        if let Some(dir) = project_dir {
            let project_features = dir.join(".devcontainer/features");
            if project_features.is_dir() {
                local_dirs.push(project_features);
            }
        }
        if let Some(ref dir) = config.resolver.features_dir {
            local_dirs.push(dir.clone());
        }
        Self {
            local_dirs,
            offline: false,
        }
    }
}

/// Build the lookup chain: local directories first, then the OCI registry.
///
/// With the registry in the chain, local directories only answer for
/// `[defaults] origin`; every other origin goes to its registry. Offline,
/// they answer for any origin.
pub fn build_lookup(
    config: &GlobalConfig,
    sources: &LookupSources,
) -> Result<Arc<dyn ManifestLookup>> {
    let mut layered = LayeredLookup::new();
    for dir in &sources.local_dirs {
        tracing::debug!("Using local features from {}", dir.display());
        let local = DirectoryLookup::new(dir);
        let local = if sources.offline {
            local
        } else {
            local.for_origin(config.defaults.origin.as_str())
        };
        layered = layered.push(Arc::new(local));
    }

    if !sources.offline {
        let cache_dir = config.cache_dir()?;
        tracing::debug!("Caching feature manifests in {}", cache_dir.display());
        layered = layered.push(Arc::new(OciLookup::new(cache_dir)));
    }

    if layered.is_empty() {
        return Err(CoreError::InvalidInput(
            "no manifest source: offline mode needs at least one local features directory"
                .to_string(),
        ));
    }

    Ok(Arc::new(layered))
}

/// Fetch a single manifest, for display
pub async fn show_manifest(
    lookup: &dyn ManifestLookup,
    reference: &FeatureReference,
) -> Result<FeatureManifest> {
    lookup
        .lookup(reference)
        .await
        .map_err(|e| CoreError::ManifestUnavailable {
            reference: reference.to_string(),
            reason: e.to_string(),
        })
}
