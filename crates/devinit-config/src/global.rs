//! Global configuration for devinit
//!
//! Located at `~/.config/devinit/config.toml`

use crate::{ConfigError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the feature manifest cache directory
pub const CACHE_DIR_ENV: &str = "DEVINIT_CACHE_DIR";

/// Global devinit configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GlobalConfig {
    pub defaults: DefaultsConfig,
    pub resolver: ResolverConfig,
    pub cache: CacheConfig,
}

/// Defaults applied to short feature identifiers and new projects
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Origin used to qualify short ids such as `docker`
    pub origin: String,
    /// Tag used when a reference does not carry one
    pub tag: String,
    /// Base image written to new devcontainer.json files
    pub image: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            origin: "ghcr.io/devcontainers/features".to_string(),
            tag: "latest".to_string(),
            image: None,
        }
    }
}

/// Dependency resolver tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    /// Upper bound for a single manifest lookup, in seconds
    pub timeout_secs: u64,
    /// Maximum number of manifest lookups in flight per traversal level
    pub concurrency: usize,
    /// Directory prefixes that mark a `dependsOn` key as a local feature
    pub local_dirs: Vec<String>,
    /// Directory holding local features (`<dir>/<name>/devcontainer-feature.json`)
    pub features_dir: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            concurrency: 4,
            local_dirs: vec!["features".to_string(), ".devcontainer/features".to_string()],
            features_dir: None,
        }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Manifest cache settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Explicit cache directory (falls back to the platform cache dir)
    pub dir: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load global configuration from the default path
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load global configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;

        tracing::debug!(
            "Loaded config from {:?}: origin={}, timeout={}s",
            path,
            config.defaults.origin,
            config.resolver.timeout_secs
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.defaults.origin.trim().is_empty() {
            return Err(ConfigError::Invalid("defaults.origin must not be empty".into()));
        }
        if self.defaults.tag.trim().is_empty() {
            return Err(ConfigError::Invalid("defaults.tag must not be empty".into()));
        }
        if self.resolver.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "resolver.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.resolver.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "resolver.concurrency must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "devinit").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Resolve the manifest cache directory.
    ///
    /// Precedence: `DEVINIT_CACHE_DIR`, then `[cache] dir`, then the platform cache dir.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            if !dir.is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }
        if let Some(ref dir) = self.cache.dir {
            return Ok(dir.clone());
        }
        let dirs = ProjectDirs::from("", "", "devinit").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.cache_dir().join("features"))
    }
}
