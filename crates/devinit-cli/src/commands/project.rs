//! Project commands: init, config

use super::resolve::print_result;
use super::{build_resolver, cancel_on_ctrl_c, is_interactive, open_lookup, qualify_selection};
use crate::{selector, SourceArgs};
use anyhow::{bail, Context, Result};
use devinit_config::{DevContainerConfig, FeatureConfig, GlobalConfig, DEVCONTAINER_JSON};
use devinit_core::features::ResolutionResult;
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::path::{Path, PathBuf};

/// Options for `devinit init`
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub dir: PathBuf,
    pub image: Option<String>,
    pub name: Option<String>,
    pub force: bool,
    pub yes: bool,
}

/// Write `.devcontainer/devcontainer.json` with the resolved feature set
pub async fn init(
    config: &GlobalConfig,
    features: Vec<String>,
    options: InitOptions,
    sources: &SourceArgs,
) -> Result<()> {
    let target = options.dir.join(DEVCONTAINER_JSON);
    if target.exists() && !options.force {
        let overwrite = is_interactive()
            && Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(format!("{} already exists. Overwrite?", target.display()))
                .default(false)
                .interact()?;
        if !overwrite {
            bail!(
                "{} already exists. Use --force to overwrite it.",
                target.display()
            );
        }
    }

    let image = match options.image.clone().or_else(|| config.defaults.image.clone()) {
        Some(image) => image,
        None => bail!("No base image given. Pass --image or set defaults.image in the config."),
    };

    let (lookup, lookup_sources) = open_lookup(config, &options.dir, sources)?;

    let features = if features.is_empty() && is_interactive() {
        selector::select_features(&lookup_sources.local_dirs)?
    } else {
        features
    };
    if features.is_empty() {
        bail!("No features given. Name the features to install.");
    }

    let selections: Vec<String> = features
        .iter()
        .map(|f| qualify_selection(f, config))
        .collect();

    let resolver = build_resolver(config, lookup, sources);
    let cancel = cancel_on_ctrl_c();
    let result = resolver
        .resolve_strs_with_cancel(&selections, &config.defaults.origin, &cancel)
        .await?;
    print_result(&result);

    if !options.yes && is_interactive() {
        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Write {}?", target.display()))
            .default(true)
            .interact()?;
        if !proceed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let devcontainer = devcontainer_for(&options.dir, options.name.clone(), image, &result);
    devcontainer
        .save_to(&target)
        .with_context(|| format!("failed to write {}", target.display()))?;

    println!("\nWrote {}", target.display());
    println!("\nNext steps:");
    println!("  devcontainer up --workspace-folder {}", options.dir.display());
    Ok(())
}

/// devcontainer.json content for a resolved feature set
fn devcontainer_for(
    dir: &Path,
    name: Option<String>,
    image: String,
    result: &ResolutionResult,
) -> DevContainerConfig {
    let name = name.or_else(|| project_name(dir));
    let features = result
        .all
        .iter()
        .map(|reference| (reference.to_string(), FeatureConfig::empty()))
        .collect();

    DevContainerConfig {
        name,
        image: Some(image),
        features,
        ..Default::default()
    }
}

fn project_name(dir: &Path) -> Option<String> {
    let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    dir.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Show the config file path or the effective configuration
pub fn config(config: &GlobalConfig, config_path: &Path, path_only: bool) -> Result<()> {
    if path_only {
        println!("{}", config_path.display());
        return Ok(());
    }

    if config_path.exists() {
        println!("# Config file: {:?}\n", config_path);
    } else {
        println!("# Config file: {:?} (not created yet)\n", config_path);
        println!("# Default configuration:");
    }
    println!("{}", toml::to_string_pretty(config)?);
    match config.cache_dir() {
        Ok(dir) => println!("# Manifest cache: {:?}", dir),
        Err(e) => tracing::debug!("No cache directory: {}", e),
    }
    Ok(())
}
