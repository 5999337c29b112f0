//! Feature resolution commands: resolve, show

use super::{build_resolver, cancel_on_ctrl_c, open_lookup, qualify_selection};
use crate::SourceArgs;
use anyhow::{bail, Context, Result};
use devinit_config::{DevContainerConfig, GlobalConfig};
use devinit_core::features::{show_manifest, FeatureReference, ResolutionResult};
use std::path::PathBuf;

/// Resolve features and print the full set
pub async fn resolve(
    config: &GlobalConfig,
    features: Vec<String>,
    from: Option<PathBuf>,
    json: bool,
    sources: &SourceArgs,
) -> Result<()> {
    let project_dir = match from {
        Some(ref dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    let mut selections: Vec<String> = features
        .iter()
        .map(|f| qualify_selection(f, config))
        .collect();
    if let Some(ref dir) = from {
        let (devcontainer, path) = DevContainerConfig::load_from_dir(dir)?;
        tracing::debug!("Reading features from {}", path.display());
        selections.extend(
            devcontainer
                .enabled_features()
                .map(|f| qualify_selection(f, config)),
        );
    }
    if selections.is_empty() {
        bail!("No features given. Name some features or use --from <DIR>.");
    }

    let (lookup, _) = open_lookup(config, &project_dir, sources)?;
    let resolver = build_resolver(config, lookup, sources);

    let cancel = cancel_on_ctrl_c();
    let result = resolver
        .resolve_strs_with_cancel(&selections, &config.defaults.origin, &cancel)
        .await?;

    if json {
        println!("{}", render_json(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

/// Show one feature's manifest
pub async fn show(config: &GlobalConfig, feature: &str, sources: &SourceArgs) -> Result<()> {
    let project_dir = std::env::current_dir()?;
    let reference = FeatureReference::parse_with_default_origin(
        &qualify_selection(feature, config),
        &config.defaults.origin,
    )
    .with_context(|| format!("invalid feature '{}'", feature))?;

    let (lookup, _) = open_lookup(config, &project_dir, sources)?;
    let manifest = show_manifest(lookup.as_ref(), &reference).await?;

    println!("{} ({})", manifest.title(), reference);
    if let Some(ref version) = manifest.version {
        println!("Version:     {}", version);
    }
    if let Some(ref description) = manifest.description {
        println!("Description: {}", description);
    }
    if let Some(ref url) = manifest.documentation_url {
        println!("Docs:        {}", url);
    }

    if !manifest.options.is_empty() {
        println!("\nOptions:");
        for (name, option) in &manifest.options {
            let default = option
                .default
                .as_ref()
                .map(|v| format!(" (default: {})", v))
                .unwrap_or_default();
            let kind = option.kind.as_deref().unwrap_or("any");
            println!("  {:<20} {}{}", name, kind, default);
            if let Some(ref description) = option.description {
                println!("  {:<20} {}", "", description);
            }
        }
    }

    let deps: Vec<&str> = manifest.dependency_keys().collect();
    if !deps.is_empty() {
        println!("\nDepends on:");
        for dep in deps {
            println!("  - {}", dep);
        }
    }
    if !manifest.installs_after.is_empty() {
        println!("\nInstalls after:");
        for dep in &manifest.installs_after {
            println!("  - {}", dep);
        }
    }

    Ok(())
}

pub(super) fn print_result(result: &ResolutionResult) {
    if result.all.is_empty() {
        println!("No features resolved.");
    } else {
        println!(
            "Resolved {} feature(s), {} implicit:",
            result.all.len(),
            result.implicit.len()
        );
        for reference in &result.all {
            if result.is_implicit(reference) {
                println!("  {} (implicit)", reference);
            } else {
                println!("  {}", reference);
            }
        }
    }

    if !result.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &result.warnings {
            println!("  - {}", warning);
        }
    }

    let conflicts = result.tag_conflicts();
    if !conflicts.is_empty() {
        println!("\nRequested with more than one tag:");
        for (feature, tags) in conflicts {
            println!("  - {} ({})", feature, tags.join(", "));
        }
    }
}

fn render_json(result: &ResolutionResult) -> Result<String> {
    let value = serde_json::json!({
        "all": result.all,
        "implicit": result.implicit,
        "warnings": result.warning_messages(),
        "tagConflicts": result.tag_conflicts(),
    });
    Ok(serde_json::to_string_pretty(&value)?)
}
