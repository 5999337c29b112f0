//! CLI command implementations

mod project;
mod resolve;

use crate::SourceArgs;
use anyhow::Result;
use devinit_config::GlobalConfig;
use devinit_core::features::{build_lookup, LookupSources, ManifestLookup, Resolver};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use project::*;
pub use resolve::*;

/// Lookup sources for this invocation: project and config dirs, then `--features-dir`
fn lookup_sources(config: &GlobalConfig, project_dir: &Path, args: &SourceArgs) -> LookupSources {
    let mut sources = LookupSources::from_config(config, Some(project_dir));
    if let Some(ref dir) = args.features_dir {
        sources.local_dirs.insert(0, dir.clone());
    }
    sources.offline = args.offline;
    sources
}

fn build_resolver(
    config: &GlobalConfig,
    lookup: Arc<dyn ManifestLookup>,
    args: &SourceArgs,
) -> Resolver {
    let resolver = Resolver::from_config(lookup, &config.resolver);
    match args.timeout {
        Some(secs) => resolver.with_timeout(Duration::from_secs(secs.max(1))),
        None => resolver,
    }
}

fn open_lookup(
    config: &GlobalConfig,
    project_dir: &Path,
    args: &SourceArgs,
) -> Result<(Arc<dyn ManifestLookup>, LookupSources)> {
    let sources = lookup_sources(config, project_dir, args);
    let lookup = build_lookup(config, &sources)?;
    Ok((lookup, sources))
}

/// Apply the configured default tag to selections that carry none.
///
/// `./name` entries from a devcontainer.json refer to project-local features
/// and are looked up by bare name.
fn qualify_selection(selection: &str, config: &GlobalConfig) -> String {
    let selection = selection.strip_prefix("./").unwrap_or(selection);
    let last = selection.rsplit('/').next().unwrap_or(selection);
    if last.contains(':') || config.defaults.tag == devinit_core::features::DEFAULT_TAG {
        selection.to_string()
    } else {
        format!("{}:{}", selection, config.defaults.tag)
    }
}

/// Token that fires on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupted, cancelling resolution");
            child.cancel();
        }
    });
    token
}

/// Whether prompts can be shown
fn is_interactive() -> bool {
    use std::io::IsTerminal;
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}
