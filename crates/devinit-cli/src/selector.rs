//! Interactive feature picker for `devinit init`

use anyhow::{bail, Result};
use devinit_core::features::DirectoryLookup;
use dialoguer::{theme::ColorfulTheme, Input, MultiSelect};
use std::path::PathBuf;

/// Let the user pick features from the local feature directories, plus any
/// extra references typed in by hand.
///
/// Returns selections as typed; qualification happens in the caller.
pub fn select_features(local_dirs: &[PathBuf]) -> Result<Vec<String>> {
    let available = available_features(local_dirs);
    let mut selected = Vec::new();

    if available.is_empty() {
        eprintln!("No local features found.");
    } else {
        let picks = MultiSelect::with_theme(&ColorfulTheme::default())
            .with_prompt("Features to install (space to toggle, enter to confirm)")
            .items(&available)
            .interact()?;
        selected.extend(picks.into_iter().map(|i| available[i].clone()));
    }

    let extra: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Other features (space separated, e.g. ghcr.io/devcontainers/features/node)")
        .allow_empty(true)
        .interact_text()?;
    selected.extend(extra.split_whitespace().map(str::to_string));

    if selected.is_empty() {
        bail!("No features selected");
    }
    Ok(selected)
}

/// Feature names across all directories, first directory wins on duplicates
fn available_features(local_dirs: &[PathBuf]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for dir in local_dirs {
        for name in DirectoryLookup::new(dir).available() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}
