//! Configuration parsing for devinit
//!
//! This crate handles:
//! - Global configuration (`~/.config/devinit/config.toml`)
//! - Reading and writing `.devcontainer/devcontainer.json`

mod devcontainer;
mod error;
mod global;

pub use devcontainer::*;
pub use error::*;
pub use global::*;
