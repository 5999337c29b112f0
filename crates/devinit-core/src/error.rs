//! Error types for devinit-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] devinit_config::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Manifest for {reference} unavailable: {reason}")]
    ManifestUnavailable { reference: String, reason: String },

    #[error("Resolution cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, CoreError>;
