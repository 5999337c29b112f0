//! Core logic for devinit
//!
//! This crate provides:
//! - Feature reference parsing and `dependsOn` key normalization
//! - Manifest lookup from memory, local directories, and OCI registries
//! - Dependency resolution with explicit/implicit classification

mod error;
pub mod features;

pub use error::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
