//! # Intune Common Library
//!
//! Shared code for the Intune backup tooling including:
//! - Common error type
//! - TOML bootstrap configuration loading
//! - GUID helpers (sentinel detection)

pub mod config;
pub mod error;
pub mod uuid_utils;

pub use error::{Error, Result};
