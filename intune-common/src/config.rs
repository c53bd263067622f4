//! Bootstrap configuration loading and output folder resolution
//!
//! Settings sources priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! A missing TOML file is not an error: a warning is logged and defaults are
//! used. A TOML file that exists but cannot be parsed is a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory name used below the platform config and data directories
pub const APP_DIR_NAME: &str = "intune-backup";

/// Environment variable overriding the output folder
pub const OUTPUT_ENV_VAR: &str = "INTUNE_BACKUP_OUTPUT";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TomlConfig {
    /// Folder that receives one sub-folder per backed-up entity type
    #[serde(default)]
    pub output_folder: Option<PathBuf>,

    /// Output file format ("json" or "yaml")
    #[serde(default)]
    pub format: Option<String>,

    /// Bearer token for the Graph API
    #[serde(default)]
    pub token: Option<String>,

    /// Exclusions: "assignments" and/or module names to skip
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Graph endpoint settings
    #[serde(default)]
    pub graph: GraphConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Graph endpoint settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GraphConfig {
    /// Base URL relative endpoints are resolved against
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Client-side request budget
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_base_url() -> String {
    "https://graph.microsoft.com".to_string()
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default configuration file path for the platform
///
/// `<config_dir>/intune-backup/config.toml` (e.g. `~/.config/intune-backup/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"))
}

/// Load TOML configuration from `path`
///
/// Missing file → warning + defaults. Unreadable or malformed file → error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {}, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Output folder resolution
///
/// CLI argument → environment variable → TOML value → OS default.
pub fn resolve_output_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.output_folder {
        return path.clone();
    }

    default_output_folder()
}

/// OS-dependent default output folder
fn default_output_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME).join("backup"))
        .unwrap_or_else(|| PathBuf::from("./intune_backup"))
}

/// Validate a secret (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Standard User-Agent for outbound HTTP clients
pub fn get_user_agent() -> String {
    format!("{}/{}", APP_DIR_NAME, env!("CARGO_PKG_VERSION"))
}
