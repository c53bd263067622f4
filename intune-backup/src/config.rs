//! Configuration resolution for intune-backup
//!
//! **Priority:** CLI → ENV → TOML → built-in default
//!
//! Resolved once at startup into a [`BackupConfig`]; the pipeline only ever sees
//! the [`BackupOptions`] part of it.

use crate::persist::OutputFormat;
use intune_common::config::{
    is_valid_key, resolve_output_folder, GraphConfig, TomlConfig, OUTPUT_ENV_VAR,
};
use intune_common::{Error, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{info, warn};

/// Bearer token
pub const TOKEN_ENV_VAR: &str = "INTUNE_BACKUP_TOKEN";

/// Output format ("json" / "yaml")
pub const FORMAT_ENV_VAR: &str = "INTUNE_BACKUP_FORMAT";

/// Comma-separated exclusions
pub const EXCLUDE_ENV_VAR: &str = "INTUNE_BACKUP_EXCLUDE";

/// Exclusion value that disables every assignment stage
pub const EXCLUDE_ASSIGNMENTS: &str = "assignments";

/// Options passed into the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupOptions {
    exclude_assignments: bool,
    /// Lower-cased module names
    skip_modules: BTreeSet<String>,
}

impl BackupOptions {
    /// Build from raw `exclude` values
    ///
    /// `assignments` disables assignment stages; anything else names a module
    /// to skip (case-insensitive).
    pub fn from_exclude<I, S>(exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::default();
        for raw in exclude {
            let value = raw.as_ref().trim().to_ascii_lowercase();
            if value.is_empty() {
                continue;
            }
            if value == EXCLUDE_ASSIGNMENTS {
                options.exclude_assignments = true;
            } else {
                options.skip_modules.insert(value);
            }
        }
        options
    }

    pub fn excludes_assignments(&self) -> bool {
        self.exclude_assignments
    }

    pub fn skips_module(&self, name: &str) -> bool {
        self.skip_modules.contains(&name.to_ascii_lowercase())
    }

    pub fn skipped_modules(&self) -> impl Iterator<Item = &str> {
        self.skip_modules.iter().map(String::as_str)
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub output: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub token: Option<String>,
    pub exclude: Vec<String>,
}

/// Fully resolved run configuration
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub output_folder: PathBuf,
    pub format: OutputFormat,
    pub token: String,
    pub options: BackupOptions,
    pub graph: GraphConfig,
}

impl BackupConfig {
    pub fn resolve(cli: CliOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let output_folder = resolve_output_folder(cli.output.as_deref(), OUTPUT_ENV_VAR, toml_config);
        let format = resolve_format(cli.format, toml_config)?;
        let token = resolve_token(cli.token, toml_config)?;
        let options = BackupOptions::from_exclude(resolve_exclude(cli.exclude, toml_config));

        Ok(Self {
            output_folder,
            format,
            token,
            options,
            graph: toml_config.graph.clone(),
        })
    }
}

fn resolve_format(cli: Option<OutputFormat>, toml_config: &TomlConfig) -> Result<OutputFormat> {
    if let Some(format) = cli {
        return Ok(format);
    }

    let configured = std::env::var(FORMAT_ENV_VAR)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| toml_config.format.clone());

    match configured {
        Some(raw) => raw.parse::<OutputFormat>().map_err(Error::Config),
        None => Ok(OutputFormat::default()),
    }
}

/// Resolve the bearer token from 3-tier configuration
fn resolve_token(cli: Option<String>, toml_config: &TomlConfig) -> Result<String> {
    let env_token = std::env::var(TOKEN_ENV_VAR).ok();

    let candidates = [
        ("command line", cli.as_ref()),
        ("environment", env_token.as_ref()),
        ("TOML", toml_config.token.as_ref()),
    ];
    let valid: Vec<(&str, &String)> = candidates
        .into_iter()
        .filter_map(|(source, key)| key.filter(|k| is_valid_key(k)).map(|k| (source, k)))
        .collect();

    if valid.len() > 1 {
        warn!(
            "Token found in multiple sources: {}. Using {} (highest priority).",
            valid.iter().map(|(s, _)| *s).collect::<Vec<_>>().join(", "),
            valid[0].0
        );
    }

    match valid.first() {
        Some((source, key)) => {
            info!("Graph token loaded from {}", source);
            Ok(key.trim().to_string())
        }
        None => Err(Error::Config(format!(
            "Graph token not configured. Please configure using one of:\n\
             1. Command line: --token <token>\n\
             2. Environment: {}=<token>\n\
             3. TOML config: token = \"<token>\"",
            TOKEN_ENV_VAR
        ))),
    }
}

fn resolve_exclude(cli: Vec<String>, toml_config: &TomlConfig) -> Vec<String> {
    if !cli.is_empty() {
        return cli;
    }

    if let Ok(raw) = std::env::var(EXCLUDE_ENV_VAR) {
        let values: Vec<String> = raw
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if !values.is_empty() {
            return values;
        }
    }

    toml_config.exclude.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclude_parsing() {
        let options = BackupOptions::from_exclude(["Assignments", " Roles ", "", "groupPolicyConfigurations"]);

        assert!(options.excludes_assignments());
        assert!(options.skips_module("roles"));
        assert!(options.skips_module("GroupPolicyConfigurations"));
        assert!(!options.skips_module("AppConfiguration"));
        assert_eq!(options.skipped_modules().count(), 2);
    }

    #[test]
    fn test_default_excludes_nothing() {
        let options = BackupOptions::default();
        assert!(!options.excludes_assignments());
        assert!(!options.skips_module("Roles"));
    }
}
