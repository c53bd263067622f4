//! intune-backup - Intune configuration backup
//!
//! Fetches App Configuration, Compliance, Group Policy and Role definitions
//! from Microsoft Graph, resolves their references into readable names and
//! writes one file per configuration.
//!
//! Exit status is non-zero when configuration cannot be resolved or when every
//! selected module failed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use intune_backup::config::{BackupConfig, CliOverrides};
use intune_backup::graph::GraphClient;
use intune_backup::logging::init_logging;
use intune_backup::modules::select_modules;
use intune_backup::persist::{FilePersister, OutputFormat};
use intune_backup::{BackupRunner, ModuleStatus};
use intune_common::config::{default_config_path, load_toml_config, TomlConfig};

/// Command-line arguments for intune-backup
#[derive(Parser, Debug)]
#[command(name = "intune-backup")]
#[command(about = "Back up Intune configuration from Microsoft Graph")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/intune-backup/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output folder for backup files
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output file format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Graph bearer token
    #[arg(long)]
    token: Option<String>,

    /// Exclude "assignments" or a module by name (repeatable)
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Only run the named module (repeatable; default: all)
    #[arg(short, long)]
    module: Vec<String>,

    /// Log level when RUST_LOG is not set (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging comes first so config loading can report a missing file
    let log_control = init_logging(args.log_level.as_deref());

    let config_path = args.config.clone().or_else(default_config_path);
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => TomlConfig::default(),
    };
    log_control.apply_configured(&toml_config.logging.level);

    info!(
        "Starting intune-backup v{} ({} {} {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );

    let cli = CliOverrides {
        output: args.output,
        format: args.format,
        token: args.token,
        exclude: args.exclude,
    };
    let config = BackupConfig::resolve(cli, &toml_config).context("Invalid configuration")?;

    info!("Output folder: {}", config.output_folder.display());
    info!("Output format: {:?}", config.format);
    if config.options.excludes_assignments() {
        info!("Assignments excluded");
    }
    for module in config.options.skipped_modules() {
        info!("Excluded module: {}", module);
    }

    let client = GraphClient::new(
        config.graph.base_url.clone(),
        &config.token,
        config.graph.requests_per_second,
    )
    .context("Failed to create Graph client")?;
    let persister = FilePersister::new(config.output_folder.clone(), config.format);
    let runner = BackupRunner::new(Arc::new(client), Arc::new(persister), config.options.clone());

    let modules = select_modules(&args.module);
    if modules.is_empty() {
        bail!("No module matches {:?}", args.module);
    }

    let outcomes = runner.run_all(&modules).await;

    let mut attempted = 0;
    let mut failed = 0;
    let mut total = 0;
    for outcome in &outcomes {
        match &outcome.status {
            ModuleStatus::Completed(results) => {
                attempted += 1;
                total += results.config_count;
                info!(module = outcome.module, configs = results.config_count, "Module done");
            }
            ModuleStatus::Failed => {
                attempted += 1;
                failed += 1;
                warn!(module = outcome.module, "Module failed");
            }
            ModuleStatus::Skipped => {}
        }
    }

    info!(
        "Backup finished: {} configurations from {} modules ({} failed)",
        total, attempted, failed
    );

    if attempted > 0 && failed == attempted {
        error!("Every module failed");
        bail!("Backup failed for all {} modules", failed);
    }

    Ok(())
}
