//! Tracing setup
//!
//! The subscriber is installed before the TOML file is read so that config
//! loading can log. Its filter sits behind a reload handle: once the TOML
//! `logging.level` is known it replaces the bootstrap level, unless RUST_LOG
//! or `--log-level` already chose one.

use tracing::{debug, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

/// Level used until the TOML config has been read
pub const BOOTSTRAP_LEVEL: &str = "info";

/// Initial filter, and whether it was chosen explicitly
///
/// RUST_LOG wins over `cli_level`, which wins over [`BOOTSTRAP_LEVEL`].
/// Only the last one may later be replaced by the configured level.
pub fn bootstrap_filter(cli_level: Option<&str>) -> (EnvFilter, bool) {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return (filter, true);
    }
    match cli_level {
        Some(level) => (EnvFilter::new(level), true),
        None => (EnvFilter::new(BOOTSTRAP_LEVEL), false),
    }
}

/// Handle for swapping in the configured level after startup
pub struct LogLevelControl {
    handle: reload::Handle<EnvFilter, Registry>,
    pinned: bool,
}

impl LogLevelControl {
    pub fn new(handle: reload::Handle<EnvFilter, Registry>, pinned: bool) -> Self {
        Self { handle, pinned }
    }

    /// Apply `logging.level` from the TOML config
    pub fn apply_configured(&self, level: &str) {
        if self.pinned {
            debug!("Ignoring configured log level '{}' (set by RUST_LOG or --log-level)", level);
            return;
        }
        let filter = match EnvFilter::try_new(level) {
            Ok(filter) => filter,
            Err(e) => {
                warn!("Invalid logging.level '{}': {}", level, e);
                return;
            }
        };
        if let Err(e) = self.handle.reload(filter) {
            warn!("Could not apply logging.level '{}': {}", level, e);
        }
    }
}

/// Install the global subscriber with the bootstrap filter
pub fn init_logging(cli_level: Option<&str>) -> LogLevelControl {
    let (filter, pinned) = bootstrap_filter(cli_level);
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
    LogLevelControl::new(handle, pinned)
}
