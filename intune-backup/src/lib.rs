//! intune-backup library interface
//!
//! Exposes the backup pipeline for the binary and for integration testing.

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod logging;
pub mod modules;
pub mod persist;

pub use crate::engine::{BackupRunner, ModuleOutcome, ModuleStatus};
pub use crate::error::{BackupError, BackupResult, GraphError, PersistError};
