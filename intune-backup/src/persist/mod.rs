//! Persistence collaborator
//!
//! Receives enriched records and writes one file per record. The audit compare
//! info tells downstream tooling which field correlates a file with the API's
//! audit history; its value is captured before volatile keys are stripped.

pub mod file;

pub use file::FilePersister;

use crate::engine::Record;
use crate::error::PersistError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// How persisted records are correlated with audit history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCompareInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub value_key: String,
}

impl AuditCompareInfo {
    /// `{type: "resourceId", value_key: "id"}`
    pub fn resource_id() -> Self {
        Self {
            kind: "resourceId".to_string(),
            value_key: "id".to_string(),
        }
    }
}

/// Per-module persistence request
#[derive(Debug, Clone)]
pub struct PersistRequest<'a> {
    /// Sub-folder below the output root
    pub path: &'a str,
    /// Field naming each file
    pub name_key: &'a str,
    /// Prefix of the per-record log line
    pub log_message: &'a str,
    pub audit: &'a AuditCompareInfo,
    /// Audit log query selecting this entity type's events
    pub audit_filter: &'a str,
}

/// One written file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupOutput {
    pub name: String,
    pub file: PathBuf,
    #[serde(rename = "type")]
    pub audit_type: String,
    pub audit_value: Option<String>,
}

/// Result of persisting one module
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackupResults {
    pub config_count: usize,
    pub outputs: Vec<BackupOutput>,
    /// Audit log query for the written entity type
    pub audit_filter: String,
}

/// Output file format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            other => Err(format!("Unknown output format '{}' (expected json or yaml)", other)),
        }
    }
}

/// Persistence collaborator
#[async_trait]
pub trait Persister: Send + Sync {
    /// Write every record; any failure fails the whole call
    async fn persist(
        &self,
        records: Vec<Record>,
        request: &PersistRequest<'_>,
    ) -> Result<BackupResults, PersistError>;
}
