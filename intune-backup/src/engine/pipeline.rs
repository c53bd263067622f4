//! Backup pipeline
//!
//! Per module:
//! 1. Primary fetch (fatal on failure)
//! 2. Module-specific enrichment stages (never fatal, degrade per record)
//! 3. Shared assignment stage when the module declares one and it is not excluded
//! 4. Persistence hand-off (fatal on failure)
//!
//! Stages inside a module run strictly one after another because each stage's
//! identifiers come from the previous stage's resolution map.

use super::assignments;
use super::resolver::BatchResolver;
use crate::config::BackupOptions;
use crate::error::{BackupError, BackupResult};
use crate::graph::GraphTransport;
use crate::persist::{AuditCompareInfo, BackupResults, PersistRequest, Persister};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, error, info};

/// One backed-up entity
pub type Record = Map<String, Value>;

/// Where a module's assignments live: `{url}/{id}{extra_url}`
#[derive(Debug, Clone, Copy)]
pub struct AssignmentSource {
    pub url: &'static str,
    pub extra_url: &'static str,
}

/// Static description of a backup module
#[derive(Debug, Clone, Copy)]
pub struct ModuleDescriptor {
    /// Module name, also used by `exclude`
    pub name: &'static str,
    /// Primary list endpoint
    pub endpoint: &'static str,
    /// Query parameters of the primary fetch
    pub params: &'static [(&'static str, &'static str)],
    /// Output sub-folder
    pub path: &'static str,
    /// Field naming each output file
    pub name_key: &'static str,
    /// Prefix of the per-record log line
    pub log_message: &'static str,
    /// Audit log query for this entity type (`componentName eq '...'`)
    pub audit_filter: &'static str,
    /// Assignment source, `None` when the module has no assignments
    pub assignments: Option<AssignmentSource>,
}

impl ModuleDescriptor {
    /// Audit correlation for every module: records are matched by resource id
    pub fn audit_compare_info(&self) -> AuditCompareInfo {
        AuditCompareInfo::resource_id()
    }
}

/// Everything an enrichment stage may use
pub struct StageContext<'a> {
    pub transport: &'a dyn GraphTransport,
    pub resolver: BatchResolver<'a>,
    pub options: &'a BackupOptions,
}

impl<'a> StageContext<'a> {
    pub fn new(transport: &'a dyn GraphTransport, options: &'a BackupOptions) -> Self {
        Self {
            transport,
            resolver: BatchResolver::new(transport),
            options,
        }
    }
}

/// Entity-specific harvesting and merge rules
#[async_trait]
pub trait BackupModule: Send + Sync {
    fn descriptor(&self) -> &'static ModuleDescriptor;

    /// Run the module's enrichment stages and merge results into `records`
    async fn enrich(&self, ctx: &StageContext<'_>, records: &mut [Record]);
}

/// Record's own `id`
pub fn record_id(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

/// Distinct ids of all records, ordered
pub fn record_ids(records: &[Record]) -> BTreeSet<String> {
    records
        .iter()
        .filter_map(record_id)
        .map(str::to_string)
        .collect()
}

/// Primary list request, unwrapped to its object records
pub async fn fetch_primary(
    transport: &dyn GraphTransport,
    descriptor: &ModuleDescriptor,
) -> BackupResult<Vec<Record>> {
    let data = transport
        .request(descriptor.endpoint, descriptor.params)
        .await
        .map_err(|source| BackupError::PrimaryFetch {
            module: descriptor.name.to_string(),
            endpoint: descriptor.endpoint.to_string(),
            source,
        })?;

    let Some(Value::Array(items)) = data.get("value") else {
        return Err(BackupError::UnexpectedResponse {
            module: descriptor.name.to_string(),
            endpoint: descriptor.endpoint.to_string(),
            detail: "missing 'value' array".to_string(),
        });
    };

    let records: Vec<Record> = items
        .iter()
        .filter_map(|item| item.as_object().cloned())
        .collect();

    debug!(module = descriptor.name, records = records.len(), "Primary fetch complete");
    Ok(records)
}

/// Full backup of one module
pub async fn backup(
    module: &dyn BackupModule,
    transport: &dyn GraphTransport,
    persister: &dyn Persister,
    options: &BackupOptions,
) -> BackupResult<BackupResults> {
    let descriptor = module.descriptor();
    let mut records = fetch_primary(transport, descriptor).await?;

    let ctx = StageContext::new(transport, options);
    if !records.is_empty() {
        module.enrich(&ctx, &mut records).await;

        if let Some(source) = descriptor.assignments {
            if options.excludes_assignments() {
                debug!(module = descriptor.name, "Assignments excluded");
            } else {
                assignments::attach_assignments(&ctx, source, &mut records).await;
            }
        }
    }

    let audit = descriptor.audit_compare_info();
    let request = PersistRequest {
        path: descriptor.path,
        name_key: descriptor.name_key,
        log_message: descriptor.log_message,
        audit: &audit,
        audit_filter: descriptor.audit_filter,
    };

    persister
        .persist(records, &request)
        .await
        .map_err(|source| BackupError::Persist {
            module: descriptor.name.to_string(),
            source,
        })
}

/// Backup one module; fatal errors are logged once and yield `None`
pub async fn run(
    module: &dyn BackupModule,
    transport: &dyn GraphTransport,
    persister: &dyn Persister,
    options: &BackupOptions,
) -> Option<BackupResults> {
    let name = module.descriptor().name;
    match backup(module, transport, persister, options).await {
        Ok(results) => {
            info!(module = name, configs = results.config_count, "Backup complete");
            Some(results)
        }
        Err(e) => {
            error!(module = name, "{}", e);
            None
        }
    }
}
