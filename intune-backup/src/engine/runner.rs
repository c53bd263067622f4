//! Backup runner
//!
//! Modules share nothing but the transport and the persister, so they run
//! side by side on the current task. A failing module never stops the others.

use super::pipeline::{self, BackupModule};
use crate::config::BackupOptions;
use crate::graph::GraphTransport;
use crate::persist::{BackupResults, Persister};
use futures::future::join_all;
use std::sync::Arc;
use tracing::info;

/// Final state of one module
#[derive(Debug)]
pub enum ModuleStatus {
    Completed(BackupResults),
    Failed,
    Skipped,
}

/// Outcome of one module run
#[derive(Debug)]
pub struct ModuleOutcome {
    pub module: &'static str,
    pub status: ModuleStatus,
}

impl ModuleOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, ModuleStatus::Failed)
    }
}

/// Runs backup modules against one transport and persister
pub struct BackupRunner {
    transport: Arc<dyn GraphTransport>,
    persister: Arc<dyn Persister>,
    options: BackupOptions,
}

impl BackupRunner {
    pub fn new(
        transport: Arc<dyn GraphTransport>,
        persister: Arc<dyn Persister>,
        options: BackupOptions,
    ) -> Self {
        Self {
            transport,
            persister,
            options,
        }
    }

    pub fn options(&self) -> &BackupOptions {
        &self.options
    }

    /// Run one module; `None` after a fatal, already logged failure
    pub async fn run_module(&self, module: &dyn BackupModule) -> Option<BackupResults> {
        pipeline::run(
            module,
            self.transport.as_ref(),
            self.persister.as_ref(),
            &self.options,
        )
        .await
    }

    /// Run every module not excluded by name, concurrently
    pub async fn run_all(&self, modules: &[Box<dyn BackupModule>]) -> Vec<ModuleOutcome> {
        let runs = modules.iter().map(|module| async move {
            let name = module.descriptor().name;
            if self.options.skips_module(name) {
                info!(module = name, "Module excluded, skipping");
                return ModuleOutcome {
                    module: name,
                    status: ModuleStatus::Skipped,
                };
            }

            let status = match self.run_module(module.as_ref()).await {
                Some(results) => ModuleStatus::Completed(results),
                None => ModuleStatus::Failed,
            };
            ModuleOutcome { module: name, status }
        });

        join_all(runs).await
    }
}
