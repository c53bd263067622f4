//! Persister that keeps records in memory

use async_trait::async_trait;
use intune_backup::engine::Record;
use intune_backup::persist::{BackupOutput, BackupResults, PersistRequest, Persister};
use intune_backup::PersistError;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryPersister {
    saved: Mutex<HashMap<String, Vec<Record>>>,
    fail: bool,
}

impl MemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persister whose every write fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Records last persisted under `path`
    pub fn saved(&self, path: &str) -> Option<Vec<Record>> {
        self.saved.lock().unwrap().get(path).cloned()
    }

    pub fn saved_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.saved.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl Persister for MemoryPersister {
    async fn persist(
        &self,
        records: Vec<Record>,
        request: &PersistRequest<'_>,
    ) -> Result<BackupResults, PersistError> {
        if self.fail {
            return Err(PersistError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "simulated write failure",
            )));
        }

        let outputs = records
            .iter()
            .map(|record| BackupOutput {
                name: record
                    .get(request.name_key)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                file: request.path.into(),
                audit_type: request.audit.kind.clone(),
                audit_value: record
                    .get(&request.audit.value_key)
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            })
            .collect::<Vec<_>>();

        self.saved
            .lock()
            .unwrap()
            .insert(request.path.to_string(), records);

        Ok(BackupResults {
            config_count: outputs.len(),
            outputs,
            audit_filter: request.audit_filter.to_string(),
        })
    }
}
