//! File persister
//!
//! `<root>/<module path>/<sanitized name>.<json|yaml>`, one file per record.
//! Every record is serialized before the first write, and files are staged as
//! temp files next to their targets before any of them is moved into place, so
//! a failing module never leaves partial output behind.

use super::{BackupOutput, BackupResults, OutputFormat, PersistRequest, Persister};
use crate::engine::cleanup::remove_keys;
use crate::engine::Record;
use crate::error::PersistError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Writes records below an output root
pub struct FilePersister {
    root: PathBuf,
    format: OutputFormat,
}

impl FilePersister {
    pub fn new(root: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    fn serialize(&self, record: &Record) -> Result<String, PersistError> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(record)
                .map(|mut s| {
                    s.push('\n');
                    s
                })
                .map_err(|e| PersistError::Serialize(e.to_string())),
            OutputFormat::Yaml => {
                serde_yaml::to_string(record).map_err(|e| PersistError::Serialize(e.to_string()))
            }
        }
    }
}

struct PendingFile {
    name: String,
    file: PathBuf,
    contents: String,
    audit_value: Option<String>,
}

#[async_trait]
impl Persister for FilePersister {
    async fn persist(
        &self,
        records: Vec<Record>,
        request: &PersistRequest<'_>,
    ) -> Result<BackupResults, PersistError> {
        let dir = self.root.join(request.path);
        let mut used_stems = HashSet::new();
        let mut pending = Vec::with_capacity(records.len());

        for mut record in records {
            let id = record.get("id").and_then(scalar_text);
            let audit_value = record.get(&request.audit.value_key).and_then(scalar_text);
            let name = record
                .get(request.name_key)
                .and_then(scalar_text)
                .or_else(|| id.clone())
                .ok_or_else(|| PersistError::MissingName(request.name_key.to_string()))?;

            let stem = allocate_stem(&mut used_stems, &name, id.as_deref());

            remove_keys(&mut record);
            let contents = self.serialize(&record)?;
            pending.push(PendingFile {
                name,
                file: dir.join(format!("{}.{}", stem, self.format.extension())),
                contents,
                audit_value,
            });
        }

        if pending.is_empty() {
            debug!(path = %dir.display(), "Nothing to persist");
            return Ok(BackupResults {
                audit_filter: request.audit_filter.to_string(),
                ..BackupResults::default()
            });
        }

        tokio::fs::create_dir_all(&dir).await?;

        let writes: Vec<(PathBuf, String)> = pending
            .iter_mut()
            .map(|item| (item.file.clone(), std::mem::take(&mut item.contents)))
            .collect();
        let staging_dir = dir.clone();
        tokio::task::spawn_blocking(move || write_all_or_nothing(&staging_dir, writes))
            .await
            .map_err(|e| PersistError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        let outputs: Vec<BackupOutput> = pending
            .into_iter()
            .map(|item| {
                info!("{}{}", request.log_message, item.name);
                BackupOutput {
                    name: item.name,
                    file: item.file,
                    audit_type: request.audit.kind.clone(),
                    audit_value: item.audit_value,
                }
            })
            .collect();

        Ok(BackupResults {
            config_count: outputs.len(),
            outputs,
            audit_filter: request.audit_filter.to_string(),
        })
    }
}

/// Unused file stem for `name`
///
/// A taken name gets `__<id>`, then a counter until the stem is free.
fn allocate_stem(used: &mut HashSet<String>, name: &str, id: Option<&str>) -> String {
    let base = sanitize_file_name(name);
    if used.insert(base.clone()) {
        return base;
    }

    if let Some(id) = id {
        let with_id = format!("{}__{}", base, sanitize_file_name(id));
        if used.insert(with_id.clone()) {
            return with_id;
        }
    }

    let mut counter = 2;
    loop {
        let numbered = format!("{}__{}", base, counter);
        if used.insert(numbered.clone()) {
            return numbered;
        }
        counter += 1;
    }
}

/// Stage every file as a temp file in `dir`, then move them all into place
///
/// Any failure leaves no new file behind: unmoved temp files are deleted on
/// drop, files already moved by this call are removed again.
fn write_all_or_nothing(dir: &Path, writes: Vec<(PathBuf, String)>) -> Result<(), PersistError> {
    let mut staged = Vec::with_capacity(writes.len());
    for (target, contents) in writes {
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(contents.as_bytes())?;
        temp.flush()?;
        staged.push((temp, target));
    }

    let mut committed: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for (temp, target) in staged {
        if let Err(e) = temp.persist(&target) {
            for path in &committed {
                if let Err(remove_err) = std::fs::remove_file(path) {
                    warn!(file = %path.display(), error = %remove_err, "Could not roll back written file");
                }
            }
            return Err(PersistError::Io(e.error));
        }
        committed.push(target);
    }
    Ok(())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Replace characters that are invalid in file names on common platforms
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}
