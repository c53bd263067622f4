//! Group Policy Configuration (ADMX) backup
//!
//! Stage 1: `definitionValues` (with expanded definitions) for every policy.
//! Stage 2: `presentationValues` for every definition value found in stage 1,
//! addressed by the composite key `{policyId}/definitionValues/{definitionValueId}`.
//!
//! Merge builds `definitionValues[].presentationValues[]`; both levels default
//! to an empty list.

use crate::engine::pipeline::{record_id, record_ids, AssignmentSource};
use crate::engine::{BackupModule, ModuleDescriptor, Record, ResolutionMap, StageContext};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

const POLICY_URL: &str = "/beta/deviceManagement/groupPolicyConfigurations";
const DEFINITIONS_EXTRA: &str = "/definitionValues?$expand=definition";
const PRESENTATIONS_EXTRA: &str = "/presentationValues?$expand=presentation";
const PRESENTATIONS_RESOURCE: &str = "presentationValues";

static DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
    name: "GroupPolicyConfigurations",
    endpoint: POLICY_URL,
    params: &[],
    path: "Group Policy Configurations",
    name_key: "displayName",
    log_message: "Backing up Device Configuration: ",
    audit_filter: "componentName eq 'DeviceConfiguration'",
    assignments: Some(AssignmentSource {
        url: POLICY_URL,
        extra_url: "/assignments",
    }),
};

pub struct GroupPolicyConfigurationsModule;

#[async_trait]
impl BackupModule for GroupPolicyConfigurationsModule {
    fn descriptor(&self) -> &'static ModuleDescriptor {
        &DESCRIPTOR
    }

    async fn enrich(&self, ctx: &StageContext<'_>, records: &mut [Record]) {
        let definitions = ctx
            .resolver
            .resolve_children(&record_ids(records), POLICY_URL, DEFINITIONS_EXTRA)
            .await;

        let keys = presentation_keys(&definitions);
        let presentations = ctx
            .resolver
            .resolve_nested(&keys, POLICY_URL, PRESENTATIONS_EXTRA, PRESENTATIONS_RESOURCE)
            .await;

        debug!(
            policies_with_definitions = definitions.len(),
            definition_values = keys.len(),
            with_presentations = presentations.len(),
            "Group policy stages resolved"
        );

        for record in records.iter_mut() {
            merge_definitions(record, &definitions, &presentations);
        }
    }
}

/// `{policyId}/definitionValues/{definitionValueId}`
pub fn presentation_key(policy_id: &str, definition_value_id: &str) -> String {
    format!("{}/definitionValues/{}", policy_id, definition_value_id)
}

/// Composite keys for every definition value of every policy
pub fn presentation_keys(definitions: &ResolutionMap<Vec<Value>>) -> BTreeSet<String> {
    definitions
        .iter()
        .flat_map(|(policy_id, values)| {
            values
                .iter()
                .filter_map(|value| value.get("id").and_then(Value::as_str))
                .map(move |id| presentation_key(policy_id, id))
        })
        .collect()
}

/// Attach `definitionValues` with their `presentationValues`
pub fn merge_definitions(
    record: &mut Record,
    definitions: &ResolutionMap<Vec<Value>>,
    presentations: &ResolutionMap<Vec<Value>>,
) {
    let Some(policy_id) = record_id(record).map(str::to_string) else {
        record.insert("definitionValues".to_string(), Value::Array(Vec::new()));
        return;
    };

    let mut values = definitions.get(&policy_id).cloned().unwrap_or_default();
    for value in values.iter_mut() {
        let found = value
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| presentations.get(&presentation_key(&policy_id, id)))
            .cloned()
            .unwrap_or_default();
        if let Value::Object(object) = value {
            object.insert("presentationValues".to_string(), Value::Array(found));
        }
    }

    record.insert("definitionValues".to_string(), Value::Array(values));
}
