//! Device Compliance backup
//!
//! # Stages
//! 1. Linux policies are recognized by the discovery-script sentinel anywhere in
//!    the settings tree. The script id sits next to the sentinel in
//!    `simpleSettingValue.value`; each distinct id is looked up on its own
//!    (`reusablePolicySettings` only supports `$filter` lookups), concurrently.
//! 2. Scheduled actions for every policy in one batch, keyed by policy id.
//! 3. Notification template names for every non-sentinel template id found in
//!    stage 2, in one batch.
//!
//! `detectionScriptName` is only ever added to Linux policies.

use crate::engine::cleanup::remove_keys_value;
use crate::engine::harvest::{collect_into, find_path_in_map, sibling_in_map};
use crate::engine::pipeline::{record_id, record_ids, AssignmentSource};
use crate::engine::resolver::display_name;
use crate::engine::{BackupModule, ModuleDescriptor, Record, ResolutionMap, StageContext};
use async_trait::async_trait;
use futures::future::join_all;
use intune_common::uuid_utils::is_resolvable_id;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Value marking the Linux custom compliance discovery-script setting
pub const LINUX_DISCOVERY_SENTINEL: &str = "linux_customcompliance_discoveryscript";

const POLICY_URL: &str = "/beta/deviceManagement/compliancePolicies";
const SCRIPT_ENDPOINT: &str = "/beta/deviceManagement/reusablePolicySettings/";
const SCHEDULED_ACTIONS_EXTRA: &str =
    "/scheduledActionsForRule?$expand=scheduledActionConfigurations";
const TEMPLATE_URL: &str = "/beta/deviceManagement/notificationMessageTemplates";

static DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
    name: "DeviceCompliance",
    endpoint: POLICY_URL,
    params: &[("$expand", "settings")],
    path: "Compliance Policies/Policies",
    name_key: "name",
    log_message: "Backing up Compliance: ",
    audit_filter: "componentName eq 'DeviceCompliancePolicy'",
    assignments: Some(AssignmentSource {
        url: POLICY_URL,
        extra_url: "/assignments",
    }),
};

/// Discovery-script reference of one policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionScript {
    /// No sentinel anywhere in the policy
    NotLinux,
    /// Linux policy; id absent when the sentinel has no `simpleSettingValue.value`
    Linux { script_id: Option<String> },
}

impl DetectionScript {
    pub fn script_id(&self) -> Option<&str> {
        match self {
            DetectionScript::Linux { script_id } => script_id.as_deref(),
            DetectionScript::NotLinux => None,
        }
    }
}

pub struct DeviceComplianceModule;

#[async_trait]
impl BackupModule for DeviceComplianceModule {
    fn descriptor(&self) -> &'static ModuleDescriptor {
        &DESCRIPTOR
    }

    async fn enrich(&self, ctx: &StageContext<'_>, records: &mut [Record]) {
        // Stage 1: detection scripts
        let scripts: Vec<DetectionScript> = records.iter().map(detection_script).collect();
        let script_ids: BTreeSet<&str> = scripts.iter().filter_map(DetectionScript::script_id).collect();

        let lookups = script_ids.iter().map(|id| async move {
            lookup_script_name(ctx, id).await.map(|name| (id.to_string(), name))
        });
        let script_names: ResolutionMap<String> = join_all(lookups).await.into_iter().flatten().collect();

        // Stage 2: scheduled actions
        let actions = ctx
            .resolver
            .resolve_children(&record_ids(records), POLICY_URL, SCHEDULED_ACTIONS_EXTRA)
            .await;

        // Stage 3: notification templates
        let mut template_ids = BTreeSet::new();
        for list in actions.values() {
            for action in list {
                collect_into(action, &["notificationTemplateId"], &is_resolvable_id, &mut template_ids);
            }
        }
        let templates = ctx
            .resolver
            .resolve_display_names(&template_ids, TEMPLATE_URL, "")
            .await;

        debug!(
            scripts = script_ids.len(),
            policies_with_actions = actions.len(),
            templates = template_ids.len(),
            "Compliance stages resolved"
        );

        for (record, script) in records.iter_mut().zip(scripts.iter()) {
            merge_detection_script(record, script, &script_names);
            let policy_actions = record_id(record).and_then(|id| actions.get(id));
            merge_scheduled_actions(record, policy_actions, &templates);
        }
    }
}

/// Locate the Linux discovery-script reference of a policy
pub fn detection_script(record: &Record) -> DetectionScript {
    match find_path_in_map(record, LINUX_DISCOVERY_SENTINEL) {
        None => DetectionScript::NotLinux,
        Some(path) => DetectionScript::Linux {
            script_id: sibling_in_map(record, &path, &["simpleSettingValue", "value"])
                .and_then(Value::as_str)
                .map(str::to_string),
        },
    }
}

async fn lookup_script_name(ctx: &StageContext<'_>, script_id: &str) -> Option<String> {
    let filter = format!("id eq '{}'", script_id);
    match ctx
        .transport
        .request(SCRIPT_ENDPOINT, &[("$filter", filter.as_str())])
        .await
    {
        Ok(data) => data
            .get("value")
            .and_then(Value::as_array)
            .and_then(|found| found.first())
            .and_then(display_name),
        Err(e) => {
            warn!(script_id = %script_id, error = %e, "Detection script lookup failed");
            None
        }
    }
}

/// Add `detectionScriptName` to Linux policies (null when unresolved)
pub fn merge_detection_script(
    record: &mut Record,
    script: &DetectionScript,
    names: &ResolutionMap<String>,
) {
    if let DetectionScript::Linux { script_id } = script {
        let name = script_id
            .as_deref()
            .and_then(|id| names.get(id))
            .map(|name| Value::String(name.clone()))
            .unwrap_or(Value::Null);
        record.insert("detectionScriptName".to_string(), name);
    }
}

/// Attach cleaned scheduled actions (default `[]`) with template names
pub fn merge_scheduled_actions(
    record: &mut Record,
    actions: Option<&Vec<Value>>,
    templates: &ResolutionMap<String>,
) {
    let mut actions = actions.cloned().unwrap_or_default();

    for action in actions.iter_mut() {
        remove_keys_value(action);
        let Some(configs) = action
            .get_mut("scheduledActionConfigurations")
            .and_then(Value::as_array_mut)
        else {
            continue;
        };

        for config in configs.iter_mut() {
            let template_id = config
                .get("notificationTemplateId")
                .and_then(Value::as_str)
                .filter(|id| is_resolvable_id(id))
                .map(str::to_string);

            if let (Some(id), Value::Object(object)) = (template_id, &mut *config) {
                let name = templates
                    .get(&id)
                    .map(|name| Value::String(name.clone()))
                    .unwrap_or(Value::Null);
                object.insert("notificationTemplateName".to_string(), name);
            }
            remove_keys_value(config);
        }
    }

    record.insert("scheduledActionsForRule".to_string(), Value::Array(actions));
}
