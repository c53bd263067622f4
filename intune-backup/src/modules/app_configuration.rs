//! App Configuration backup
//!
//! Stage 1: every `targetedMobileApps` id across all configurations, resolved
//! against `mobileApps` in one batch.
//!
//! Merge: the first targeted app that resolves (in list order) replaces the
//! list with `{appName, type}`; the rest are dropped. This is a lossy shape
//! that restore tooling expects, so multi-app configurations keep only one app.
//! `payloadJson` is decoded from base64 JSON into structured JSON.

use crate::engine::harvest::collect_from_map;
use crate::engine::pipeline::AssignmentSource;
use crate::engine::{BackupModule, ModuleDescriptor, Record, ResolutionMap, StageContext};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use intune_common::uuid_utils::is_resolvable_id;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::warn;

const APP_ENDPOINT: &str = "/beta/deviceAppManagement/mobileApps";

static DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
    name: "AppConfiguration",
    endpoint: "/beta/deviceAppManagement/mobileAppConfigurations",
    params: &[],
    path: "App Configuration",
    name_key: "displayName",
    log_message: "Backing up App Configuration: ",
    audit_filter: "componentName eq 'MobileAppConfiguration'",
    assignments: Some(AssignmentSource {
        url: "/beta/deviceAppManagement/mobileAppConfigurations",
        extra_url: "/assignments",
    }),
};

pub struct AppConfigurationModule;

#[async_trait]
impl BackupModule for AppConfigurationModule {
    fn descriptor(&self) -> &'static ModuleDescriptor {
        &DESCRIPTOR
    }

    async fn enrich(&self, ctx: &StageContext<'_>, records: &mut [Record]) {
        let mut app_ids = BTreeSet::new();
        for record in records.iter() {
            collect_from_map(record, &["targetedMobileApps"], &is_resolvable_id, &mut app_ids);
        }

        let apps = ctx.resolver.resolve_entities(&app_ids, APP_ENDPOINT, "").await;

        for record in records.iter_mut() {
            merge_targeted_app(record, &apps);
            decode_payload(record);
        }
    }
}

/// Replace `targetedMobileApps` with the first resolvable app's `{appName, type}`
///
/// Left untouched when no listed app resolves.
pub fn merge_targeted_app(record: &mut Record, apps: &ResolutionMap) {
    let Some(Value::Array(targeted)) = record.get("targetedMobileApps") else {
        return;
    };

    let first = targeted
        .iter()
        .filter_map(Value::as_str)
        .find_map(|id| apps.get(id));

    if let Some(app) = first {
        let summary = json!({
            "appName": app.get("displayName").cloned().unwrap_or(Value::Null),
            "type": app.get("@odata.type").cloned().unwrap_or(Value::Null),
        });
        record.insert("targetedMobileApps".to_string(), summary);
    }
}

/// Decode `payloadJson` (base64 of a JSON document) in place
///
/// Undecodable payloads are kept as-is.
pub fn decode_payload(record: &mut Record) {
    let Some(Value::String(encoded)) = record.get("payloadJson") else {
        return;
    };
    if encoded.is_empty() {
        return;
    }

    match decode_base64_json(encoded) {
        Ok(decoded) => {
            record.insert("payloadJson".to_string(), decoded);
        }
        Err(e) => {
            let name = record
                .get("displayName")
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>");
            warn!(config = name, "Could not decode payloadJson: {}", e);
        }
    }
}

fn decode_base64_json(encoded: &str) -> Result<Value, String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| format!("base64: {}", e))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("json: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn apps(entries: Vec<(&str, Value)>) -> ResolutionMap {
        entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_first_resolved_app_wins() {
        let mut rec = record(json!({"id": "c1", "targetedMobileApps": ["app1", "app2"]}));
        let resolved = apps(vec![("app1", json!({"id": "app1", "displayName": "Foo", "@odata.type": "#t.App"}))]);

        merge_targeted_app(&mut rec, &resolved);

        assert_eq!(rec["targetedMobileApps"], json!({"appName": "Foo", "type": "#t.App"}));
    }

    #[test]
    fn test_later_app_used_when_first_unresolved() {
        let mut rec = record(json!({"targetedMobileApps": ["gone", "app2"]}));
        let resolved = apps(vec![("app2", json!({"displayName": "Bar", "@odata.type": "#t.Other"}))]);

        merge_targeted_app(&mut rec, &resolved);

        assert_eq!(rec["targetedMobileApps"], json!({"appName": "Bar", "type": "#t.Other"}));
    }

    #[test]
    fn test_unresolved_apps_keep_raw_list() {
        let mut rec = record(json!({"targetedMobileApps": ["x"]}));
        merge_targeted_app(&mut rec, &ResolutionMap::new());
        assert_eq!(rec["targetedMobileApps"], json!(["x"]));
    }

    #[test]
    fn test_payload_decoded() {
        let encoded = STANDARD.encode(r#"{"kind":"managed","settings":[1,2]}"#);
        let mut rec = record(json!({"payloadJson": encoded}));

        decode_payload(&mut rec);

        assert_eq!(rec["payloadJson"], json!({"kind": "managed", "settings": [1, 2]}));
    }

    #[test]
    fn test_bad_payload_left_alone() {
        let mut rec = record(json!({"payloadJson": "%%% not base64"}));
        decode_payload(&mut rec);
        assert_eq!(rec["payloadJson"], json!("%%% not base64"));

        let not_json = STANDARD.encode("plain text");
        let mut rec = record(json!({"payloadJson": not_json.clone()}));
        decode_payload(&mut rec);
        assert_eq!(rec["payloadJson"], json!(not_json));
    }
}
