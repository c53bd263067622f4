//! Assignment stage shared by modules that declare an [`AssignmentSource`]
//!
//! Stage 1: `{url}/{id}/assignments` for every record, keyed by correlation key.
//! Stage 2: distinct `target.groupId` values → group display names.
//! Merge: cleaned assignments with `target.groupName` land in `assignments`.

use super::cleanup::remove_keys_value;
use super::harvest::collect_into;
use super::pipeline::{record_id, record_ids, AssignmentSource, Record, StageContext};
use super::resolver::ResolutionMap;
use intune_common::uuid_utils::is_resolvable_id;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

/// Group lookups
pub const GROUPS_URL: &str = "/beta/groups";

/// Only the group name is needed
pub const GROUP_SELECT: &str = "?$select=displayName";

/// Resolve and attach assignments for every record
pub async fn attach_assignments(ctx: &StageContext<'_>, source: AssignmentSource, records: &mut [Record]) {
    let ids = record_ids(records);
    let assignments = ctx
        .resolver
        .resolve_children(&ids, source.url, source.extra_url)
        .await;

    let mut group_ids = BTreeSet::new();
    for list in assignments.values() {
        for assignment in list {
            collect_into(assignment, &["groupId"], &is_resolvable_id, &mut group_ids);
        }
    }
    let group_names = ctx
        .resolver
        .resolve_display_names(&group_ids, GROUPS_URL, GROUP_SELECT)
        .await;

    debug!(
        records = records.len(),
        with_assignments = assignments.len(),
        groups = group_ids.len(),
        "Assignment stage resolved"
    );

    for record in records.iter_mut() {
        let found = record_id(record).and_then(|id| assignments.get(id));
        merge_assignments(record, found, &group_names);
    }
}

/// Attach cleaned assignments; records without any stay untouched
pub fn merge_assignments(
    record: &mut Record,
    assignments: Option<&Vec<Value>>,
    group_names: &ResolutionMap<String>,
) {
    let Some(assignments) = assignments.filter(|list| !list.is_empty()) else {
        return;
    };

    let cleaned: Vec<Value> = assignments
        .iter()
        .cloned()
        .map(|mut assignment| {
            remove_keys_value(&mut assignment);
            if let Some(target) = assignment.get_mut("target").and_then(Value::as_object_mut) {
                let name = target
                    .get("groupId")
                    .and_then(Value::as_str)
                    .and_then(|id| group_names.get(id))
                    .cloned();
                if let Some(name) = name {
                    target.insert("groupName".to_string(), Value::String(name));
                }
            }
            assignment
        })
        .collect();

    record.insert("assignments".to_string(), Value::Array(cleaned));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_merge_adds_group_names() {
        let mut rec = record(json!({"id": "p1"}));
        let assignments = vec![
            json!({"id": "as1", "target": {"@odata.type": "#microsoft.graph.groupAssignmentTarget", "groupId": "g1"}}),
            json!({"id": "as2", "target": {"@odata.type": "#microsoft.graph.allDevicesAssignmentTarget"}}),
            json!({"id": "as3", "target": {"groupId": "g-unknown"}}),
        ];
        let names: ResolutionMap<String> = [("g1".to_string(), "Pilot".to_string())].into_iter().collect();

        merge_assignments(&mut rec, Some(&assignments), &names);

        assert_eq!(
            rec["assignments"],
            json!([
                {"target": {"@odata.type": "#microsoft.graph.groupAssignmentTarget", "groupId": "g1", "groupName": "Pilot"}},
                {"target": {"@odata.type": "#microsoft.graph.allDevicesAssignmentTarget"}},
                {"target": {"groupId": "g-unknown"}}
            ])
        );
    }

    #[test]
    fn test_merge_without_assignments_is_noop() {
        let mut rec = record(json!({"id": "p1"}));
        merge_assignments(&mut rec, None, &ResolutionMap::new());
        merge_assignments(&mut rec, Some(&Vec::new()), &ResolutionMap::new());
        assert!(!rec.contains_key("assignments"));
    }
}
