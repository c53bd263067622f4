//! Role Definition backup (custom roles only)
//!
//! Roles carry their own assignment shape, so the shared assignment stage is
//! not used. When assignments are not excluded:
//! 1. `roleAssignments` list per role, keyed by role id
//! 2. Full details of every distinct assignment
//! 3. Union of `scopeMembers` and `members` across all details
//! 4. Group display names for that union
//!
//! Merge replaces member and scope ids in place with group names (raw id when
//! unresolved). Permission lists are always stripped.

use crate::engine::assignments::{GROUPS_URL, GROUP_SELECT};
use crate::engine::cleanup::remove_keys_value;
use crate::engine::harvest::collect_into;
use crate::engine::pipeline::{record_id, record_ids};
use crate::engine::{BackupModule, ModuleDescriptor, Record, ResolutionMap, StageContext};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

const ROLE_URL: &str = "/beta/deviceManagement/roleDefinitions";
const ASSIGNMENT_URL: &str = "/beta/deviceManagement/roleAssignments";

/// Assignment fields holding group ids
const MEMBER_FIELDS: &[&str] = &["scopeMembers", "members"];

static DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
    name: "Roles",
    endpoint: ROLE_URL,
    params: &[("$filter", "isBuiltIn eq false")],
    path: "Roles",
    name_key: "displayName",
    log_message: "Backing up Role: ",
    audit_filter: "componentName eq 'RoleBasedAccessControl'",
    assignments: None,
};

pub struct RolesModule;

#[async_trait]
impl BackupModule for RolesModule {
    fn descriptor(&self) -> &'static ModuleDescriptor {
        &DESCRIPTOR
    }

    async fn enrich(&self, ctx: &StageContext<'_>, records: &mut [Record]) {
        if ctx.options.excludes_assignments() {
            debug!("Role assignments excluded");
        } else {
            let assignments = ctx
                .resolver
                .resolve_children(&record_ids(records), ROLE_URL, "/roleAssignments")
                .await;

            let assignment_ids: BTreeSet<String> = assignments
                .values()
                .flatten()
                .filter_map(|assignment| assignment.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            let details = ctx
                .resolver
                .resolve_entities(&assignment_ids, ASSIGNMENT_URL, "")
                .await;

            let mut group_ids = BTreeSet::new();
            for detail in details.values() {
                collect_into(detail, MEMBER_FIELDS, &|id: &str| !id.is_empty(), &mut group_ids);
            }
            let groups = ctx
                .resolver
                .resolve_display_names(&group_ids, GROUPS_URL, GROUP_SELECT)
                .await;

            debug!(
                roles_with_assignments = assignments.len(),
                assignments = details.len(),
                groups = group_ids.len(),
                "Role stages resolved"
            );

            for record in records.iter_mut() {
                let listed = record_id(record).and_then(|id| assignments.get(id));
                merge_role_assignments(record, listed, &details, &groups);
            }
        }

        for record in records.iter_mut() {
            strip_permissions(record);
        }
    }
}

/// Attach `roleAssignments` built from the resolved assignment details
///
/// Roles without listed assignments get no field. Listed assignments whose
/// details did not resolve are dropped.
pub fn merge_role_assignments(
    record: &mut Record,
    listed: Option<&Vec<Value>>,
    details: &ResolutionMap,
    groups: &ResolutionMap<String>,
) {
    let Some(listed) = listed.filter(|list| !list.is_empty()) else {
        return;
    };

    let assembled: Vec<Value> = listed
        .iter()
        .filter_map(|assignment| assignment.get("id").and_then(Value::as_str))
        .filter_map(|id| details.get(id))
        .cloned()
        .map(|mut detail| {
            remove_keys_value(&mut detail);
            if let Value::Object(object) = &mut detail {
                for field in MEMBER_FIELDS {
                    if let Some(Value::Array(ids)) = object.get_mut(*field) {
                        for id in ids.iter_mut() {
                            let name = id.as_str().and_then(|group| groups.get(group)).cloned();
                            if let Some(name) = name {
                                *id = Value::String(name);
                            }
                        }
                    }
                }
                object.remove("resourceScopes");
            }
            detail
        })
        .collect();

    record.insert("roleAssignments".to_string(), Value::Array(assembled));
}

/// Drop `permissions` and the first role permission's `actions`
pub fn strip_permissions(record: &mut Record) {
    record.remove("permissions");
    if let Some(first) = record
        .get_mut("rolePermissions")
        .and_then(Value::as_array_mut)
        .and_then(|permissions| permissions.first_mut())
        .and_then(Value::as_object_mut)
    {
        first.remove("actions");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn role() -> Record {
        json!({
            "id": "r1",
            "displayName": "Helpdesk",
            "permissions": [{"actions": ["a"]}],
            "rolePermissions": [{"actions": ["a"], "resourceActions": [{"allowedResourceActions": ["x"]}]}]
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_strip_permissions() {
        let mut record = role();
        strip_permissions(&mut record);
        assert!(!record.contains_key("permissions"));
        assert_eq!(
            record["rolePermissions"],
            json!([{"resourceActions": [{"allowedResourceActions": ["x"]}]}])
        );
    }

    #[test]
    fn test_strip_permissions_tolerates_missing_fields() {
        let mut record = json!({"id": "r2", "rolePermissions": []}).as_object().cloned().unwrap();
        strip_permissions(&mut record);
        assert_eq!(record["rolePermissions"], json!([]));

        let mut record = json!({"id": "r3"}).as_object().cloned().unwrap();
        strip_permissions(&mut record);
        assert!(!record.contains_key("rolePermissions"));
    }

    #[test]
    fn test_members_replaced_by_names() {
        let mut record = role();
        let listed = vec![json!({"id": "ra1"}), json!({"id": "ra-missing"})];
        let details: ResolutionMap = [(
            "ra1".to_string(),
            json!({
                "id": "ra1",
                "displayName": "Helpdesk EU",
                "scopeMembers": ["g1", "g2"],
                "members": ["g1"],
                "resourceScopes": ["/"]
            }),
        )]
        .into_iter()
        .collect();
        let groups: ResolutionMap<String> = [("g1".to_string(), "EU Staff".to_string())].into_iter().collect();

        merge_role_assignments(&mut record, Some(&listed), &details, &groups);

        assert_eq!(
            record["roleAssignments"],
            json!([{
                "displayName": "Helpdesk EU",
                "scopeMembers": ["EU Staff", "g2"],
                "members": ["EU Staff"]
            }])
        );
    }

    #[test]
    fn test_no_listed_assignments_no_field() {
        let mut record = role();
        merge_role_assignments(&mut record, None, &ResolutionMap::new(), &ResolutionMap::new());
        merge_role_assignments(&mut record, Some(&Vec::new()), &ResolutionMap::new(), &ResolutionMap::new());
        assert!(!record.contains_key("roleAssignments"));
    }
}
