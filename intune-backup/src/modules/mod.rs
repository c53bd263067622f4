//! Backup modules, one per entity type
//!
//! Each module declares its endpoint, output path and name key in a
//! [`ModuleDescriptor`](crate::engine::ModuleDescriptor) and implements its own
//! harvesting and merge rules. Merge rules are plain functions so they can be
//! tested without a transport.

pub mod app_configuration;
pub mod device_compliance;
pub mod group_policy_configurations;
pub mod roles;

pub use app_configuration::AppConfigurationModule;
pub use device_compliance::DeviceComplianceModule;
pub use group_policy_configurations::GroupPolicyConfigurationsModule;
pub use roles::RolesModule;

use crate::engine::BackupModule;

/// Every available module, in run order
pub fn all_modules() -> Vec<Box<dyn BackupModule>> {
    vec![
        Box::new(AppConfigurationModule),
        Box::new(DeviceComplianceModule),
        Box::new(GroupPolicyConfigurationsModule),
        Box::new(RolesModule),
    ]
}

/// Modules whose names match `names` (case-insensitive); all when `names` is empty
pub fn select_modules(names: &[String]) -> Vec<Box<dyn BackupModule>> {
    all_modules()
        .into_iter()
        .filter(|module| {
            names.is_empty()
                || names
                    .iter()
                    .any(|n| n.eq_ignore_ascii_case(module.descriptor().name))
        })
        .collect()
}
