//! Volatile key removal
//!
//! Server-managed fields change on every read and carry no configuration, so
//! they are stripped before records are written.

use serde_json::{Map, Value};

/// Keys dropped from persisted objects
pub const VOLATILE_KEYS: &[&str] = &[
    "id",
    "createdDateTime",
    "version",
    "lastModifiedDateTime",
    "@odata.context",
];

/// Remove volatile keys from one object (not recursive)
pub fn remove_keys(object: &mut Map<String, Value>) {
    for key in VOLATILE_KEYS {
        object.remove(*key);
    }
}

/// Remove volatile keys when `value` is an object
pub fn remove_keys_value(value: &mut Value) {
    if let Value::Object(object) = value {
        remove_keys(object);
    }
}
