//! Test Helper Utilities
//!
//! Shared utilities for testing intune-backup

#![allow(dead_code)]

pub mod fake_graph;
pub mod log_capture;
pub mod memory_persister;

pub use fake_graph::{BatchCall, FakeGraph};
pub use log_capture::{init_test_logging, LogCapture};
pub use memory_persister::MemoryPersister;

use serde_json::Value;

/// Object literal as a record
pub fn record(value: Value) -> intune_backup::engine::Record {
    value
        .as_object()
        .cloned()
        .expect("record literal must be an object")
}
