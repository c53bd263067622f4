//! Staged dependent-batch-fetch and enrichment engine
//!
//! # Architecture
//! - **envelope**: correlation keys and payloads of batch sub-responses
//! - **harvest**: identifier collection and sentinel path discovery over JSON trees
//! - **resolver**: one deduplicated batch round-trip → resolution map
//! - **pipeline**: module contract, primary fetch, enrichment, persistence hand-off
//! - **assignments**: shared assignment stage for modules that declare one
//! - **runner**: runs independent modules side by side
//! - **cleanup**: volatile key removal

pub mod assignments;
pub mod cleanup;
pub mod envelope;
pub mod harvest;
pub mod pipeline;
pub mod resolver;
pub mod runner;

pub use envelope::BatchEnvelope;
pub use pipeline::{BackupModule, ModuleDescriptor, Record, StageContext};
pub use resolver::{BatchResolver, ResolutionMap};
pub use runner::{BackupRunner, ModuleOutcome, ModuleStatus};
