//! Graph API transport
//!
//! The engine only talks to the API through [`GraphTransport`]:
//! - `request`: one logical GET of an endpoint (pagination is the transport's concern)
//! - `batch_request`: one logical batched round-trip for any number of items
//!
//! Batch responses may arrive in any order and count. Callers must correlate
//! through the envelope id (see [`crate::engine::envelope`]), never by position.

pub mod client;

pub use client::GraphClient;
pub use reqwest::Method;

use crate::engine::envelope::BatchEnvelope;
use crate::error::GraphError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Query parameters for a single request
pub type QueryParams<'a> = &'a [(&'a str, &'a str)];

/// One unit of work inside a batch round-trip
///
/// The sub-request URL is `url + "/" + id + extra_url`; its envelope id is
/// `id + extra_url`, so the leading segment of the envelope id is always `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItem {
    pub id: String,
}

impl BatchItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Graph API collaborator
#[async_trait]
pub trait GraphTransport: Send + Sync {
    /// Single logical GET; fails with `GraphError` on non-success status
    async fn request(&self, endpoint: &str, params: QueryParams<'_>) -> Result<Value, GraphError>;

    /// One logical batched call regardless of `items.len()`
    async fn batch_request(
        &self,
        items: &[BatchItem],
        url: &str,
        extra_url: &str,
        method: Method,
    ) -> Result<Vec<BatchEnvelope>, GraphError>;
}
