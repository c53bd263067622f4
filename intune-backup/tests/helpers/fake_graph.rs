//! In-memory Graph transport
//!
//! Answers single requests from a table keyed by endpoint and query, and batch
//! sub-requests from a table keyed by their full path (`{url}/{id}{extra}`).
//! Every call is recorded. Batch envelopes come back in reverse order so tests
//! never depend on response ordering.

use async_trait::async_trait;
use intune_backup::engine::BatchEnvelope;
use intune_backup::graph::{BatchItem, GraphTransport, Method, QueryParams};
use intune_backup::GraphError;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// One recorded batch call
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCall {
    pub url: String,
    pub extra_url: String,
    pub ids: Vec<String>,
}

#[derive(Default)]
pub struct FakeGraph {
    requests: HashMap<String, Value>,
    batch_bodies: HashMap<String, Value>,
    failing_requests: HashSet<String>,
    failing_batches: HashSet<String>,
    request_log: Mutex<Vec<String>>,
    batch_log: Mutex<Vec<BatchCall>>,
}

/// `endpoint` or `endpoint?k=v&k=v`
pub fn request_key(endpoint: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return endpoint.to_string();
    }
    let query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}?{}", endpoint, query.join("&"))
}

impl FakeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer for a single request
    pub fn with_request(mut self, endpoint: &str, params: &[(&str, &str)], body: Value) -> Self {
        self.requests.insert(request_key(endpoint, params), body);
        self
    }

    /// Primary list response `{"value": records}`
    pub fn with_list(self, endpoint: &str, params: &[(&str, &str)], records: Vec<Value>) -> Self {
        self.with_request(endpoint, params, json!({ "value": records }))
    }

    /// Body for the batch sub-request at `{url}/{id}{extra}`
    pub fn with_batch_body(mut self, path: &str, body: Value) -> Self {
        self.batch_bodies.insert(path.to_string(), body);
        self
    }

    /// Every request to `endpoint` fails, whatever its params
    pub fn failing_request(mut self, endpoint: &str) -> Self {
        self.failing_requests.insert(endpoint.to_string());
        self
    }

    /// Every batch call for `url` + `extra_url` fails
    pub fn failing_batch(mut self, url: &str, extra_url: &str) -> Self {
        self.failing_batches.insert(format!("{}|{}", url, extra_url));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.request_log.lock().unwrap().clone()
    }

    pub fn batch_calls(&self) -> Vec<BatchCall> {
        self.batch_log.lock().unwrap().clone()
    }

    /// Batch calls made against `url` with `extra_url`
    pub fn batch_calls_for(&self, url: &str, extra_url: &str) -> Vec<BatchCall> {
        self.batch_calls()
            .into_iter()
            .filter(|call| call.url == url && call.extra_url == extra_url)
            .collect()
    }
}

#[async_trait]
impl GraphTransport for FakeGraph {
    async fn request(&self, endpoint: &str, params: QueryParams<'_>) -> Result<Value, GraphError> {
        let key = request_key(endpoint, params);
        self.request_log.lock().unwrap().push(key.clone());

        if self.failing_requests.contains(endpoint) {
            return Err(GraphError::Api {
                status: 500,
                body: "simulated failure".to_string(),
            });
        }

        self.requests.get(&key).cloned().ok_or(GraphError::Api {
            status: 404,
            body: format!("no fake answer for {}", key),
        })
    }

    async fn batch_request(
        &self,
        items: &[BatchItem],
        url: &str,
        extra_url: &str,
        _method: Method,
    ) -> Result<Vec<BatchEnvelope>, GraphError> {
        self.batch_log.lock().unwrap().push(BatchCall {
            url: url.to_string(),
            extra_url: extra_url.to_string(),
            ids: items.iter().map(|item| item.id.clone()).collect(),
        });

        if self.failing_batches.contains(&format!("{}|{}", url, extra_url)) {
            return Err(GraphError::Network("simulated batch failure".to_string()));
        }

        let envelopes = items
            .iter()
            .rev()
            .map(|item| {
                let envelope_id = format!("{}{}", item.id, extra_url);
                match self.batch_bodies.get(&format!("{}/{}", url, envelope_id)) {
                    Some(body) => BatchEnvelope::ok(envelope_id, body.clone()),
                    None => BatchEnvelope::new(
                        envelope_id,
                        404,
                        Some(json!({"error": {"code": "ResourceNotFound"}})),
                    ),
                }
            })
            .collect();
        Ok(envelopes)
    }
}
