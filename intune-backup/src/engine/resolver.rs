//! Deduplicating batch resolver
//!
//! Turns a set of identifiers into a [`ResolutionMap`] with exactly one batched
//! round-trip. Input sets are `BTreeSet`s, so duplicates are gone before the
//! call and item order is stable across runs.
//!
//! Failures never propagate: a failed round-trip yields an empty map, and an
//! identifier whose envelope is empty or unsuccessful simply has no entry.

use super::envelope::BatchEnvelope;
use crate::graph::{BatchItem, GraphTransport, Method};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Stage-local lookup table: identifier (or correlation key) → payload
pub type ResolutionMap<T = Value> = HashMap<String, T>;

/// Batch resolver bound to one transport
#[derive(Clone, Copy)]
pub struct BatchResolver<'a> {
    transport: &'a dyn GraphTransport,
}

impl<'a> BatchResolver<'a> {
    pub fn new(transport: &'a dyn GraphTransport) -> Self {
        Self { transport }
    }

    /// One batched round-trip; empty input issues no call
    async fn round_trip(&self, ids: &BTreeSet<String>, url: &str, extra_url: &str) -> Vec<BatchEnvelope> {
        if ids.is_empty() {
            return Vec::new();
        }

        let items: Vec<BatchItem> = ids.iter().map(BatchItem::new).collect();
        debug!(url = %url, extra_url = %extra_url, items = items.len(), "Batch round-trip");

        match self
            .transport
            .batch_request(&items, url, extra_url, Method::GET)
            .await
        {
            Ok(envelopes) => envelopes,
            Err(e) => {
                warn!(url = %url, extra_url = %extra_url, error = %e, "Batch request failed, continuing without it");
                Vec::new()
            }
        }
    }

    /// `{url}/{id}{extra}` for every id, keyed by the resolved entity id
    pub async fn resolve_entities(
        &self,
        ids: &BTreeSet<String>,
        url: &str,
        extra_url: &str,
    ) -> ResolutionMap {
        let mut map = ResolutionMap::new();
        for envelope in self.round_trip(ids, url, extra_url).await {
            let (Some(id), Some(body)) = (envelope.entity_id(extra_url), envelope.body()) else {
                continue;
            };
            map.insert(id, body.clone());
        }
        map
    }

    /// Same as [`Self::resolve_entities`] reduced to each entity's `displayName`
    pub async fn resolve_display_names(
        &self,
        ids: &BTreeSet<String>,
        url: &str,
        extra_url: &str,
    ) -> ResolutionMap<String> {
        self.resolve_entities(ids, url, extra_url)
            .await
            .into_iter()
            .filter_map(|(id, body)| display_name(&body).map(|name| (id, name)))
            .collect()
    }

    /// `{url}/{parent}{extra}` list responses, keyed by correlation key (the parent id)
    pub async fn resolve_children(
        &self,
        parent_ids: &BTreeSet<String>,
        url: &str,
        extra_url: &str,
    ) -> ResolutionMap<Vec<Value>> {
        let mut map = ResolutionMap::new();
        for envelope in self.round_trip(parent_ids, url, extra_url).await {
            let Some(values) = envelope.values() else {
                continue;
            };
            match envelope.correlation_key() {
                Some(key) => {
                    map.insert(key.to_string(), values.clone());
                }
                None => debug!(id = %envelope.id, "Dropping envelope without correlation key"),
            }
        }
        map
    }

    /// List responses for composite keys, keyed by the part in front of `/{resource}`
    pub async fn resolve_nested(
        &self,
        keys: &BTreeSet<String>,
        url: &str,
        extra_url: &str,
        resource: &str,
    ) -> ResolutionMap<Vec<Value>> {
        let mut map = ResolutionMap::new();
        for envelope in self.round_trip(keys, url, extra_url).await {
            let Some(values) = envelope.values() else {
                continue;
            };
            match envelope.key_before(resource) {
                Some(key) => {
                    map.insert(key.to_string(), values.clone());
                }
                None => debug!(id = %envelope.id, resource = %resource, "Dropping envelope without composite key"),
            }
        }
        map
    }
}

/// `displayName` of a resolved entity
pub fn display_name(body: &Value) -> Option<String> {
    body.get("displayName")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers every item from a fixed table and records calls
    struct TableTransport {
        bodies: HashMap<String, Value>,
        fail: bool,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl TableTransport {
        fn new(bodies: Vec<(&str, Value)>) -> Self {
            Self {
                bodies: bodies.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GraphTransport for TableTransport {
        async fn request(&self, _endpoint: &str, _params: crate::graph::QueryParams<'_>) -> Result<Value, GraphError> {
            Ok(json!({"value": []}))
        }

        async fn batch_request(
            &self,
            items: &[BatchItem],
            _url: &str,
            extra_url: &str,
            _method: Method,
        ) -> Result<Vec<BatchEnvelope>, GraphError> {
            self.calls
                .lock()
                .unwrap()
                .push(items.iter().map(|i| i.id.clone()).collect());
            if self.fail {
                return Err(GraphError::Network("down".into()));
            }
            // Reverse order: correlation must not depend on position
            Ok(items
                .iter()
                .rev()
                .map(|item| {
                    let id = format!("{}{}", item.id, extra_url);
                    match self.bodies.get(&id) {
                        Some(body) => BatchEnvelope::ok(id, body.clone()),
                        None => BatchEnvelope::new(id, 404, None),
                    }
                })
                .collect())
        }
    }

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_empty_input_issues_no_call() {
        let transport = TableTransport::new(vec![]);
        let resolver = BatchResolver::new(&transport);

        let map = resolver.resolve_entities(&BTreeSet::new(), "/beta/x", "").await;
        assert!(map.is_empty());
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_call_per_stage() {
        let transport = TableTransport::new(vec![
            ("a", json!({"id": "a", "displayName": "A"})),
            ("b", json!({"id": "b", "displayName": "B"})),
        ]);
        let resolver = BatchResolver::new(&transport);

        let names = resolver
            .resolve_display_names(&ids(&["b", "a", "c"]), "/beta/groups", "")
            .await;

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["a", "b", "c"]);
        assert_eq!(names.get("a").map(String::as_str), Some("A"));
        assert_eq!(names.get("b").map(String::as_str), Some("B"));
        assert!(!names.contains_key("c"));
    }

    #[tokio::test]
    async fn test_children_keyed_by_parent() {
        let transport = TableTransport::new(vec![
            ("p1/roleAssignments", json!({"value": [{"id": "ra1"}]})),
            ("p2/roleAssignments", json!({"value": []})),
        ]);
        let resolver = BatchResolver::new(&transport);

        let map = resolver
            .resolve_children(&ids(&["p1", "p2"]), "/beta/deviceManagement/roleDefinitions", "/roleAssignments")
            .await;

        assert_eq!(map.len(), 1);
        assert_eq!(map["p1"], vec![json!({"id": "ra1"})]);
    }

    #[tokio::test]
    async fn test_nested_keyed_by_composite() {
        let transport = TableTransport::new(vec![(
            "p1/definitionValues/d1/presentationValues",
            json!({"value": [{"id": "pv1"}]}),
        )]);
        let resolver = BatchResolver::new(&transport);

        let map = resolver
            .resolve_nested(
                &ids(&["p1/definitionValues/d1"]),
                "/beta/deviceManagement/groupPolicyConfigurations",
                "/presentationValues",
                "presentationValues",
            )
            .await;

        assert_eq!(map["p1/definitionValues/d1"], vec![json!({"id": "pv1"})]);
    }

    #[tokio::test]
    async fn test_transport_failure_degrades_to_empty() {
        let mut transport = TableTransport::new(vec![("a", json!({"id": "a"}))]);
        transport.fail = true;
        let resolver = BatchResolver::new(&transport);

        let map = resolver.resolve_entities(&ids(&["a"]), "/beta/x", "").await;
        assert!(map.is_empty());
    }
}
