//! Batch response envelope parsing
//!
//! Every sub-request in a batch is sent with id `{parentId}{extraUrl}`, where the
//! extra URL starts with `/`. The owning parent therefore sits in front of the
//! first `/` of the envelope id:
//!
//! ```text
//! p1/scheduledActionsForRule?$expand=scheduledActionConfigurations   -> p1
//! parentXYZ/definitionValues/childABC                                -> parentXYZ
//! ```
//!
//! An id without `/` has no correlation key and the envelope is skipped.

use serde::Deserialize;
use serde_json::Value;

/// One sub-response of a batch round-trip
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchEnvelope {
    /// Sub-request id echoed back by the API
    pub id: String,
    /// HTTP status of the sub-request
    #[serde(default = "default_status")]
    pub status: u16,
    /// Response body, absent for some failures
    #[serde(default)]
    pub body: Option<Value>,
}

fn default_status() -> u16 {
    200
}

impl BatchEnvelope {
    pub fn new(id: impl Into<String>, status: u16, body: Option<Value>) -> Self {
        Self {
            id: id.into(),
            status,
            body,
        }
    }

    /// Successful envelope with a body
    pub fn ok(id: impl Into<String>, body: Value) -> Self {
        Self::new(id, 200, Some(body))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Owning parent id, `None` when the id carries no `/`
    pub fn correlation_key(&self) -> Option<&str> {
        correlation_key(&self.id)
    }

    /// Composite key in front of `/{resource}`
    ///
    /// `p1/definitionValues/d1/presentationValues?$expand=presentation` with
    /// resource `presentationValues` gives `p1/definitionValues/d1`.
    pub fn key_before(&self, resource: &str) -> Option<&str> {
        let marker = format!("/{}", resource);
        self.id
            .find(&marker)
            .map(|pos| &self.id[..pos])
            .filter(|key| !key.is_empty())
    }

    /// Body of a successful, non-empty response
    pub fn body(&self) -> Option<&Value> {
        if !self.is_success() {
            return None;
        }
        match self.body.as_ref()? {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            Value::Array(items) if items.is_empty() => None,
            body => Some(body),
        }
    }

    /// Non-empty `body.value` list of a successful response
    pub fn values(&self) -> Option<&Vec<Value>> {
        self.body()?
            .get("value")?
            .as_array()
            .filter(|items| !items.is_empty())
    }

    /// Id of the entity in a by-id response
    ///
    /// Prefers the body's own `id`; otherwise the envelope id with the extra URL
    /// stripped (e.g. `$select` responses that omit `id`).
    pub fn entity_id(&self, extra_url: &str) -> Option<String> {
        if let Some(id) = self.body()?.get("id").and_then(Value::as_str) {
            return Some(id.to_string());
        }
        let id = self.id.strip_suffix(extra_url).unwrap_or(&self.id);
        (!id.is_empty()).then(|| id.to_string())
    }
}

/// Correlation key of a raw envelope id
pub fn correlation_key(id: &str) -> Option<&str> {
    let (parent, _) = id.split_once('/')?;
    (!parent.is_empty()).then_some(parent)
}
