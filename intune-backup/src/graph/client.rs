//! Graph API client (reqwest)
//!
//! # Behavior
//! - Bearer token authentication and standard User-Agent
//! - Relative endpoints (`/beta/...`) are resolved against the base URL,
//!   absolute URLs are used verbatim
//! - `request` follows `@odata.nextLink` and concatenates the `value` arrays
//! - `batch_request` posts to `<base>/<version>/$batch`, at most 20 sub-requests
//!   per POST (Graph limit); the split is invisible to callers, and a failed POST
//!   only drops its own sub-requests (the call fails only when every POST fails)
//! - Token-bucket rate limiting shared by every outbound call

use super::{BatchItem, GraphTransport, Method, QueryParams};
use crate::engine::envelope::BatchEnvelope;
use crate::error::GraphError;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for Graph API requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum sub-requests per `$batch` POST
pub const BATCH_LIMIT: usize = 20;

/// `$batch` response body
#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    responses: Vec<BatchEnvelope>,
}

/// Graph API client
pub struct GraphClient {
    /// HTTP client for API requests
    http_client: Client,
    /// Base URL without trailing slash
    base_url: String,
    /// Rate limiter shared by all requests
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl GraphClient {
    /// Create new client
    ///
    /// # Errors
    /// - `requests_per_second` is zero
    /// - token is not a valid header value
    /// - HTTP client cannot be built
    pub fn new(
        base_url: impl Into<String>,
        token: &str,
        requests_per_second: u32,
    ) -> Result<Self, GraphError> {
        let per_second = NonZeroU32::new(requests_per_second).ok_or_else(|| {
            GraphError::Config("requests_per_second must be greater than zero".to_string())
        })?;

        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|e| GraphError::Config(format!("Invalid token: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let http_client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(intune_common::config::get_user_agent())
            .default_headers(headers)
            .build()
            .map_err(|e| GraphError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    /// Resolve an endpoint against the base URL
    fn resolve_url(&self, endpoint: &str) -> String {
        resolve_url(&self.base_url, endpoint)
    }

    async fn get_json(&self, url: &str, params: QueryParams<'_>) -> Result<Value, GraphError> {
        self.rate_limiter.until_ready().await;

        debug!(url = %url, "Graph GET");
        let response = self.http_client.get(url).query(params).send().await?;
        read_json(response).await
    }

    async fn post_batch(&self, version: &str, requests: &[Value]) -> Result<Vec<BatchEnvelope>, GraphError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/{}/$batch", self.base_url, version);
        debug!(url = %url, requests = requests.len(), "Graph POST $batch");

        let response = self
            .http_client
            .post(&url)
            .json(&json!({ "requests": requests }))
            .send()
            .await?;
        let body = read_json(response).await?;
        let parsed: BatchResponse =
            serde_json::from_value(body).map_err(|e| GraphError::Parse(e.to_string()))?;
        Ok(parsed.responses)
    }
}

#[async_trait]
impl GraphTransport for GraphClient {
    async fn request(&self, endpoint: &str, params: QueryParams<'_>) -> Result<Value, GraphError> {
        let url = self.resolve_url(endpoint);
        let mut data = self.get_json(&url, params).await?;

        // Follow paging, folding every page's `value` into the first response
        let mut next = take_next_link(&mut data);
        while let Some(link) = next {
            let mut page = self.get_json(&link, &[]).await?;
            next = take_next_link(&mut page);
            if let (Some(Value::Array(all)), Some(Value::Array(more))) =
                (data.get_mut("value"), page.get_mut("value"))
            {
                all.append(more);
            }
        }

        Ok(data)
    }

    async fn batch_request(
        &self,
        items: &[BatchItem],
        url: &str,
        extra_url: &str,
        method: Method,
    ) -> Result<Vec<BatchEnvelope>, GraphError> {
        let relative = url.strip_prefix(&self.base_url).unwrap_or(url);
        let (version, path) = split_version(relative).ok_or_else(|| {
            GraphError::Config(format!("Batch URL has no API version segment: {}", url))
        })?;

        let requests = build_sub_requests(items, path, extra_url, &method);

        // A failed chunk only loses its own items
        let mut envelopes = Vec::with_capacity(items.len());
        let mut succeeded = 0usize;
        let mut last_error = None;
        for (chunk_items, chunk) in items.chunks(BATCH_LIMIT).zip(requests.chunks(BATCH_LIMIT)) {
            match self.post_batch(version, chunk).await {
                Ok(mut part) => {
                    succeeded += 1;
                    envelopes.append(&mut part);
                }
                Err(e) => {
                    let ids: Vec<&str> = chunk_items.iter().map(|item| item.id.as_str()).collect();
                    warn!(url = %url, extra_url = %extra_url, ids = ?ids, error = %e, "Batch chunk failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if succeeded == 0 => Err(e),
            _ => Ok(envelopes),
        }
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, GraphError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GraphError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

fn take_next_link(data: &mut Value) -> Option<String> {
    match data.as_object_mut()?.remove("@odata.nextLink")? {
        Value::String(link) => Some(link),
        _ => None,
    }
}

fn resolve_url(base_url: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("{}/{}", base_url, endpoint.trim_start_matches('/'))
    }
}

/// Split `/beta/deviceManagement/x` into `("beta", "deviceManagement/x")`
fn split_version(url: &str) -> Option<(&str, &str)> {
    let (version, path) = url.trim_start_matches('/').split_once('/')?;
    if version.is_empty() || path.is_empty() {
        return None;
    }
    Some((version, path.trim_end_matches('/')))
}

fn build_sub_requests(items: &[BatchItem], path: &str, extra_url: &str, method: &Method) -> Vec<Value> {
    items
        .iter()
        .map(|item| {
            json!({
                "id": format!("{}{}", item.id, extra_url),
                "method": method.as_str(),
                "url": format!("/{}/{}{}", path, item.id, extra_url),
            })
        })
        .collect()
}
