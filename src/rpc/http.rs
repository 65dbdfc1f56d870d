// HTTP - JSON-RPC over HTTP POST, used to probe node readiness

use super::types::{Health, JsonRpcRequest, JsonRpcResponse};
use super::RpcError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Short-lived HTTP JSON-RPC client for one node
pub struct HttpClient {
    url: String,
    client: Client,
    request_id: AtomicU64,
}

impl HttpClient {
    /// Create new HTTP client with a per-request timeout
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        Ok(Self {
            url: url.to_string(),
            client,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Make a JSON-RPC call
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<T, RpcError> {
        let request = JsonRpcRequest::new(self.next_id(), method, params);

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("Network error: {}", e)))?;

        if !response.status().is_success() {
            return Err(RpcError::Transport(format!("HTTP error: {}", response.status())));
        }

        let json_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Parse(e.to_string()))?;

        let value = json_response.into_result().map_err(RpcError::Call)?;
        serde_json::from_value(value).map_err(|e| RpcError::Parse(format!("{} result: {}", method, e)))
    }

    /// `system_health`
    pub async fn health(&self) -> Result<Health, RpcError> {
        self.call("system_health", serde_json::json!([])).await
    }
}
