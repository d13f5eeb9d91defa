//! Minimal JSON-RPC 2.0 client over HTTP, shared by the wallet service and
//! platform gateway adapters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::RpcError;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RemoteError>,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    code: i64,
    message: String,
}

pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self { http, url: url.into(), next_id: AtomicU64::new(1) })
    }

    pub fn url(&self) -> &str { &self.url }

    /// Call `method` and decode the `result` field into `T`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        tracing::trace!(method, id, "rpc request");

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RpcError::Status(response.status().as_u16()));
        }

        let reply: RpcResponse = response.json().await.map_err(|e| RpcError::Decode(e.to_string()))?;
        decode_reply(reply)
    }
}

fn decode_reply<T: DeserializeOwned>(reply: RpcResponse) -> Result<T, RpcError> {
    if let Some(err) = reply.error {
        return Err(RpcError::Remote { code: err.code, message: err.message });
    }
    serde_json::from_value(reply.result.unwrap_or(Value::Null)).map_err(|e| RpcError::Decode(e.to_string()))
}
