//! HTTP JSON-RPC pull client.
//!
//! Covers the three pull calls the indexer needs — fetch a block by height,
//! fetch the latest block, and fetch a committed transaction with its
//! events. Transient failures are retried a bounded number of times with a
//! fixed delay; exhausting the bound returns the error to the caller.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::RpcError;
use crate::retry::RetryPolicy;
use crate::types::{JsonRpcRequest, JsonRpcResponse, ResultBlock, ResultTx};

/// JSON-RPC client for the node's HTTP endpoint.
pub struct NodeClient {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    req_id: AtomicU64,
}

impl NodeClient {
    /// Create a new client for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            retry,
            req_id: AtomicU64::new(1),
        }
    }

    /// Create with the default retry policy.
    pub fn default_for(url: impl Into<String>) -> Self {
        Self::new(url, RetryPolicy::default())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the block at `height`.
    pub async fn fetch_block(&self, height: u64) -> Result<ResultBlock, RpcError> {
        self.call("block", json!({ "height": height.to_string() })).await
    }

    /// Fetch the chain's latest block.
    pub async fn fetch_latest_block(&self) -> Result<ResultBlock, RpcError> {
        self.call("block", json!({})).await
    }

    /// Fetch a committed transaction (and its emitted events) by hash.
    pub async fn fetch_tx(&self, hash: &str) -> Result<ResultTx, RpcError> {
        self.call("tx", json!({ "hash": hash })).await
    }

    /// Call `method` with `params`, retrying transient failures, and
    /// deserialize the result.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let req = JsonRpcRequest::new(
            self.req_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        );

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&req).await {
                Ok(result) => {
                    return serde_json::from_value(result).map_err(RpcError::Deserialization);
                }
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis(),
                            method,
                            error = %e,
                            "retrying pull call"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(attempt, method, error = %e, "pull call retries exhausted");
                        return Err(RpcError::RetriesExhausted {
                            attempts: attempt,
                            last: e.to_string(),
                        });
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<Value, RpcError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::Http(format!("HTTP {status}: {body}")));
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?
            .into_result()
    }
}
