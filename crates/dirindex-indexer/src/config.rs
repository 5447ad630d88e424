//! Indexer configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use dirindex_rpc::RetryPolicy;

/// Tunables for one indexer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Unique name for this indexer (used as the checkpoint key).
    #[serde(default = "default_id")]
    pub id: String,
    /// HTTP JSON-RPC endpoint for pull calls.
    pub rpc_url: String,
    /// WebSocket endpoint for subscriptions.
    pub ws_url: String,
    /// Blocks to rewind below the checkpoint on startup, tolerating an
    /// unclean prior shutdown.
    #[serde(default = "default_rollback_margin")]
    pub rollback_margin: u64,
    /// How often historical replay persists the checkpoint (every N blocks).
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
    /// Tip polling interval once caught up (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum retries for transient pull-call failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between pull-call retries (milliseconds).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Maximum retries for the off-chain metadata fetch.
    #[serde(default = "default_metadata_retries")]
    pub metadata_retries: u32,
    /// Size cap for a metadata document (bytes).
    #[serde(default = "default_metadata_max_bytes")]
    pub metadata_max_bytes: usize,
}

fn default_id() -> String { "dirindex".into() }
fn default_rollback_margin() -> u64 { 50 }
fn default_checkpoint_interval() -> u64 { 500 }
fn default_poll_interval_ms() -> u64 { 2_000 }
fn default_max_retries() -> u32 { 10 }
fn default_retry_delay_ms() -> u64 { 1_000 }
fn default_metadata_retries() -> u32 { 3 }
fn default_metadata_max_bytes() -> usize { 262_144 }

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            rpc_url: "http://localhost:26657".into(),
            ws_url: "ws://localhost:26657/websocket".into(),
            rollback_margin: default_rollback_margin(),
            checkpoint_interval: default_checkpoint_interval(),
            poll_interval_ms: default_poll_interval_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            metadata_retries: default_metadata_retries(),
            metadata_max_bytes: default_metadata_max_bytes(),
        }
    }
}

impl IndexerConfig {
    /// The pull-call retry policy this configuration implies.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
