//! Wire-type mirrors of the node's JSON-RPC responses.
//!
//! These stay as close to the node's JSON as serde allows — the adapter does
//! no parsing beyond what the protocol already structures. Heights arrive as
//! decimal strings and are surfaced through typed accessors.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::error::RpcError;

// ─── ABCI events ──────────────────────────────────────────────────────────────

/// One key/value attribute of an ABCI event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

/// An ABCI event emitted by a transaction or at end-of-block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbciEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl AbciEvent {
    /// The attribute list as plain pairs, for the normalizer.
    pub fn attribute_pairs(&self) -> Vec<(String, String)> {
        self.attributes
            .iter()
            .map(|a| (a.key.clone(), a.value.clone()))
            .collect()
    }
}

// ─── Blocks ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    pub chain_id: String,
    /// Decimal string on the wire.
    pub height: String,
    #[serde(default)]
    pub time: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockData {
    /// Raw transactions, base64-encoded.
    #[serde(default)]
    pub txs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(default)]
    pub data: BlockData,
}

/// Result of the `block` RPC call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultBlock {
    pub block: Block,
}

impl ResultBlock {
    pub fn height(&self) -> u64 {
        self.block.header.height.parse().unwrap_or(0)
    }

    /// Transaction ids for every tx in the block: upper-case hex SHA-256 of
    /// the raw (base64-decoded) transaction bytes, per CometBFT convention.
    pub fn tx_hashes(&self) -> Result<Vec<String>, RpcError> {
        self.block
            .data
            .txs
            .iter()
            .map(|tx| tx_hash(tx))
            .collect()
    }
}

/// Derive a transaction id from its base64-encoded bytes.
pub fn tx_hash(tx_base64: &str) -> Result<String, RpcError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(tx_base64)
        .map_err(|e| RpcError::InvalidTx(e.to_string()))?;
    Ok(hex::encode_upper(Sha256::digest(&bytes)))
}

// ─── Transactions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxResponse {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub events: Vec<AbciEvent>,
}

/// Result of the `tx` RPC call: a committed transaction with the ABCI
/// events it emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultTx {
    pub hash: String,
    /// Decimal string on the wire.
    pub height: String,
    pub tx_result: TxResponse,
}

impl ResultTx {
    pub fn height_u64(&self) -> u64 {
        self.height.parse().unwrap_or(0)
    }
}

// ─── Subscriptions ────────────────────────────────────────────────────────────

/// One notification delivered on a WebSocket subscription.
///
/// `events` is the node's multi-valued attribute map
/// (`"<eventKind>.<field>"` → values); `data` carries the full typed payload
/// (e.g. the block for a new-block notification).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub events: HashMap<String, Vec<String>>,
}

impl SubscriptionEvent {
    /// Block height of a new-block notification, if present in the payload.
    pub fn new_block_height(&self) -> Option<u64> {
        self.data
            .pointer("/value/block/header/height")?
            .as_str()?
            .parse()
            .ok()
    }
}

// ─── JSON-RPC envelope ────────────────────────────────────────────────────────

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Unwrap the result value or surface the node's error.
    pub fn into_result(self) -> Result<Value, RpcError> {
        if let Some(err) = self.error {
            return Err(RpcError::Rpc { code: err.code, message: err.message });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_hash_is_upper_sha256() {
        // base64("hello") = "aGVsbG8="
        let hash = tx_hash("aGVsbG8=").unwrap();
        assert_eq!(
            hash,
            "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824"
        );
    }

    #[test]
    fn tx_hash_rejects_bad_base64() {
        assert!(matches!(tx_hash("!!!"), Err(RpcError::InvalidTx(_))));
    }

    #[test]
    fn result_block_deserializes() {
        let json = serde_json::json!({
            "block": {
                "header": { "chain_id": "directory-1", "height": "1234", "time": "2024-05-01T00:00:00Z" },
                "data": { "txs": ["aGVsbG8="] }
            }
        });
        let block: ResultBlock = serde_json::from_value(json).unwrap();
        assert_eq!(block.height(), 1234);
        assert_eq!(block.tx_hashes().unwrap().len(), 1);
    }

    #[test]
    fn result_tx_deserializes_events() {
        let json = serde_json::json!({
            "hash": "ABCD",
            "height": "77",
            "tx_result": {
                "code": 0,
                "events": [
                    { "type": "provider_bond", "attributes": [
                        { "key": "pubkey", "value": "abc" },
                        { "key": "chain", "value": "btc-mainnet" }
                    ]}
                ]
            }
        });
        let tx: ResultTx = serde_json::from_value(json).unwrap();
        assert_eq!(tx.height_u64(), 77);
        assert_eq!(tx.tx_result.events[0].kind, "provider_bond");
        assert_eq!(
            tx.tx_result.events[0].attribute_pairs(),
            vec![
                ("pubkey".to_string(), "abc".to_string()),
                ("chain".to_string(), "btc-mainnet".to_string())
            ]
        );
    }

    #[test]
    fn subscription_event_block_height() {
        let evt = SubscriptionEvent {
            query: "tm.event = 'NewBlock'".into(),
            data: serde_json::json!({
                "type": "tendermint/event/NewBlock",
                "value": { "block": { "header": { "height": "42" } } }
            }),
            events: HashMap::new(),
        };
        assert_eq!(evt.new_block_height(), Some(42));
    }

    #[test]
    fn json_rpc_response_error_surfaces() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 1,
            result: None,
            error: Some(JsonRpcError { code: -32603, message: "internal".into(), data: None }),
        };
        assert!(matches!(resp.into_result(), Err(RpcError::Rpc { code: -32603, .. })));
    }
}
