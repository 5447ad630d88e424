//! Persisted entity types.

use serde::{Deserialize, Serialize};

use dirindex_core::{BondAmount, ContractType, ProviderStatus};

/// A registered provider, unique per (pubkey, chain).
///
/// Created on the first bond event for an unseen pair; mutated by bond and
/// mod events; never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: i64,
    pub pubkey: String,
    pub chain: String,
    /// DECIMAL in the store; arbitrary precision end to end.
    pub bond: BondAmount,
    pub metadata_uri: String,
    pub metadata_nonce: u64,
    pub status: ProviderStatus,
    pub min_contract_duration: i64,
    pub max_contract_duration: i64,
    pub subscription_rate: i64,
    pub pay_as_you_go_rate: i64,
}

impl Provider {
    /// A freshly bonded provider with everything else at its defaults.
    pub fn new(pubkey: impl Into<String>, chain: impl Into<String>, bond: BondAmount) -> Self {
        Self {
            id: 0,
            pubkey: pubkey.into(),
            chain: chain.into(),
            bond,
            metadata_uri: String::new(),
            metadata_nonce: 0,
            status: ProviderStatus::Offline,
            min_contract_duration: 0,
            max_contract_duration: 0,
            subscription_rate: 0,
            pay_as_you_go_rate: 0,
        }
    }
}

/// The current contract a delegate holds with a provider, unique per
/// (provider_id, delegate_pubkey). Overwritten by each open-contract event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: i64,
    pub provider_id: i64,
    pub delegate_pubkey: String,
    pub client_pubkey: String,
    pub contract_type: ContractType,
    pub duration: i64,
    pub rate: i64,
    pub open_cost: i64,
    /// Height of the opening event.
    pub height: u64,
}

/// One version of a provider's off-chain metadata document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub provider_id: i64,
    pub nonce: u64,
    pub document: serde_json::Value,
    /// Unix timestamp of when this version was stored.
    pub created_at: i64,
}

/// The indexer's resume point: last block height known fully processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Indexer instance identifier.
    pub id: String,
    pub height: u64,
    /// Unix timestamp of the last save.
    pub updated_at: i64,
}
