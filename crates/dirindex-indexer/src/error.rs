//! Error types for the indexing pipeline.

use thiserror::Error;

use dirindex_core::DecodeError;
use dirindex_rpc::RpcError;
use dirindex_storage::StoreError;

/// Errors that can occur while indexing.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// An event referenced a provider the store does not know.
    #[error("no provider {pubkey} for chain {chain}")]
    ProviderNotFound { pubkey: String, chain: String },

    /// A close/settlement event referenced a contract the store does not know.
    #[error("no contract for chain {chain} provider {provider_pubkey} delegate {delegate_pubkey}")]
    ContractNotFound {
        chain: String,
        provider_pubkey: String,
        delegate_pubkey: String,
    },

    /// A bond event for an unseen provider carried no absolute amount.
    #[error("bond event for unseen provider {pubkey} chain {chain} has no absolute amount")]
    MissingBondAmount { pubkey: String, chain: String },

    /// Off-chain metadata fetch failed (never escapes the mod handler).
    #[error("metadata fetch failed: {0}")]
    Metadata(String),

    #[error("{kind} handling not implemented")]
    NotImplemented { kind: &'static str },

    /// A supervised loop terminated unexpectedly.
    #[error("indexer aborted: {reason}")]
    Aborted { reason: String },
}

impl IndexError {
    /// Returns `true` if the event should be dropped and logged rather than
    /// surfaced: a protocol/ordering violation or an unimplemented kind, as
    /// opposed to an infrastructure failure.
    pub fn is_discardable(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::ProviderNotFound { .. }
                | Self::ContractNotFound { .. }
                | Self::MissingBondAmount { .. }
                | Self::NotImplemented { .. }
        )
    }
}
