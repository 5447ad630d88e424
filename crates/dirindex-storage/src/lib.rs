//! dirindex-storage — the persistence gateway.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - [`sqlite`] — SQLite via `sqlx` (feature `sqlite`)
//!
//! # Idempotency contract
//!
//! The live subscription and the historical backfill can both deliver the
//! same underlying chain event, concurrently and in any order. Exactly-once
//! end state therefore rests entirely on this layer: every write is keyed by
//! a natural key or a transaction id, and re-applying a write must leave the
//! store unchanged. Event-log inserts are conflict-do-nothing on the tx id;
//! contract and checkpoint writes are upserts on their natural keys. No
//! operation spans more than one statement, and each backend acquires one
//! pooled connection per logical operation.

pub mod entities;
pub mod error;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;

pub use entities::{Checkpoint, Contract, Provider, ProviderMetadata};
pub use error::StoreError;
pub use memory::MemoryStore;

use dirindex_core::{
    BondProviderEvent, CloseContractEvent, ContractSettlementEvent, ModProviderEvent,
    OpenContractEvent,
};

/// The persistence gateway the handlers and coordinator write through.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    // ── Providers ──────────────────────────────────────────────────────────

    async fn find_provider(
        &self,
        pubkey: &str,
        chain: &str,
    ) -> Result<Option<Provider>, StoreError>;

    /// Insert a new provider; returns its assigned id.
    async fn insert_provider(&self, provider: &Provider) -> Result<i64, StoreError>;

    /// Overwrite the mutable fields of an existing provider.
    async fn update_provider(&self, provider: &Provider) -> Result<(), StoreError>;

    // ── Contracts ──────────────────────────────────────────────────────────

    async fn find_contract(
        &self,
        provider_id: i64,
        delegate_pubkey: &str,
    ) -> Result<Option<Contract>, StoreError>;

    /// Locate a contract through the provider's natural key.
    async fn find_contract_by_keys(
        &self,
        chain: &str,
        provider_pubkey: &str,
        delegate_pubkey: &str,
    ) -> Result<Option<Contract>, StoreError>;

    /// Create or overwrite the contract row for
    /// (provider_id, event.delegate_pubkey); returns the contract id.
    async fn upsert_contract(
        &self,
        provider_id: i64,
        event: &OpenContractEvent,
    ) -> Result<i64, StoreError>;

    // ── Event log rows (idempotent by tx id) ───────────────────────────────

    async fn insert_bond_provider_event(
        &self,
        provider_id: i64,
        event: &BondProviderEvent,
    ) -> Result<(), StoreError>;

    async fn insert_mod_provider_event(
        &self,
        provider_id: i64,
        event: &ModProviderEvent,
    ) -> Result<(), StoreError>;

    async fn upsert_open_contract_event(
        &self,
        contract_id: i64,
        event: &OpenContractEvent,
    ) -> Result<(), StoreError>;

    async fn upsert_close_contract_event(
        &self,
        contract_id: i64,
        event: &CloseContractEvent,
    ) -> Result<(), StoreError>;

    async fn upsert_settlement_event(
        &self,
        contract_id: i64,
        event: &ContractSettlementEvent,
    ) -> Result<(), StoreError>;

    // ── Provider metadata ──────────────────────────────────────────────────

    /// Store one version of a provider's metadata document, keyed by
    /// (provider_id, nonce); replays are no-ops.
    async fn upsert_provider_metadata(
        &self,
        provider_id: i64,
        nonce: u64,
        document: &serde_json::Value,
    ) -> Result<(), StoreError>;

    // ── Checkpoint ─────────────────────────────────────────────────────────

    async fn find_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>, StoreError>;

    async fn upsert_checkpoint(&self, id: &str, height: u64) -> Result<(), StoreError>;
}
