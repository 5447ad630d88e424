//! In-memory storage backend.
//!
//! Implements the same idempotent-write contract as the durable backends.
//! Useful for tests and short-lived runs; everything is lost on exit.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use dirindex_core::{
    BondProviderEvent, CloseContractEvent, ContractSettlementEvent, ModProviderEvent,
    OpenContractEvent,
};

use crate::entities::{Checkpoint, Contract, Provider, ProviderMetadata};
use crate::error::StoreError;
use crate::DirectoryStore;

#[derive(Default)]
struct Inner {
    next_id: i64,
    /// (pubkey, chain) → provider
    providers: HashMap<(String, String), Provider>,
    /// (provider_id, delegate_pubkey) → contract
    contracts: HashMap<(i64, String), Contract>,
    bond_events: HashMap<String, (i64, BondProviderEvent)>,
    mod_events: HashMap<String, (i64, ModProviderEvent)>,
    open_events: HashMap<String, (i64, OpenContractEvent)>,
    close_events: HashMap<String, (i64, CloseContractEvent)>,
    settlement_events: HashMap<String, (i64, ContractSettlementEvent)>,
    /// (provider_id, nonce) → metadata version
    metadata: HashMap<(i64, u64), ProviderMetadata>,
    checkpoints: HashMap<String, Checkpoint>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory directory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Test/introspection helpers ─────────────────────────────────────────

    pub fn provider_count(&self) -> usize {
        self.inner.lock().unwrap().providers.len()
    }

    pub fn contract_count(&self) -> usize {
        self.inner.lock().unwrap().contracts.len()
    }

    pub fn bond_event_count(&self) -> usize {
        self.inner.lock().unwrap().bond_events.len()
    }

    pub fn mod_event_count(&self) -> usize {
        self.inner.lock().unwrap().mod_events.len()
    }

    pub fn open_event_count(&self) -> usize {
        self.inner.lock().unwrap().open_events.len()
    }

    pub fn close_event_count(&self) -> usize {
        self.inner.lock().unwrap().close_events.len()
    }

    pub fn settlement_event_count(&self) -> usize {
        self.inner.lock().unwrap().settlement_events.len()
    }

    pub fn metadata_count(&self) -> usize {
        self.inner.lock().unwrap().metadata.len()
    }

    pub fn metadata_for(&self, provider_id: i64, nonce: u64) -> Option<ProviderMetadata> {
        self.inner.lock().unwrap().metadata.get(&(provider_id, nonce)).cloned()
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn find_provider(
        &self,
        pubkey: &str,
        chain: &str,
    ) -> Result<Option<Provider>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.providers.get(&(pubkey.to_string(), chain.to_string())).cloned())
    }

    async fn insert_provider(&self, provider: &Provider) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (provider.pubkey.clone(), provider.chain.clone());
        if let Some(existing) = inner.providers.get(&key) {
            // Unique (pubkey, chain): re-insert returns the existing row.
            return Ok(existing.id);
        }
        let id = inner.next_id();
        let mut row = provider.clone();
        row.id = id;
        inner.providers.insert(key, row);
        Ok(id)
    }

    async fn update_provider(&self, provider: &Provider) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (provider.pubkey.clone(), provider.chain.clone());
        match inner.providers.get_mut(&key) {
            Some(row) => {
                let id = row.id;
                *row = provider.clone();
                row.id = id;
                Ok(())
            }
            None => Err(StoreError::Database(format!(
                "no provider {} {}",
                provider.pubkey, provider.chain
            ))),
        }
    }

    async fn find_contract(
        &self,
        provider_id: i64,
        delegate_pubkey: &str,
    ) -> Result<Option<Contract>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.contracts.get(&(provider_id, delegate_pubkey.to_string())).cloned())
    }

    async fn find_contract_by_keys(
        &self,
        chain: &str,
        provider_pubkey: &str,
        delegate_pubkey: &str,
    ) -> Result<Option<Contract>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let Some(provider) = inner
            .providers
            .get(&(provider_pubkey.to_string(), chain.to_string()))
        else {
            return Ok(None);
        };
        Ok(inner.contracts.get(&(provider.id, delegate_pubkey.to_string())).cloned())
    }

    async fn upsert_contract(
        &self,
        provider_id: i64,
        event: &OpenContractEvent,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (provider_id, event.delegate_pubkey.clone());
        if let Some(row) = inner.contracts.get_mut(&key) {
            row.client_pubkey = event.client_pubkey.clone();
            row.contract_type = event.contract_type;
            row.duration = event.duration;
            row.rate = event.rate;
            row.open_cost = event.open_cost;
            row.height = event.height;
            return Ok(row.id);
        }
        let id = inner.next_id();
        inner.contracts.insert(
            key,
            Contract {
                id,
                provider_id,
                delegate_pubkey: event.delegate_pubkey.clone(),
                client_pubkey: event.client_pubkey.clone(),
                contract_type: event.contract_type,
                duration: event.duration,
                rate: event.rate,
                open_cost: event.open_cost,
                height: event.height,
            },
        );
        Ok(id)
    }

    async fn insert_bond_provider_event(
        &self,
        provider_id: i64,
        event: &BondProviderEvent,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .bond_events
            .entry(event.tx_id.clone())
            .or_insert_with(|| (provider_id, event.clone()));
        Ok(())
    }

    async fn insert_mod_provider_event(
        &self,
        provider_id: i64,
        event: &ModProviderEvent,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .mod_events
            .entry(event.tx_id.clone())
            .or_insert_with(|| (provider_id, event.clone()));
        Ok(())
    }

    async fn upsert_open_contract_event(
        &self,
        contract_id: i64,
        event: &OpenContractEvent,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .open_events
            .entry(event.tx_id.clone())
            .or_insert_with(|| (contract_id, event.clone()));
        Ok(())
    }

    async fn upsert_close_contract_event(
        &self,
        contract_id: i64,
        event: &CloseContractEvent,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .close_events
            .entry(event.tx_id.clone())
            .or_insert_with(|| (contract_id, event.clone()));
        Ok(())
    }

    async fn upsert_settlement_event(
        &self,
        contract_id: i64,
        event: &ContractSettlementEvent,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .settlement_events
            .entry(event.tx_id.clone())
            .or_insert_with(|| (contract_id, event.clone()));
        Ok(())
    }

    async fn upsert_provider_metadata(
        &self,
        provider_id: i64,
        nonce: u64,
        document: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .metadata
            .entry((provider_id, nonce))
            .or_insert_with(|| ProviderMetadata {
                provider_id,
                nonce,
                document: document.clone(),
                created_at: chrono::Utc::now().timestamp(),
            });
        Ok(())
    }

    async fn find_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.checkpoints.get(id).cloned())
    }

    async fn upsert_checkpoint(&self, id: &str, height: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.checkpoints.insert(
            id.to_string(),
            Checkpoint {
                id: id.to_string(),
                height,
                updated_at: chrono::Utc::now().timestamp(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirindex_core::BondAmount;

    fn bond_event(tx_id: &str) -> BondProviderEvent {
        BondProviderEvent {
            pubkey: "abc".into(),
            chain: "btc-mainnet".into(),
            height: 10,
            tx_id: tx_id.into(),
            bond_relative: None,
            bond_absolute: Some(BondAmount::parse("500").unwrap()),
        }
    }

    #[tokio::test]
    async fn provider_insert_and_find() {
        let store = MemoryStore::new();
        let id = store
            .insert_provider(&Provider::new("abc", "btc-mainnet", BondAmount::parse("500").unwrap()))
            .await
            .unwrap();
        assert!(id > 0);

        let found = store.find_provider("abc", "btc-mainnet").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.bond.as_str(), "500");

        assert!(store.find_provider("abc", "eth-mainnet").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn provider_reinsert_returns_existing() {
        let store = MemoryStore::new();
        let p = Provider::new("abc", "btc-mainnet", BondAmount::parse("1").unwrap());
        let first = store.insert_provider(&p).await.unwrap();
        let second = store.insert_provider(&p).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.provider_count(), 1);
    }

    #[tokio::test]
    async fn bond_event_replay_is_single_row() {
        let store = MemoryStore::new();
        store.insert_bond_provider_event(1, &bond_event("TX1")).await.unwrap();
        store.insert_bond_provider_event(1, &bond_event("TX1")).await.unwrap();
        assert_eq!(store.bond_event_count(), 1);

        store.insert_bond_provider_event(1, &bond_event("TX2")).await.unwrap();
        assert_eq!(store.bond_event_count(), 2);
    }

    #[tokio::test]
    async fn contract_upsert_overwrites_in_place() {
        let store = MemoryStore::new();
        let mut evt = OpenContractEvent {
            provider_pubkey: "abc".into(),
            chain: "btc-mainnet".into(),
            delegate_pubkey: "dlg".into(),
            client_pubkey: "cli".into(),
            height: 5,
            tx_id: "TX1".into(),
            contract_type: dirindex_core::ContractType::PayAsYouGo,
            duration: 100,
            rate: 2,
            open_cost: 50,
        };
        let first = store.upsert_contract(7, &evt).await.unwrap();

        evt.duration = 250;
        evt.height = 9;
        let second = store.upsert_contract(7, &evt).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.contract_count(), 1);

        let row = store.find_contract(7, "dlg").await.unwrap().unwrap();
        assert_eq!(row.duration, 250);
        assert_eq!(row.height, 9);
    }

    #[tokio::test]
    async fn contract_lookup_by_provider_keys() {
        let store = MemoryStore::new();
        let provider_id = store
            .insert_provider(&Provider::new("abc", "btc-mainnet", BondAmount::parse("500").unwrap()))
            .await
            .unwrap();
        let evt = OpenContractEvent {
            provider_pubkey: "abc".into(),
            chain: "btc-mainnet".into(),
            delegate_pubkey: "dlg".into(),
            client_pubkey: "cli".into(),
            ..Default::default()
        };
        store.upsert_contract(provider_id, &evt).await.unwrap();

        let found = store
            .find_contract_by_keys("btc-mainnet", "abc", "dlg")
            .await
            .unwrap();
        assert!(found.is_some());

        let missing = store
            .find_contract_by_keys("btc-mainnet", "abc", "other")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn metadata_is_append_only_per_nonce() {
        let store = MemoryStore::new();
        let doc_v1 = serde_json::json!({"moniker": "first"});
        let doc_v2 = serde_json::json!({"moniker": "second"});

        store.upsert_provider_metadata(1, 1, &doc_v1).await.unwrap();
        store.upsert_provider_metadata(1, 1, &doc_v2).await.unwrap(); // replay: no-op
        store.upsert_provider_metadata(1, 2, &doc_v2).await.unwrap();

        assert_eq!(store.metadata_count(), 2);
        assert_eq!(store.metadata_for(1, 1).unwrap().document["moniker"], "first");
    }

    #[tokio::test]
    async fn checkpoint_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.find_checkpoint("idx").await.unwrap().is_none());

        store.upsert_checkpoint("idx", 1000).await.unwrap();
        store.upsert_checkpoint("idx", 1500).await.unwrap();

        let cp = store.find_checkpoint("idx").await.unwrap().unwrap();
        assert_eq!(cp.height, 1500);
    }
}
