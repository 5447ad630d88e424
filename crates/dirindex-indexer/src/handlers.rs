//! Domain handlers — one per event kind.
//!
//! Every handler is read-lookup-then-write through the persistence gateway.
//! None uses a multi-statement transaction: correctness under the
//! overlapping live/historical delivery rests entirely on the store's
//! idempotent, uniquely-keyed writes.

use std::sync::Arc;

use tracing::{debug, info, warn};

use dirindex_core::{
    BondProviderEvent, CloseContractEvent, ContractSettlementEvent, ModProviderEvent,
    OpenContractEvent, TypedEvent, ValidatorPayoutEvent,
};
use dirindex_storage::{DirectoryStore, Provider};

use crate::error::IndexError;
use crate::metadata::MetadataSource;

/// Applies typed events to the directory store.
pub struct EventIndexer {
    store: Arc<dyn DirectoryStore>,
    metadata: Option<Arc<dyn MetadataSource>>,
}

impl EventIndexer {
    pub fn new(store: Arc<dyn DirectoryStore>, metadata: Option<Arc<dyn MetadataSource>>) -> Self {
        Self { store, metadata }
    }

    /// Dispatch a typed event to its handler.
    pub async fn handle(&self, event: &TypedEvent) -> Result<(), IndexError> {
        match event {
            TypedEvent::BondProvider(e) => self.handle_bond_provider(e).await,
            TypedEvent::ModProvider(e) => self.handle_mod_provider(e).await,
            TypedEvent::OpenContract(e) => self.handle_open_contract(e).await,
            TypedEvent::CloseContract(e) => self.handle_close_contract(e).await,
            TypedEvent::ContractSettlement(e) => self.handle_contract_settlement(e).await,
            TypedEvent::ValidatorPayout(e) => self.handle_validator_payout(e).await,
        }
    }

    /// Create the provider on first sight; otherwise overwrite the bond only
    /// when the event carries an absolute amount. Always appends the event
    /// row (idempotent by tx id).
    async fn handle_bond_provider(&self, event: &BondProviderEvent) -> Result<(), IndexError> {
        let provider_id = match self.store.find_provider(&event.pubkey, &event.chain).await? {
            None => {
                let Some(bond) = event.bond_absolute.clone() else {
                    return Err(IndexError::MissingBondAmount {
                        pubkey: event.pubkey.clone(),
                        chain: event.chain.clone(),
                    });
                };
                let id = self
                    .store
                    .insert_provider(&Provider::new(&event.pubkey, &event.chain, bond))
                    .await?;
                debug!(id, pubkey = %event.pubkey, chain = %event.chain, "inserted provider");
                id
            }
            Some(mut provider) => {
                if let Some(bond) = &event.bond_absolute {
                    provider.bond = bond.clone();
                }
                self.store.update_provider(&provider).await?;
                provider.id
            }
        };

        debug!(pubkey = %event.pubkey, chain = %event.chain, "handled bond provider event");
        self.store.insert_bond_provider_event(provider_id, event).await?;
        Ok(())
    }

    /// Overwrites the provider's mutable fields unconditionally with the
    /// event's values. No ordering check against the previously recorded
    /// height: an out-of-order historical delivery can regress state.
    async fn handle_mod_provider(&self, event: &ModProviderEvent) -> Result<(), IndexError> {
        let Some(mut provider) = self.store.find_provider(&event.pubkey, &event.chain).await?
        else {
            return Err(IndexError::ProviderNotFound {
                pubkey: event.pubkey.clone(),
                chain: event.chain.clone(),
            });
        };

        let nonce_changed = provider.metadata_nonce != event.metadata_nonce;

        provider.metadata_uri = event.metadata_uri.clone();
        provider.metadata_nonce = event.metadata_nonce;
        provider.status = event.status;
        provider.min_contract_duration = event.min_contract_duration;
        provider.max_contract_duration = event.max_contract_duration;
        provider.subscription_rate = event.subscription_rate;
        provider.pay_as_you_go_rate = event.pay_as_you_go_rate;

        self.store.update_provider(&provider).await?;
        info!(pubkey = %provider.pubkey, chain = %provider.chain, "updated provider");
        self.store.insert_mod_provider_event(provider.id, event).await?;

        if nonce_changed {
            if let Some(fetcher) = &self.metadata {
                match fetcher.fetch(&event.metadata_uri).await {
                    Ok(document) => {
                        self.store
                            .upsert_provider_metadata(provider.id, event.metadata_nonce, &document)
                            .await?;
                    }
                    Err(e) => {
                        // Fetch failure does not fail the handler; a later
                        // mod event will bump the nonce and retry.
                        warn!(
                            pubkey = %provider.pubkey,
                            uri = %event.metadata_uri,
                            nonce = event.metadata_nonce,
                            error = %e,
                            "provider metadata fetch failed"
                        );
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_open_contract(&self, event: &OpenContractEvent) -> Result<(), IndexError> {
        let Some(provider) = self
            .store
            .find_provider(&event.provider_pubkey, &event.chain)
            .await?
        else {
            return Err(IndexError::ProviderNotFound {
                pubkey: event.provider_pubkey.clone(),
                chain: event.chain.clone(),
            });
        };

        let contract_id = self.store.upsert_contract(provider.id, event).await?;
        self.store.upsert_open_contract_event(contract_id, event).await?;

        info!(contract_id, "contract update finished");
        Ok(())
    }

    async fn handle_close_contract(&self, event: &CloseContractEvent) -> Result<(), IndexError> {
        let Some(contract) = self
            .store
            .find_contract_by_keys(&event.chain, &event.provider_pubkey, &event.delegate_pubkey)
            .await?
        else {
            return Err(IndexError::ContractNotFound {
                chain: event.chain.clone(),
                provider_pubkey: event.provider_pubkey.clone(),
                delegate_pubkey: event.delegate_pubkey.clone(),
            });
        };

        self.store.upsert_close_contract_event(contract.id, event).await?;
        Ok(())
    }

    async fn handle_contract_settlement(
        &self,
        event: &ContractSettlementEvent,
    ) -> Result<(), IndexError> {
        if self
            .store
            .find_provider(&event.provider_pubkey, &event.chain)
            .await?
            .is_none()
        {
            return Err(IndexError::ProviderNotFound {
                pubkey: event.provider_pubkey.clone(),
                chain: event.chain.clone(),
            });
        }

        let Some(contract) = self
            .store
            .find_contract_by_keys(&event.chain, &event.provider_pubkey, &event.delegate_pubkey)
            .await?
        else {
            return Err(IndexError::ContractNotFound {
                chain: event.chain.clone(),
                provider_pubkey: event.provider_pubkey.clone(),
                delegate_pubkey: event.delegate_pubkey.clone(),
            });
        };

        self.store.upsert_settlement_event(contract.id, event).await?;
        Ok(())
    }

    async fn handle_validator_payout(
        &self,
        _event: &ValidatorPayoutEvent,
    ) -> Result<(), IndexError> {
        Err(IndexError::NotImplemented { kind: "validator_payout" })
    }
}
