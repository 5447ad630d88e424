//! Sync coordination — startup recovery, live consumption, historical
//! backfill.
//!
//! # Phases
//!
//! `ColdStart → RollingBack → CatchingUp → Synced`
//!
//! On startup the coordinator reads the persisted checkpoint, rewinds a
//! fixed safety margin, then runs two loops for the process lifetime:
//!
//! - the **live loop** holds one subscription per monitored topic and routes
//!   each notification through the shared handlers; on new-block
//!   notifications it persists the checkpoint — but only once `Synced`, so
//!   a height is never marked done ahead of historical replay;
//! - the **historical loop** replays every block from the resume height to
//!   the tip through the same handlers, persisting the checkpoint every
//!   `checkpoint_interval` blocks as a crash-recovery optimisation, then
//!   keeps following the tip to fill any gap the subscription drops.
//!
//! The two loops overlap by construction. There is no mutual exclusion
//! between them: the exactly-once end state rests entirely on the store's
//! idempotent writes.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use dirindex_core::events::{
    KIND_CLAIM_CONTRACT_INCOME, KIND_CLOSE_CONTRACT, KIND_OPEN_CONTRACT, KIND_PROVIDER_BOND,
    KIND_PROVIDER_MOD,
};
use dirindex_core::EventAttributes;
use dirindex_rpc::{RpcError, SubscriptionClient, SubscriptionEvent};
use dirindex_storage::DirectoryStore;

use crate::config::IndexerConfig;
use crate::error::IndexError;
use crate::router::EventRouter;
use crate::source::ChainSource;

// ─── Topic queries ────────────────────────────────────────────────────────────

/// Subscription queries, one logical stream per monitored topic.
pub mod queries {
    pub const NEW_BLOCK: &str = "tm.event = 'NewBlock'";
    pub const BOND_PROVIDER: &str =
        "tm.event = 'Tx' AND message.action = '/directory.v1.MsgBondProvider'";
    pub const MOD_PROVIDER: &str =
        "tm.event = 'Tx' AND message.action = '/directory.v1.MsgModProvider'";
    pub const OPEN_CONTRACT: &str =
        "tm.event = 'Tx' AND message.action = '/directory.v1.MsgOpenContract'";
    pub const CLOSE_CONTRACT: &str =
        "tm.event = 'Tx' AND message.action = '/directory.v1.MsgCloseContract'";
    pub const CLAIM_CONTRACT_INCOME: &str =
        "tm.event = 'Tx' AND message.action = '/directory.v1.MsgClaimContractIncome'";
}

// ─── Sync state ───────────────────────────────────────────────────────────────

/// Lifecycle state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncState {
    ColdStart = 0,
    RollingBack = 1,
    CatchingUp = 2,
    /// Terminal steady state, re-entered after restart.
    Synced = 3,
}

impl SyncState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::ColdStart,
            1 => Self::RollingBack,
            2 => Self::CatchingUp,
            _ => Self::Synced,
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ColdStart => write!(f, "cold-start"),
            Self::RollingBack => write!(f, "rolling-back"),
            Self::CatchingUp => write!(f, "catching-up"),
            Self::Synced => write!(f, "synced"),
        }
    }
}

/// Shared sync state between the two loops.
///
/// One authoritative writer per field — the historical loop owns the state
/// transition to `Synced`, both loops observe heights — with safe concurrent
/// reads from everywhere.
#[derive(Debug)]
pub struct SyncStatus {
    state: AtomicU8,
    last_height: AtomicU64,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SyncState::ColdStart as u8),
            last_height: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SyncState {
        SyncState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_synced(&self) -> bool {
        self.state() == SyncState::Synced
    }

    /// Highest block height either loop has seen.
    pub fn last_height(&self) -> u64 {
        self.last_height.load(Ordering::Acquire)
    }

    fn set_state(&self, state: SyncState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn observe_height(&self, height: u64) {
        self.last_height.fetch_max(height, Ordering::AcqRel);
    }
}

// ─── Live streams ─────────────────────────────────────────────────────────────

/// The per-topic subscription receivers the live loop fans in over.
pub struct LiveStreams {
    pub new_block: mpsc::UnboundedReceiver<SubscriptionEvent>,
    pub bond_provider: mpsc::UnboundedReceiver<SubscriptionEvent>,
    pub mod_provider: mpsc::UnboundedReceiver<SubscriptionEvent>,
    pub open_contract: mpsc::UnboundedReceiver<SubscriptionEvent>,
    pub close_contract: mpsc::UnboundedReceiver<SubscriptionEvent>,
    pub claim_income: mpsc::UnboundedReceiver<SubscriptionEvent>,
}

impl LiveStreams {
    /// Open every monitored topic on `client`.
    pub fn subscribe(client: &SubscriptionClient) -> Result<Self, RpcError> {
        Ok(Self {
            new_block: client.subscribe(queries::NEW_BLOCK)?,
            bond_provider: client.subscribe(queries::BOND_PROVIDER)?,
            mod_provider: client.subscribe(queries::MOD_PROVIDER)?,
            open_contract: client.subscribe(queries::OPEN_CONTRACT)?,
            close_contract: client.subscribe(queries::CLOSE_CONTRACT)?,
            claim_income: client.subscribe(queries::CLAIM_CONTRACT_INCOME)?,
        })
    }
}

// ─── Coordinator ──────────────────────────────────────────────────────────────

/// Owns the ingestion lifecycle: checkpoint recovery, the live and
/// historical loops, and the checkpoint persistence policy.
pub struct SyncCoordinator<S> {
    config: IndexerConfig,
    source: S,
    router: Arc<EventRouter>,
    store: Arc<dyn DirectoryStore>,
    status: Arc<SyncStatus>,
}

impl<S: ChainSource + 'static> SyncCoordinator<S> {
    pub fn new(
        config: IndexerConfig,
        source: S,
        router: Arc<EventRouter>,
        store: Arc<dyn DirectoryStore>,
    ) -> Self {
        Self {
            config,
            source,
            router,
            store,
            status: Arc::new(SyncStatus::new()),
        }
    }

    pub fn status(&self) -> Arc<SyncStatus> {
        Arc::clone(&self.status)
    }

    /// Resolve the height historical replay resumes from.
    ///
    /// No checkpoint: height 1. Otherwise `max(checkpoint − margin, 1)`,
    /// rewinding the safety margin to tolerate an unclean prior shutdown.
    pub async fn recover_start_height(&self) -> Result<u64, IndexError> {
        self.status.set_state(SyncState::ColdStart);
        let start = match self.store.find_checkpoint(&self.config.id).await? {
            None => 1,
            Some(checkpoint) => {
                self.status.set_state(SyncState::RollingBack);
                let start = checkpoint
                    .height
                    .saturating_sub(self.config.rollback_margin)
                    .max(1);
                info!(
                    checkpoint = checkpoint.height,
                    margin = self.config.rollback_margin,
                    start,
                    "recovered checkpoint"
                );
                start
            }
        };
        self.status.set_state(SyncState::CatchingUp);
        Ok(start)
    }

    /// Replay every block from the recovered start height up to the chain
    /// tip, re-sampling the tip until no gap remains, then transition to
    /// `Synced`. Returns the tip height reached.
    pub async fn catch_up(&self) -> Result<u64, IndexError> {
        let start = self.recover_start_height().await?;
        let mut tip = self.source.latest_height().await?;
        info!(
            tip,
            start,
            behind = tip.saturating_sub(start),
            "starting historical replay"
        );

        let mut next = start;
        let mut last_processed = None;
        let mut since_checkpoint = 0u64;
        let mut batch_clean = true;

        while next <= tip {
            self.process_block(next, &mut batch_clean).await?;
            self.status.observe_height(next);
            last_processed = Some(next);

            since_checkpoint += 1;
            if since_checkpoint >= self.config.checkpoint_interval {
                debug!(synced = next, target = tip, "replay progress");
                self.save_checkpoint_if(batch_clean, next).await;
                since_checkpoint = 0;
                batch_clean = true;
            }

            if next == tip {
                // New blocks may have arrived while we were replaying.
                let current = self.source.latest_height().await?;
                if current > tip {
                    debug!(tip = current, "tip advanced during replay");
                    tip = current;
                }
            }
            next += 1;
        }

        if let Some(height) = last_processed {
            self.save_checkpoint_if(batch_clean, height).await;
        }
        self.status.set_state(SyncState::Synced);
        info!(height = tip, "historical replay caught up");
        Ok(tip)
    }

    /// Run historical replay for the process lifetime: catch up once, then
    /// keep polling the tip and replaying anything the subscription missed.
    pub async fn run_historical(&self) -> Result<(), IndexError> {
        let mut cursor = self.catch_up().await?;

        loop {
            tokio::time::sleep(self.config.poll_interval()).await;
            let tip = self.source.latest_height().await?;
            while cursor < tip {
                cursor += 1;
                let mut clean = true;
                self.process_block(cursor, &mut clean).await?;
                self.status.observe_height(cursor);
            }
        }
    }

    /// Consume the live subscriptions until the shutdown signal fires.
    pub async fn run_live(
        &self,
        mut streams: LiveStreams,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), IndexError> {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("received shutdown signal");
                    return Ok(());
                }
                Some(event) = streams.new_block.recv() => {
                    self.handle_new_block(&event).await;
                }
                Some(event) = streams.bond_provider.recv() => {
                    self.handle_live_event(KIND_PROVIDER_BOND, &event).await;
                }
                Some(event) = streams.mod_provider.recv() => {
                    self.handle_live_event(KIND_PROVIDER_MOD, &event).await;
                }
                Some(event) = streams.open_contract.recv() => {
                    self.handle_live_event(KIND_OPEN_CONTRACT, &event).await;
                }
                Some(event) = streams.close_contract.recv() => {
                    self.handle_live_event(KIND_CLOSE_CONTRACT, &event).await;
                }
                Some(event) = streams.claim_income.recv() => {
                    self.handle_live_event(KIND_CLAIM_CONTRACT_INCOME, &event).await;
                }
                else => {
                    warn!("all subscription streams closed");
                    return Ok(());
                }
            }
        }
    }

    /// Run both loops concurrently until shutdown (live) or a fatal
    /// historical failure.
    pub async fn run(
        self: Arc<Self>,
        streams: LiveStreams,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), IndexError> {
        let mut historical = {
            let coordinator = Arc::clone(&self);
            tokio::spawn(async move { coordinator.run_historical().await })
        };

        tokio::select! {
            result = self.run_live(streams, shutdown) => {
                historical.abort();
                result
            }
            result = &mut historical => match result {
                Ok(inner) => inner,
                Err(e) => Err(IndexError::Aborted { reason: e.to_string() }),
            },
        }
    }

    // ── Internals ──────────────────────────────────────────────────────────

    /// Replay one block's transaction events through the router.
    ///
    /// Infrastructure failures inside a handler are logged and mark the
    /// batch dirty so the checkpoint does not advance past the unprocessed
    /// event; replay continues and a later restart/backfill retries it.
    async fn process_block(&self, height: u64, batch_clean: &mut bool) -> Result<(), IndexError> {
        let block = self.source.block_events(height).await?;

        for tx in &block.txs {
            for event in &tx.events {
                debug!(height, kind = %event.kind, "received event");
                let attrs =
                    EventAttributes::from_block_event(&event.attribute_pairs(), height, Some(&tx.tx_id));
                if let Err(e) = self.router.route(&event.kind, &attrs).await {
                    error!(
                        height,
                        tx_id = %tx.tx_id,
                        kind = %event.kind,
                        error = %e,
                        "error handling historical event"
                    );
                    *batch_clean = false;
                }
            }
        }
        Ok(())
    }

    async fn save_checkpoint_if(&self, batch_clean: bool, height: u64) {
        if !batch_clean {
            warn!(height, "batch contained unprocessed events, not advancing checkpoint");
            return;
        }
        if let Err(e) = self.store.upsert_checkpoint(&self.config.id, height).await {
            warn!(height, error = %e, "error writing checkpoint");
        }
    }

    async fn handle_new_block(&self, event: &SubscriptionEvent) {
        let Some(height) = event.new_block_height() else {
            warn!("block notification without a height");
            return;
        };
        debug!(height, "received block");
        self.status.observe_height(height);

        // While catching up, observing the block is enough; marking it done
        // would put the checkpoint ahead of historical replay.
        if self.status.is_synced() {
            if let Err(e) = self.store.upsert_checkpoint(&self.config.id, height).await {
                warn!(height, error = %e, "error writing checkpoint");
            }
        }
    }

    async fn handle_live_event(&self, kind: &str, event: &SubscriptionEvent) {
        debug!(kind, "received subscription event");
        let attrs = EventAttributes::from_subscription(kind, &event.events);
        if let Err(e) = self.router.route(kind, &attrs).await {
            error!(kind, error = %e, "error handling live event");
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use dirindex_rpc::{AbciEvent, EventAttribute};
    use dirindex_storage::MemoryStore;

    use crate::handlers::EventIndexer;
    use crate::source::{BlockEvents, TxEvents};

    struct ScriptedSource {
        tip: AtomicU64,
        blocks: Mutex<HashMap<u64, BlockEvents>>,
    }

    impl ScriptedSource {
        fn new(tip: u64) -> Self {
            Self { tip: AtomicU64::new(tip), blocks: Mutex::new(HashMap::new()) }
        }

        fn add_tx_event(&self, height: u64, tx_id: &str, kind: &str, attrs: &[(&str, &str)]) {
            let event = AbciEvent {
                kind: kind.into(),
                attributes: attrs
                    .iter()
                    .map(|(k, v)| EventAttribute { key: k.to_string(), value: v.to_string() })
                    .collect(),
            };
            let mut blocks = self.blocks.lock().unwrap();
            blocks
                .entry(height)
                .or_insert_with(|| BlockEvents { height, txs: vec![] })
                .txs
                .push(TxEvents { tx_id: tx_id.into(), events: vec![event] });
        }
    }

    #[async_trait]
    impl ChainSource for ScriptedSource {
        async fn latest_height(&self) -> Result<u64, RpcError> {
            Ok(self.tip.load(Ordering::Acquire))
        }

        async fn block_events(&self, height: u64) -> Result<BlockEvents, RpcError> {
            let blocks = self.blocks.lock().unwrap();
            Ok(blocks
                .get(&height)
                .cloned()
                .unwrap_or(BlockEvents { height, txs: vec![] }))
        }
    }

    fn coordinator(
        config: IndexerConfig,
        source: ScriptedSource,
        store: Arc<MemoryStore>,
    ) -> SyncCoordinator<ScriptedSource> {
        let indexer = Arc::new(EventIndexer::new(store.clone(), None));
        let router = Arc::new(EventRouter::new(indexer));
        SyncCoordinator::new(config, source, router, store)
    }

    fn test_config() -> IndexerConfig {
        IndexerConfig {
            id: "test".into(),
            checkpoint_interval: 2,
            rollback_margin: 3,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fresh_start_begins_at_height_one() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(test_config(), ScriptedSource::new(0), store);
        assert_eq!(c.recover_start_height().await.unwrap(), 1);
        assert_eq!(c.status().state(), SyncState::CatchingUp);
    }

    #[tokio::test]
    async fn restart_rewinds_the_rollback_margin() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_checkpoint("test", 100).await.unwrap();
        let c = coordinator(test_config(), ScriptedSource::new(0), store);
        // max(100 - 3, 1)
        assert_eq!(c.recover_start_height().await.unwrap(), 97);
    }

    #[tokio::test]
    async fn rollback_margin_clamps_at_one() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_checkpoint("test", 2).await.unwrap();
        let c = coordinator(test_config(), ScriptedSource::new(0), store);
        assert_eq!(c.recover_start_height().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn catch_up_replays_events_and_goes_synced() {
        let store = Arc::new(MemoryStore::new());
        let source = ScriptedSource::new(5);
        source.add_tx_event(
            2,
            "TXB",
            "provider_bond",
            &[("pubkey", "abc"), ("chain", "btc-mainnet"), ("bond_abs", "500")],
        );
        source.add_tx_event(
            4,
            "TXO",
            "open_contract",
            &[
                ("pubkey", "abc"),
                ("chain", "btc-mainnet"),
                ("client", "cli"),
                ("type", "subscription"),
                ("duration", "100"),
                ("rate", "3"),
                ("open_cost", "15"),
            ],
        );

        let c = coordinator(test_config(), source, store.clone());
        let tip = c.catch_up().await.unwrap();

        assert_eq!(tip, 5);
        assert!(c.status().is_synced());
        assert_eq!(c.status().last_height(), 5);

        let provider = store.find_provider("abc", "btc-mainnet").await.unwrap().unwrap();
        assert_eq!(provider.bond.as_str(), "500");
        // Delegate fell back to the client pubkey
        let contract = store
            .find_contract_by_keys("btc-mainnet", "abc", "cli")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contract.duration, 100);
        assert_eq!(contract.height, 4);

        let checkpoint = store.find_checkpoint("test").await.unwrap().unwrap();
        assert_eq!(checkpoint.height, 5);
    }

    #[tokio::test]
    async fn catch_up_twice_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let make_source = || {
            let s = ScriptedSource::new(3);
            s.add_tx_event(
                1,
                "TXB",
                "provider_bond",
                &[("pubkey", "abc"), ("chain", "btc-mainnet"), ("bond_abs", "500")],
            );
            s
        };

        // Two full passes over the same chain, as the overlapping live and
        // historical paths would produce.
        let mut config = test_config();
        config.rollback_margin = 10;
        coordinator(config.clone(), make_source(), store.clone())
            .catch_up()
            .await
            .unwrap();
        coordinator(config, make_source(), store.clone()).catch_up().await.unwrap();

        assert_eq!(store.provider_count(), 1);
        assert_eq!(store.bond_event_count(), 1);
        let provider = store.find_provider("abc", "btc-mainnet").await.unwrap().unwrap();
        assert_eq!(provider.bond.as_str(), "500");
    }

    #[tokio::test]
    async fn empty_chain_is_immediately_synced() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(test_config(), ScriptedSource::new(0), store.clone());
        c.catch_up().await.unwrap();
        assert!(c.status().is_synced());
        // Nothing processed, nothing checkpointed
        assert!(store.find_checkpoint("test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn live_new_block_gates_checkpoint_on_synced() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(test_config(), ScriptedSource::new(0), store.clone());

        let notification = SubscriptionEvent {
            query: queries::NEW_BLOCK.into(),
            data: serde_json::json!({
                "type": "tendermint/event/NewBlock",
                "value": { "block": { "header": { "height": "42" } } }
            }),
            events: HashMap::new(),
        };

        // Catching up: observed, but no checkpoint write
        c.status.set_state(SyncState::CatchingUp);
        c.handle_new_block(&notification).await;
        assert_eq!(c.status().last_height(), 42);
        assert!(store.find_checkpoint("test").await.unwrap().is_none());

        // Synced: checkpoint advances
        c.status.set_state(SyncState::Synced);
        c.handle_new_block(&notification).await;
        assert_eq!(store.find_checkpoint("test").await.unwrap().unwrap().height, 42);
    }

    #[tokio::test]
    async fn live_event_flows_through_router() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(test_config(), ScriptedSource::new(0), store.clone());

        let mut events = HashMap::new();
        events.insert("provider_bond.pubkey".to_string(), vec!["abc".to_string()]);
        events.insert("provider_bond.chain".to_string(), vec!["btc-mainnet".to_string()]);
        events.insert("provider_bond.bond_abs".to_string(), vec!["500".to_string()]);
        events.insert("tx.height".to_string(), vec!["9".to_string()]);
        events.insert("tx.hash".to_string(), vec!["f00d".to_string()]);

        let notification = SubscriptionEvent {
            query: queries::BOND_PROVIDER.into(),
            data: serde_json::Value::Null,
            events,
        };
        c.handle_live_event(KIND_PROVIDER_BOND, &notification).await;

        assert_eq!(store.provider_count(), 1);
        assert_eq!(store.bond_event_count(), 1);
    }
}
