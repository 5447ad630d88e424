//! `ChainSource` — the coordinator's view of the pull side of the adapter.
//!
//! Historical replay only needs two questions answered: where is the tip,
//! and what events did a given block's transactions emit. The trait keeps
//! the coordinator testable with scripted sources.

use async_trait::async_trait;
use tracing::warn;

use dirindex_rpc::{AbciEvent, NodeClient, RpcError};

/// Events emitted by one transaction.
#[derive(Debug, Clone)]
pub struct TxEvents {
    /// Upper-case hex transaction id.
    pub tx_id: String,
    pub events: Vec<AbciEvent>,
}

/// Everything a block contributed to the event stream.
#[derive(Debug, Clone)]
pub struct BlockEvents {
    pub height: u64,
    pub txs: Vec<TxEvents>,
}

/// Pull-side access to the chain, as the sync coordinator sees it.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Current chain tip height.
    async fn latest_height(&self) -> Result<u64, RpcError>;

    /// Fetch a block and the events of every transaction in it.
    async fn block_events(&self, height: u64) -> Result<BlockEvents, RpcError>;
}

/// `ChainSource` backed by the node's JSON-RPC endpoint.
pub struct RpcChainSource {
    client: NodeClient,
}

impl RpcChainSource {
    pub fn new(client: NodeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChainSource for RpcChainSource {
    async fn latest_height(&self) -> Result<u64, RpcError> {
        Ok(self.client.fetch_latest_block().await?.height())
    }

    async fn block_events(&self, height: u64) -> Result<BlockEvents, RpcError> {
        let block = self.client.fetch_block(height).await?;

        let mut txs = Vec::new();
        for tx_id in block.tx_hashes()? {
            // A missing tx result leaves a gap this pass; the next backfill
            // over the range picks it up.
            match self.client.fetch_tx(&tx_id).await {
                Ok(tx) => txs.push(TxEvents { tx_id, events: tx.tx_result.events }),
                Err(e) => warn!(height, tx_id = %tx_id, error = %e, "failed to get transaction data"),
            }
        }

        Ok(BlockEvents { height, txs })
    }
}
