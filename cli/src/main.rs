//! dirindex — provider-directory chain indexer daemon.
//!
//! Configuration comes from the environment:
//!
//! ```text
//! INDEXER_ID            checkpoint key for this instance   (default: dirindex)
//! RPC_URL               node JSON-RPC endpoint             (default: http://localhost:26657)
//! WS_URL                node WebSocket endpoint            (default: ws://localhost:26657/websocket)
//! DB_PATH               SQLite database path               (default: ./directory.db)
//! ROLLBACK_MARGIN       blocks rewound below the checkpoint on startup
//! CHECKPOINT_INTERVAL   historical checkpoint cadence (blocks)
//! RUST_LOG              tracing filter (default: info)
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dirindex_indexer::{
    EventIndexer, EventRouter, HttpMetadataFetcher, IndexerConfig, LiveStreams, MetadataSource,
    RpcChainSource, SyncCoordinator,
};
use dirindex_rpc::{NodeClient, SubscriptionClient, WsConfig};
use dirindex_storage::sqlite::SqliteStore;
use dirindex_storage::DirectoryStore;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn config_from_env() -> IndexerConfig {
    let defaults = IndexerConfig::default();
    IndexerConfig {
        id: env_or("INDEXER_ID", &defaults.id),
        rpc_url: env_or("RPC_URL", &defaults.rpc_url),
        ws_url: env_or("WS_URL", &defaults.ws_url),
        rollback_margin: env_parsed("ROLLBACK_MARGIN", defaults.rollback_margin),
        checkpoint_interval: env_parsed("CHECKPOINT_INTERVAL", defaults.checkpoint_interval),
        poll_interval_ms: env_parsed("POLL_INTERVAL_MS", defaults.poll_interval_ms),
        max_retries: env_parsed("MAX_RETRIES", defaults.max_retries),
        retry_delay_ms: env_parsed("RETRY_DELAY_MS", defaults.retry_delay_ms),
        metadata_retries: env_parsed("METADATA_RETRIES", defaults.metadata_retries),
        metadata_max_bytes: env_parsed("METADATA_MAX_BYTES", defaults.metadata_max_bytes),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config_from_env();
    let db_path = env_or("DB_PATH", "./directory.db");

    info!(id = %config.id, rpc = %config.rpc_url, ws = %config.ws_url, "starting indexer");

    let store: Arc<dyn DirectoryStore> = Arc::new(
        SqliteStore::open(&db_path)
            .await
            .with_context(|| format!("error opening database at {db_path}"))?,
    );

    let metadata: Arc<dyn MetadataSource> = Arc::new(HttpMetadataFetcher::new(
        config.metadata_retries,
        config.metadata_max_bytes,
    ));
    let indexer = Arc::new(EventIndexer::new(Arc::clone(&store), Some(metadata)));
    let router = Arc::new(EventRouter::new(indexer));

    let node = NodeClient::new(&config.rpc_url, config.retry_policy());
    let source = RpcChainSource::new(node);

    let subscriptions = SubscriptionClient::connect(&config.ws_url, WsConfig::default())
        .await
        .with_context(|| format!("error connecting to websocket at {}", config.ws_url))?;
    let streams = LiveStreams::subscribe(&subscriptions).context("error opening subscriptions")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received os quit signal");
            let _ = shutdown_tx.send(true);
        }
    });

    let coordinator = Arc::new(SyncCoordinator::new(config, source, router, store));
    coordinator.run(streams, shutdown_rx).await?;

    info!("indexer complete");
    Ok(())
}
