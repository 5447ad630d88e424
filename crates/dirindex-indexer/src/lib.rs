//! dirindex-indexer — event routing, domain handlers, and the sync
//! coordinator for the provider directory.
//!
//! # Architecture
//!
//! ```text
//! SyncCoordinator
//!     ├── live loop        (per-topic subscriptions, checkpoint on Synced)
//!     ├── historical loop  (block replay from checkpoint to tip)
//!     ├── EventRouter      (decode by kind, drop-and-log policy)
//!     │       └── EventIndexer (six domain handlers)
//!     │               ├── DirectoryStore (idempotent persistence gateway)
//!     │               └── MetadataSource (off-chain document fetch)
//!     └── SyncStatus       (atomic state + last-height holder)
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metadata;
pub mod router;
pub mod source;
pub mod sync;

pub use config::IndexerConfig;
pub use error::IndexError;
pub use handlers::EventIndexer;
pub use metadata::{HttpMetadataFetcher, MetadataSource};
pub use router::EventRouter;
pub use source::{BlockEvents, ChainSource, RpcChainSource, TxEvents};
pub use sync::{LiveStreams, SyncCoordinator, SyncState, SyncStatus};
