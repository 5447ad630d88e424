//! dirindex-rpc — the chain client adapter.
//!
//! The only component that talks to the network. Push subscriptions go over
//! WebSocket ([`ws::SubscriptionClient`], one logical stream per topic
//! query); pull calls go over HTTP JSON-RPC ([`client::NodeClient`], with
//! bounded fixed-delay retry on transient failures).

pub mod client;
pub mod error;
pub mod retry;
pub mod types;
pub mod ws;

pub use client::NodeClient;
pub use error::RpcError;
pub use retry::RetryPolicy;
pub use types::{
    AbciEvent, Block, EventAttribute, ResultBlock, ResultTx, SubscriptionEvent, TxResponse,
};
pub use ws::{SubscriptionClient, WsConfig};
