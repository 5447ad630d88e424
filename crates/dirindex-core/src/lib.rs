//! dirindex-core — typed domain events and decoding for the directory indexer.
//!
//! # Pipeline position
//!
//! ```text
//! chain node ─→ dirindex-rpc ─→ EventAttributes ─→ TypedEvent ─→ handlers
//!                (adapter)        (normalizer)       (decoder)
//! ```
//!
//! Both ingestion paths — the live WebSocket subscription and historical
//! block replay — normalize into the same [`attributes::EventAttributes`]
//! map, which the per-kind parsers in [`events`] turn into fully validated
//! [`events::TypedEvent`] values.

pub mod attributes;
pub mod chain;
pub mod error;
pub mod events;
pub mod types;

pub use attributes::EventAttributes;
pub use chain::{ChainId, RECOGNIZED_CHAINS};
pub use error::DecodeError;
pub use events::{
    BondProviderEvent, CloseContractEvent, ContractSettlementEvent, ModProviderEvent,
    OpenContractEvent, TypedEvent, ValidatorPayoutEvent,
};
pub use types::{BondAmount, ContractType, ProviderStatus};
