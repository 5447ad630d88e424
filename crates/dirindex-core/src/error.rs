//! Error types for event decoding.

use thiserror::Error;

/// Errors that can occur while decoding a single event.
///
/// Any of these rejects the whole event — no partially populated event is
/// ever handed to a handler.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid chain {chain}")]
    InvalidChain { chain: String },

    #[error("invalid status {value}")]
    InvalidStatus { value: String },

    #[error("unexpected contract type {value}")]
    InvalidContractType { value: String },

    #[error("invalid metadata_uri {value}")]
    InvalidUri { value: String },

    #[error("cannot parse {field} value {value:?} as integer")]
    InvalidNumber { field: &'static str, value: String },

    #[error("unknown event kind {kind}")]
    UnknownEventKind { kind: String },
}
