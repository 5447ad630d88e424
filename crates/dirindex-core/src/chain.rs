//! Chain identifier validation.
//!
//! Providers advertise service for a specific chain. Only identifiers from
//! the recognized set are accepted; anything else fails decoding of the
//! whole event.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DecodeError;

/// The set of chain identifiers the directory recognizes.
///
/// Mirrors the service chains registered on the network side; extending the
/// network with a new chain requires adding it here.
pub const RECOGNIZED_CHAINS: &[&str] = &["atom-mainnet", "eth-mainnet", "btc-mainnet"];

/// A validated chain identifier, e.g. `btc-mainnet`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    /// Validate `s` against [`RECOGNIZED_CHAINS`].
    pub fn parse(s: &str) -> Result<Self, DecodeError> {
        if RECOGNIZED_CHAINS.contains(&s) {
            Ok(Self(s.to_string()))
        } else {
            Err(DecodeError::InvalidChain { chain: s.to_string() })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ChainId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_chains_parse() {
        for chain in RECOGNIZED_CHAINS {
            assert!(ChainId::parse(chain).is_ok());
        }
    }

    #[test]
    fn unknown_chain_rejected() {
        let err = ChainId::parse("not-a-real-chain").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidChain { .. }));
    }

    #[test]
    fn chain_id_display() {
        let chain = ChainId::parse("btc-mainnet").unwrap();
        assert_eq!(chain.to_string(), "btc-mainnet");
    }
}
