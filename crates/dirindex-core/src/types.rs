//! Domain scalar types shared across events, handlers, and storage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DecodeError;

// ─── BondAmount ───────────────────────────────────────────────────────────────

/// An arbitrary-precision bond amount, carried as a base-10 string.
///
/// Bond values exceed what fits in a fixed-width integer on some chains, and
/// the store column is DECIMAL, so the amount is validated but never narrowed
/// to a machine integer anywhere in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BondAmount(String);

impl BondAmount {
    /// Validate `s` as an optionally-signed base-10 integer string.
    pub fn parse(s: &str) -> Result<Self, DecodeError> {
        let digits = s.strip_prefix('-').unwrap_or(s);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(DecodeError::InvalidNumber {
                field: "bond",
                value: s.to_string(),
            });
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BondAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── ProviderStatus ───────────────────────────────────────────────────────────

/// Whether a provider is currently serving requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderStatus {
    Online,
    #[default]
    Offline,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "Online",
            Self::Offline => "Offline",
        }
    }
}

impl FromStr for ProviderStatus {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Online" => Ok(Self::Online),
            "Offline" => Ok(Self::Offline),
            other => Err(DecodeError::InvalidStatus { value: other.to_string() }),
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─── ContractType ─────────────────────────────────────────────────────────────

/// How a contract is paid for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractType {
    #[default]
    PayAsYouGo,
    Subscription,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PayAsYouGo => "pay-as-you-go",
            Self::Subscription => "subscription",
        }
    }
}

impl FromStr for ContractType {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pay-as-you-go" => Ok(Self::PayAsYouGo),
            "subscription" => Ok(Self::Subscription),
            other => Err(DecodeError::InvalidContractType { value: other.to_string() }),
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
