//! Typed domain events and their per-kind parsers.
//!
//! Each event kind has a dedicated parser that enumerates every recognized
//! field name with its parse/validate rule and returns a fully typed record,
//! or fails the whole event on the first bad value. Unrecognized fields are
//! logged and ignored by design.

use std::str::FromStr;

use tracing::warn;

use crate::attributes::{EventAttributes, ATTR_HEIGHT, ATTR_TX_ID};
use crate::chain::ChainId;
use crate::error::DecodeError;
use crate::types::{BondAmount, ContractType, ProviderStatus};

// ─── Event kind labels ────────────────────────────────────────────────────────

pub const KIND_PROVIDER_BOND: &str = "provider_bond";
pub const KIND_PROVIDER_MOD: &str = "provider_mod";
pub const KIND_OPEN_CONTRACT: &str = "open_contract";
pub const KIND_CLOSE_CONTRACT: &str = "close_contract";
pub const KIND_CLAIM_CONTRACT_INCOME: &str = "claim_contract_income";
pub const KIND_CONTRACT_SETTLEMENT: &str = "contract_settlement";
pub const KIND_VALIDATOR_PAYOUT: &str = "validator_payout";

// ─── Typed events ─────────────────────────────────────────────────────────────

/// A provider posted (or adjusted) collateral for a chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondProviderEvent {
    pub pubkey: String,
    pub chain: String,
    pub height: u64,
    pub tx_id: String,
    pub bond_relative: Option<BondAmount>,
    pub bond_absolute: Option<BondAmount>,
}

/// A provider changed its advertised settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModProviderEvent {
    pub pubkey: String,
    pub chain: String,
    pub height: u64,
    pub tx_id: String,
    pub metadata_uri: String,
    pub metadata_nonce: u64,
    pub status: ProviderStatus,
    pub min_contract_duration: i64,
    pub max_contract_duration: i64,
    pub subscription_rate: i64,
    pub pay_as_you_go_rate: i64,
}

/// A delegate (or client acting as its own delegate) opened a contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenContractEvent {
    pub provider_pubkey: String,
    pub chain: String,
    pub delegate_pubkey: String,
    pub client_pubkey: String,
    pub height: u64,
    pub tx_id: String,
    pub contract_type: ContractType,
    pub duration: i64,
    pub rate: i64,
    pub open_cost: i64,
}

/// A contract was closed before or at expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseContractEvent {
    pub provider_pubkey: String,
    pub chain: String,
    pub delegate_pubkey: String,
    pub client_pubkey: String,
    pub height: u64,
    pub tx_id: String,
}

/// Income was settled against an open contract, either by an explicit
/// claim transaction or by the chain at contract expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractSettlementEvent {
    pub provider_pubkey: String,
    pub chain: String,
    pub delegate_pubkey: String,
    pub client_pubkey: String,
    pub height: u64,
    pub tx_id: String,
    pub nonce: i64,
    pub paid: i64,
    pub reserve: i64,
}

/// End-of-block reward paid to a validator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorPayoutEvent {
    pub validator: String,
    pub height: u64,
    pub tx_id: String,
    pub paid: i64,
}

/// The decoded form of any recognized event, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedEvent {
    BondProvider(BondProviderEvent),
    ModProvider(ModProviderEvent),
    OpenContract(OpenContractEvent),
    CloseContract(CloseContractEvent),
    ContractSettlement(ContractSettlementEvent),
    ValidatorPayout(ValidatorPayoutEvent),
}

impl TypedEvent {
    /// Decode a canonical attribute map into a typed event.
    ///
    /// `kind` is the on-chain event type label. `claim_contract_income` and
    /// `contract_settlement` carry the same payload and decode to the same
    /// settlement record.
    pub fn decode(kind: &str, attrs: &EventAttributes) -> Result<Self, DecodeError> {
        match kind {
            KIND_PROVIDER_BOND => BondProviderEvent::from_attributes(attrs).map(Self::BondProvider),
            KIND_PROVIDER_MOD => ModProviderEvent::from_attributes(attrs).map(Self::ModProvider),
            KIND_OPEN_CONTRACT => OpenContractEvent::from_attributes(attrs).map(Self::OpenContract),
            KIND_CLOSE_CONTRACT => {
                CloseContractEvent::from_attributes(attrs).map(Self::CloseContract)
            }
            KIND_CLAIM_CONTRACT_INCOME | KIND_CONTRACT_SETTLEMENT => {
                ContractSettlementEvent::from_attributes(attrs).map(Self::ContractSettlement)
            }
            KIND_VALIDATOR_PAYOUT => {
                ValidatorPayoutEvent::from_attributes(attrs).map(Self::ValidatorPayout)
            }
            other => Err(DecodeError::UnknownEventKind { kind: other.to_string() }),
        }
    }

    /// The canonical kind label, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BondProvider(_) => KIND_PROVIDER_BOND,
            Self::ModProvider(_) => KIND_PROVIDER_MOD,
            Self::OpenContract(_) => KIND_OPEN_CONTRACT,
            Self::CloseContract(_) => KIND_CLOSE_CONTRACT,
            Self::ContractSettlement(_) => KIND_CONTRACT_SETTLEMENT,
            Self::ValidatorPayout(_) => KIND_VALIDATOR_PAYOUT,
        }
    }

    /// Block height the event was emitted at.
    pub fn height(&self) -> u64 {
        match self {
            Self::BondProvider(e) => e.height,
            Self::ModProvider(e) => e.height,
            Self::OpenContract(e) => e.height,
            Self::CloseContract(e) => e.height,
            Self::ContractSettlement(e) => e.height,
            Self::ValidatorPayout(e) => e.height,
        }
    }

    /// Transaction id of the emitting transaction (empty for end-block events).
    pub fn tx_id(&self) -> &str {
        match self {
            Self::BondProvider(e) => &e.tx_id,
            Self::ModProvider(e) => &e.tx_id,
            Self::OpenContract(e) => &e.tx_id,
            Self::CloseContract(e) => &e.tx_id,
            Self::ContractSettlement(e) => &e.tx_id,
            Self::ValidatorPayout(e) => &e.tx_id,
        }
    }
}

// ─── Field parse helpers ──────────────────────────────────────────────────────

fn parse_i64(field: &'static str, value: &str) -> Result<i64, DecodeError> {
    value.parse().map_err(|_| DecodeError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, DecodeError> {
    value.parse().map_err(|_| DecodeError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn validate_chain(value: &str) -> Result<String, DecodeError> {
    ChainId::parse(value).map(|c| c.as_str().to_string())
}

fn validate_uri(value: &str) -> Result<String, DecodeError> {
    url::Url::parse(value)
        .map(|_| value.to_string())
        .map_err(|_| DecodeError::InvalidUri { value: value.to_string() })
}

// ─── Parsers ──────────────────────────────────────────────────────────────────

impl BondProviderEvent {
    pub fn from_attributes(attrs: &EventAttributes) -> Result<Self, DecodeError> {
        let mut evt = Self::default();
        for (key, value) in attrs.iter() {
            match key {
                "pubkey" => evt.pubkey = value.to_string(),
                "chain" => evt.chain = validate_chain(value)?,
                "bond_rel" => evt.bond_relative = Some(BondAmount::parse(value)?),
                "bond_abs" => evt.bond_absolute = Some(BondAmount::parse(value)?),
                ATTR_HEIGHT => evt.height = parse_u64(ATTR_HEIGHT, value)?,
                ATTR_TX_ID => evt.tx_id = value.to_string(),
                other => warn!(attribute = other, "unrecognized attribute for provider_bond"),
            }
        }
        Ok(evt)
    }
}

impl ModProviderEvent {
    pub fn from_attributes(attrs: &EventAttributes) -> Result<Self, DecodeError> {
        let mut evt = Self::default();
        for (key, value) in attrs.iter() {
            match key {
                "pubkey" => evt.pubkey = value.to_string(),
                "chain" => evt.chain = validate_chain(value)?,
                "metadata_uri" => evt.metadata_uri = validate_uri(value)?,
                "metadata_nonce" => evt.metadata_nonce = parse_u64("metadata_nonce", value)?,
                "status" => evt.status = ProviderStatus::from_str(value)?,
                "min_contract_duration" => {
                    evt.min_contract_duration = parse_i64("min_contract_duration", value)?
                }
                "max_contract_duration" => {
                    evt.max_contract_duration = parse_i64("max_contract_duration", value)?
                }
                "subscription_rate" => {
                    evt.subscription_rate = parse_i64("subscription_rate", value)?
                }
                "pay-as-you-go_rate" => {
                    evt.pay_as_you_go_rate = parse_i64("pay-as-you-go_rate", value)?
                }
                ATTR_HEIGHT => evt.height = parse_u64(ATTR_HEIGHT, value)?,
                ATTR_TX_ID => evt.tx_id = value.to_string(),
                other => warn!(attribute = other, "unrecognized attribute for provider_mod"),
            }
        }
        Ok(evt)
    }
}

impl OpenContractEvent {
    pub fn from_attributes(attrs: &EventAttributes) -> Result<Self, DecodeError> {
        let mut evt = Self::default();
        for (key, value) in attrs.iter() {
            match key {
                "pubkey" => evt.provider_pubkey = value.to_string(),
                "chain" => evt.chain = validate_chain(value)?,
                "delegate" => evt.delegate_pubkey = value.to_string(),
                "client" => evt.client_pubkey = value.to_string(),
                "type" => evt.contract_type = ContractType::from_str(value)?,
                "duration" => evt.duration = parse_i64("duration", value)?,
                "rate" => evt.rate = parse_i64("rate", value)?,
                "open_cost" => evt.open_cost = parse_i64("open_cost", value)?,
                ATTR_HEIGHT => evt.height = parse_u64(ATTR_HEIGHT, value)?,
                ATTR_TX_ID => evt.tx_id = value.to_string(),
                other => warn!(attribute = other, "unrecognized attribute for open_contract"),
            }
        }
        // A contract with no explicit delegate belongs to the client itself.
        if evt.delegate_pubkey.is_empty() {
            evt.delegate_pubkey = evt.client_pubkey.clone();
        }
        Ok(evt)
    }
}

impl CloseContractEvent {
    pub fn from_attributes(attrs: &EventAttributes) -> Result<Self, DecodeError> {
        let mut evt = Self::default();
        for (key, value) in attrs.iter() {
            match key {
                "pubkey" => evt.provider_pubkey = value.to_string(),
                "chain" => evt.chain = validate_chain(value)?,
                "delegate" => evt.delegate_pubkey = value.to_string(),
                "client" => evt.client_pubkey = value.to_string(),
                ATTR_HEIGHT => evt.height = parse_u64(ATTR_HEIGHT, value)?,
                ATTR_TX_ID => evt.tx_id = value.to_string(),
                other => warn!(attribute = other, "unrecognized attribute for close_contract"),
            }
        }
        if evt.delegate_pubkey.is_empty() {
            evt.delegate_pubkey = evt.client_pubkey.clone();
        }
        Ok(evt)
    }
}

impl ContractSettlementEvent {
    pub fn from_attributes(attrs: &EventAttributes) -> Result<Self, DecodeError> {
        let mut evt = Self::default();
        for (key, value) in attrs.iter() {
            match key {
                "pubkey" => evt.provider_pubkey = value.to_string(),
                "chain" => evt.chain = validate_chain(value)?,
                "delegate" => evt.delegate_pubkey = value.to_string(),
                "client" => evt.client_pubkey = value.to_string(),
                "nonce" => evt.nonce = parse_i64("nonce", value)?,
                "paid" => evt.paid = parse_i64("paid", value)?,
                "reserve" => evt.reserve = parse_i64("reserve", value)?,
                ATTR_HEIGHT => evt.height = parse_u64(ATTR_HEIGHT, value)?,
                ATTR_TX_ID => evt.tx_id = value.to_string(),
                other => {
                    warn!(attribute = other, "unrecognized attribute for contract_settlement")
                }
            }
        }
        if evt.delegate_pubkey.is_empty() {
            evt.delegate_pubkey = evt.client_pubkey.clone();
        }
        Ok(evt)
    }
}

impl ValidatorPayoutEvent {
    pub fn from_attributes(attrs: &EventAttributes) -> Result<Self, DecodeError> {
        let mut evt = Self::default();
        for (key, value) in attrs.iter() {
            match key {
                "validator" => evt.validator = value.to_string(),
                "paid" => evt.paid = parse_i64("paid", value)?,
                ATTR_HEIGHT => evt.height = parse_u64(ATTR_HEIGHT, value)?,
                ATTR_TX_ID => evt.tx_id = value.to_string(),
                other => warn!(attribute = other, "unrecognized attribute for validator_payout"),
            }
        }
        Ok(evt)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_bond_provider() {
        let attrs = EventAttributes::from_pairs([
            ("pubkey", "abc"),
            ("chain", "btc-mainnet"),
            ("bond_abs", "500"),
            ("height", "100"),
            ("txID", "AB12"),
        ]);
        let evt = match TypedEvent::decode(KIND_PROVIDER_BOND, &attrs).unwrap() {
            TypedEvent::BondProvider(e) => e,
            other => panic!("wrong variant: {other:?}"),
        };
        assert_eq!(evt.pubkey, "abc");
        assert_eq!(evt.chain, "btc-mainnet");
        assert_eq!(evt.bond_absolute.unwrap().as_str(), "500");
        assert!(evt.bond_relative.is_none());
        assert_eq!(evt.height, 100);
        assert_eq!(evt.tx_id, "AB12");
    }

    #[test]
    fn decode_rejects_invalid_chain() {
        let attrs = EventAttributes::from_pairs([
            ("pubkey", "abc"),
            ("chain", "not-a-real-chain"),
            ("type", "pay-as-you-go"),
        ]);
        let err = TypedEvent::decode(KIND_OPEN_CONTRACT, &attrs).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidChain { .. }));
    }

    #[test]
    fn decode_rejects_bad_number() {
        let attrs = EventAttributes::from_pairs([("duration", "ten")]);
        let err = TypedEvent::decode(KIND_OPEN_CONTRACT, &attrs).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidNumber { field: "duration", .. }));
    }

    #[test]
    fn decode_rejects_bad_contract_type() {
        let attrs = EventAttributes::from_pairs([("type", "prepaid")]);
        let err = TypedEvent::decode(KIND_OPEN_CONTRACT, &attrs).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidContractType { .. }));
    }

    #[test]
    fn decode_rejects_bad_status() {
        let attrs = EventAttributes::from_pairs([("status", "sleeping")]);
        let err = TypedEvent::decode(KIND_PROVIDER_MOD, &attrs).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidStatus { .. }));
    }

    #[test]
    fn decode_rejects_bad_metadata_uri() {
        let attrs = EventAttributes::from_pairs([("metadata_uri", "not a uri")]);
        let err = TypedEvent::decode(KIND_PROVIDER_MOD, &attrs).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidUri { .. }));
    }

    #[test]
    fn unknown_attributes_are_ignored() {
        let attrs = EventAttributes::from_pairs([
            ("pubkey", "abc"),
            ("chain", "eth-mainnet"),
            ("msg_index", "0"),
            ("module", "directory"),
        ]);
        let evt = TypedEvent::decode(KIND_PROVIDER_BOND, &attrs).unwrap();
        assert_eq!(evt.kind(), KIND_PROVIDER_BOND);
    }

    #[test]
    fn delegate_falls_back_to_client() {
        for kind in [KIND_OPEN_CONTRACT, KIND_CLOSE_CONTRACT, KIND_CONTRACT_SETTLEMENT] {
            let attrs = EventAttributes::from_pairs([
                ("pubkey", "prov"),
                ("chain", "btc-mainnet"),
                ("client", "client-pk"),
            ]);
            let evt = TypedEvent::decode(kind, &attrs).unwrap();
            let delegate = match evt {
                TypedEvent::OpenContract(e) => e.delegate_pubkey,
                TypedEvent::CloseContract(e) => e.delegate_pubkey,
                TypedEvent::ContractSettlement(e) => e.delegate_pubkey,
                other => panic!("wrong variant: {other:?}"),
            };
            assert_eq!(delegate, "client-pk");
        }
    }

    #[test]
    fn explicit_delegate_is_kept() {
        let attrs = EventAttributes::from_pairs([
            ("pubkey", "prov"),
            ("chain", "btc-mainnet"),
            ("client", "client-pk"),
            ("delegate", "delegate-pk"),
        ]);
        let evt = match TypedEvent::decode(KIND_OPEN_CONTRACT, &attrs).unwrap() {
            TypedEvent::OpenContract(e) => e,
            other => panic!("wrong variant: {other:?}"),
        };
        assert_eq!(evt.delegate_pubkey, "delegate-pk");
    }

    #[test]
    fn claim_and_settlement_share_a_decoder() {
        let attrs = EventAttributes::from_pairs([
            ("pubkey", "prov"),
            ("chain", "btc-mainnet"),
            ("client", "c"),
            ("nonce", "4"),
            ("paid", "120"),
            ("reserve", "880"),
        ]);
        let a = TypedEvent::decode(KIND_CLAIM_CONTRACT_INCOME, &attrs).unwrap();
        let b = TypedEvent::decode(KIND_CONTRACT_SETTLEMENT, &attrs).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let attrs = EventAttributes::from_pairs([("pubkey", "abc")]);
        let err = TypedEvent::decode("coin_received", &attrs).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownEventKind { .. }));
    }

    #[test]
    fn decode_mod_provider_full() {
        let attrs = EventAttributes::from_pairs([
            ("pubkey", "abc"),
            ("chain", "eth-mainnet"),
            ("metadata_uri", "http://provider.example/metadata.json"),
            ("metadata_nonce", "7"),
            ("status", "Online"),
            ("min_contract_duration", "10"),
            ("max_contract_duration", "5256000"),
            ("subscription_rate", "20"),
            ("pay-as-you-go_rate", "4"),
            ("height", "55"),
            ("txID", "FFEE"),
        ]);
        let evt = match TypedEvent::decode(KIND_PROVIDER_MOD, &attrs).unwrap() {
            TypedEvent::ModProvider(e) => e,
            other => panic!("wrong variant: {other:?}"),
        };
        assert_eq!(evt.metadata_nonce, 7);
        assert_eq!(evt.status, ProviderStatus::Online);
        assert_eq!(evt.max_contract_duration, 5_256_000);
        assert_eq!(evt.pay_as_you_go_rate, 4);
    }
}
