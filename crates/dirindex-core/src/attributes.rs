//! The canonical attribute map both ingestion paths normalize into.
//!
//! Two producers feed the decoder:
//! - the live WebSocket subscription, whose events arrive as a map from
//!   `"<eventKind>.<field>"` to an *array* of string values, and
//! - historical replay, where each ABCI event carries a flat key/value
//!   attribute list already scoped to one event.
//!
//! Both are flattened into one string-keyed map per event, augmented with
//! the block height and the upper-case hex transaction id where available.

use std::collections::HashMap;

use tracing::warn;

/// Attribute keys injected by the normalizer rather than emitted on-chain.
pub const ATTR_HEIGHT: &str = "height";
pub const ATTR_TX_ID: &str = "txID";

/// One event's attributes in canonical form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventAttributes {
    attrs: HashMap<String, String>,
}

impl EventAttributes {
    /// Normalize a live subscription payload.
    ///
    /// `events` is the multi-valued attribute map the node attaches to a
    /// subscription notification. Keys scoped to `kind` have the
    /// `"<kind>."` prefix stripped; only the first value of each attribute
    /// is kept. A multi-valued attribute means several events of the same
    /// kind were merged into one notification — a known upstream ambiguity,
    /// so it is logged rather than rejected.
    pub fn from_subscription(kind: &str, events: &HashMap<String, Vec<String>>) -> Self {
        let prefix = format!("{kind}.");
        let mut attrs = HashMap::with_capacity(events.len());

        for (key, values) in events {
            let Some(field) = key.strip_prefix(&prefix) else {
                continue;
            };
            if values.len() > 1 {
                warn!(key = %key, count = values.len(), "attribute has multiple values, keeping first");
            }
            if let Some(first) = values.first() {
                attrs.insert(field.to_string(), first.clone());
            }
        }

        // Transaction-scoped context lives outside the event's own prefix.
        if !attrs.contains_key(ATTR_HEIGHT) {
            if let Some(height) = events.get("tx.height").and_then(|v| v.first()) {
                attrs.insert(ATTR_HEIGHT.to_string(), height.clone());
            }
        }
        if !attrs.contains_key(ATTR_TX_ID) {
            if let Some(hash) = events.get("tx.hash").and_then(|v| v.first()) {
                attrs.insert(ATTR_TX_ID.to_string(), hash.to_uppercase());
            }
        }

        Self { attrs }
    }

    /// Normalize one ABCI event from historical replay.
    ///
    /// `attributes` is the event's own key/value list; `height` is the
    /// enclosing block's height and `tx_hash` the enclosing transaction's
    /// hash (absent for end-block events).
    pub fn from_block_event(
        attributes: &[(String, String)],
        height: u64,
        tx_hash: Option<&str>,
    ) -> Self {
        let mut attrs: HashMap<String, String> = attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        attrs
            .entry(ATTR_HEIGHT.to_string())
            .or_insert_with(|| height.to_string());
        if let Some(hash) = tx_hash {
            attrs
                .entry(ATTR_TX_ID.to_string())
                .or_insert_with(|| hash.to_uppercase());
        }

        Self { attrs }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Iterate over all attributes in the map.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            attrs: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws_events(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn subscription_strips_kind_prefix() {
        let events = ws_events(&[
            ("provider_bond.pubkey", &["abc"]),
            ("provider_bond.chain", &["btc-mainnet"]),
            ("provider_mod.status", &["Online"]), // different kind, dropped
            ("message.action", &["/directory.v1.MsgBondProvider"]),
        ]);

        let attrs = EventAttributes::from_subscription("provider_bond", &events);
        assert_eq!(attrs.get("pubkey"), Some("abc"));
        assert_eq!(attrs.get("chain"), Some("btc-mainnet"));
        assert_eq!(attrs.get("status"), None);
        assert_eq!(attrs.get("action"), None);
    }

    #[test]
    fn subscription_takes_first_of_multi_valued() {
        let events = ws_events(&[("provider_bond.bond_abs", &["500", "750"])]);
        let attrs = EventAttributes::from_subscription("provider_bond", &events);
        assert_eq!(attrs.get("bond_abs"), Some("500"));
    }

    #[test]
    fn subscription_injects_height_and_upper_tx_id() {
        let events = ws_events(&[
            ("provider_bond.pubkey", &["abc"]),
            ("tx.height", &["1234"]),
            ("tx.hash", &["deadbeef01"]),
        ]);
        let attrs = EventAttributes::from_subscription("provider_bond", &events);
        assert_eq!(attrs.get(ATTR_HEIGHT), Some("1234"));
        assert_eq!(attrs.get(ATTR_TX_ID), Some("DEADBEEF01"));
    }

    #[test]
    fn subscription_event_height_wins_over_tx_height() {
        let events = ws_events(&[
            ("open_contract.height", &["77"]),
            ("tx.height", &["78"]),
        ]);
        let attrs = EventAttributes::from_subscription("open_contract", &events);
        assert_eq!(attrs.get(ATTR_HEIGHT), Some("77"));
    }

    #[test]
    fn block_event_injects_context() {
        let raw = vec![
            ("pubkey".to_string(), "abc".to_string()),
            ("chain".to_string(), "btc-mainnet".to_string()),
        ];
        let attrs = EventAttributes::from_block_event(&raw, 42, Some("cafef00d"));
        assert_eq!(attrs.get("pubkey"), Some("abc"));
        assert_eq!(attrs.get(ATTR_HEIGHT), Some("42"));
        assert_eq!(attrs.get(ATTR_TX_ID), Some("CAFEF00D"));
    }

    #[test]
    fn block_event_without_tx_has_no_tx_id() {
        let raw = vec![("nonce".to_string(), "3".to_string())];
        let attrs = EventAttributes::from_block_event(&raw, 10, None);
        assert_eq!(attrs.get(ATTR_TX_ID), None);
        assert_eq!(attrs.get(ATTR_HEIGHT), Some("10"));
    }

    #[test]
    fn block_event_keeps_existing_tx_id() {
        let raw = vec![(ATTR_TX_ID.to_string(), "ALREADYSET".to_string())];
        let attrs = EventAttributes::from_block_event(&raw, 10, Some("other"));
        assert_eq!(attrs.get(ATTR_TX_ID), Some("ALREADYSET"));
    }
}
