//! Event routing — decode by kind label, dispatch to a handler, classify
//! failures.
//!
//! Unknown kinds, validation failures, and not-found lookups are logged with
//! enough context to replay manually (kind, height, tx id) and dropped;
//! infrastructure failures propagate to the caller.

use std::sync::Arc;

use tracing::warn;

use dirindex_core::{DecodeError, EventAttributes, TypedEvent};

use crate::error::IndexError;
use crate::handlers::EventIndexer;

/// Routes normalized events into the domain handlers.
pub struct EventRouter {
    indexer: Arc<EventIndexer>,
}

impl EventRouter {
    pub fn new(indexer: Arc<EventIndexer>) -> Self {
        Self { indexer }
    }

    /// Decode and handle one event.
    ///
    /// Returns `Ok(())` for events that were applied *or* dropped;
    /// `Err` only for infrastructure failures (store/RPC) the caller must
    /// account for.
    pub async fn route(&self, kind: &str, attrs: &EventAttributes) -> Result<(), IndexError> {
        let event = match TypedEvent::decode(kind, attrs) {
            Ok(event) => event,
            Err(DecodeError::UnknownEventKind { kind }) => {
                warn!(kind, "unknown event kind, dropping");
                return Ok(());
            }
            Err(e) => {
                warn!(
                    kind,
                    height = attrs.get("height").unwrap_or(""),
                    tx_id = attrs.get("txID").unwrap_or(""),
                    error = %e,
                    "dropping undecodable event"
                );
                return Ok(());
            }
        };

        match self.indexer.handle(&event).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_discardable() => {
                warn!(
                    kind = event.kind(),
                    height = event.height(),
                    tx_id = event.tx_id(),
                    error = %e,
                    "dropping event"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
