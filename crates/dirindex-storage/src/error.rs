//! Storage error types.

use thiserror::Error;

/// Errors surfaced by a `DirectoryStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
