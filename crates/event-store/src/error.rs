use thiserror::Error;

use crate::AggregateIdentifier;

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Another writer appended to the stream since it was loaded.
    #[error(
        "Concurrency conflict for aggregate {aggregate}: expected tail {expected:?}, found {actual:?}"
    )]
    ConcurrencyConflict {
        aggregate: AggregateIdentifier,
        expected: Option<String>,
        actual: Option<String>,
    },

    /// The events handed to `save` cannot be appended as one batch.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Returns true for errors that a redelivery may resolve.
    pub fn is_concurrency(&self) -> bool {
        matches!(self, EventStoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
