use thiserror::Error;

use crate::bus::BoxError;

/// Errors raised while constructing or decoding messages.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Message payloads must be JSON objects.
    #[error("Message data must be a JSON object, got {0}")]
    InvalidData(String),

    /// A message was built without a name.
    #[error("Message name is required")]
    MissingName,

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by message bus implementations.
#[derive(Debug, Error)]
pub enum BusError {
    /// A subscriber kept failing until the retry policy gave up.
    #[error(
        "Delivery of message {message_id} ({name}) to {subscriber} failed after {attempts} attempts: {source}"
    )]
    DeliveryFailed {
        message_id: String,
        name: String,
        subscriber: String,
        attempts: u32,
        #[source]
        source: BoxError,
    },
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
