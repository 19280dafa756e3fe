use async_trait::async_trait;
use message::Message;

use crate::{AggregateIdentifier, EventStoreError, Result};

/// Options for appending events to a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendOptions {
    /// Id of the last event the writer saw in the stream, `None` when the
    /// writer saw an empty stream. The append fails with
    /// `ConcurrencyConflict` if the stream's actual tail differs.
    pub expected_tail: Option<String>,
}

impl AppendOptions {
    /// Creates options expecting the stream to be empty (new aggregate).
    pub fn expect_new() -> Self {
        Self::default()
    }

    /// Creates options expecting the stream to end with `event_id`.
    pub fn expect_tail(event_id: impl Into<String>) -> Self {
        Self {
            expected_tail: Some(event_id.into()),
        }
    }

    /// Creates options from the events a writer loaded before appending.
    pub fn after(loaded: &[Message]) -> Self {
        Self {
            expected_tail: loaded.last().map(|event| event.id().to_string()),
        }
    }
}

/// Core trait for event store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends the events produced by one causation.
    ///
    /// The batch must be non-empty, contain only events for a single
    /// aggregate and share one causation id. If that causation was already
    /// recorded the stream is left untouched; either way the stored events
    /// for the causation are returned.
    async fn save(&self, events: Vec<Message>, options: AppendOptions) -> Result<Vec<Message>>;

    /// Returns the full ordered history of an aggregate.
    async fn load(&self, aggregate: &AggregateIdentifier) -> Result<Vec<Message>>;
}

/// Validates a batch before appending.
pub fn validate_events_for_append(events: &[Message]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "Cannot append empty event list".to_string(),
        ));
    };

    for event in events {
        if !event.is_event() {
            return Err(EventStoreError::InvalidAppend(format!(
                "Message {} is a {}, not an event",
                event.id(),
                event.message_type()
            )));
        }
        if event.aggregate() != first.aggregate() {
            return Err(EventStoreError::InvalidAppend(
                "All events must be for the same aggregate".to_string(),
            ));
        }
        if event.causation_id() != first.causation_id() {
            return Err(EventStoreError::InvalidAppend(
                "All events must share one causation".to_string(),
            ));
        }
    }

    Ok(())
}
