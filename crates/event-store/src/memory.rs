use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use message::Message;
use tokio::sync::RwLock;

use crate::{
    AggregateIdentifier, EventStoreError, Result,
    store::{AppendOptions, EventStore, validate_events_for_append},
};

/// In-memory event store implementation for testing.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<String, Vec<Message>>>>,
    save_attempts: Arc<RwLock<Vec<(Vec<Message>, AppendOptions)>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.streams.read().await.values().map(Vec::len).sum()
    }

    /// Returns every `save` call received, including rejected ones.
    pub async fn save_attempts(&self) -> Vec<(Vec<Message>, AppendOptions)> {
        self.save_attempts.read().await.clone()
    }

    /// Clears all streams and recorded attempts.
    pub async fn clear(&self) {
        self.streams.write().await.clear();
        self.save_attempts.write().await.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn save(&self, events: Vec<Message>, options: AppendOptions) -> Result<Vec<Message>> {
        self.save_attempts
            .write()
            .await
            .push((events.clone(), options.clone()));

        validate_events_for_append(&events)?;

        let first = &events[0];
        let aggregate = first.aggregate().clone();
        let causation_id = first.causation_id().to_string();

        let mut streams = self.streams.write().await;
        let stream = streams.entry(aggregate.key()).or_default();

        let actual = stream.last().map(|event| event.id().to_string());
        if actual != options.expected_tail {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate,
                expected: options.expected_tail,
                actual,
            });
        }

        if stream
            .iter()
            .any(|event| event.causation_id() == causation_id)
        {
            tracing::debug!(%aggregate, %causation_id, "causation already recorded");
        } else {
            metrics::counter!("event_store_appends_total").increment(1);
            stream.extend(events);
        }

        Ok(stream
            .iter()
            .filter(|event| event.causation_id() == causation_id)
            .cloned()
            .collect())
    }

    async fn load(&self, aggregate: &AggregateIdentifier) -> Result<Vec<Message>> {
        let streams = self.streams.read().await;
        Ok(streams.get(&aggregate.key()).cloned().unwrap_or_default())
    }
}
