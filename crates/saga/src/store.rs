//! Saga persistence contract and the in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateIdentifier;
use domain::ConcurrencyError;
use message::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::saga::{Saga, SagaData};

/// Options applied when a saga is saved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaSaveOptions {
    /// Keep only the most recent N causation ids; `None` keeps all.
    pub causations_cap: Option<usize>,
}

impl SagaSaveOptions {
    pub fn with_causations_cap(cap: usize) -> Self {
        Self {
            causations_cap: Some(cap),
        }
    }
}

/// Storage for saga snapshots.
///
/// Writes are conditional on the saga's revision: the revision carried by
/// the saga must equal the stored one (0 when absent), and each successful
/// write increments it.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Persists the saga's state and outbox, recording `causation` as handled.
    ///
    /// Saving an already-recorded causation returns the stored saga
    /// unchanged.
    async fn save(
        &self,
        saga: &Saga,
        causation: &Message,
        options: &SagaSaveOptions,
    ) -> Result<Saga>;

    /// Returns the stored saga, or `None` if it was never saved.
    async fn load(&self, identifier: &AggregateIdentifier) -> Result<Option<Saga>>;

    /// Empties the stored outbox after its messages were published.
    async fn clear_messages_to_dispatch(&self, saga: &Saga) -> Result<Saga>;
}

/// A recorded call to [`SagaStore::save`].
#[derive(Debug, Clone, PartialEq)]
pub struct SaveAttempt {
    pub saga: SagaData,
    pub causation: Message,
    pub options: SagaSaveOptions,
}

/// In-memory saga store for testing.
#[derive(Clone, Default)]
pub struct InMemorySagaStore {
    sagas: Arc<RwLock<HashMap<String, SagaData>>>,
    save_attempts: Arc<RwLock<Vec<SaveAttempt>>>,
    clear_attempts: Arc<RwLock<Vec<SagaData>>>,
}

impl InMemorySagaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every `save` call received, including rejected ones.
    pub async fn save_attempts(&self) -> Vec<SaveAttempt> {
        self.save_attempts.read().await.clone()
    }

    /// Returns every `clear_messages_to_dispatch` call received.
    pub async fn clear_attempts(&self) -> Vec<SagaData> {
        self.clear_attempts.read().await.clone()
    }

    pub async fn saga_count(&self) -> usize {
        self.sagas.read().await.len()
    }

    pub async fn clear(&self) {
        self.sagas.write().await.clear();
        self.save_attempts.write().await.clear();
        self.clear_attempts.write().await.clear();
    }
}

fn check_revision(saga: &Saga, stored: Option<&SagaData>) -> Result<()> {
    let actual = stored.map_or(0, |data| data.revision);
    if saga.revision() != actual {
        return Err(ConcurrencyError::SagaRevision {
            saga: saga.saga_identifier().clone(),
            expected: saga.revision(),
            actual,
        }
        .into());
    }
    Ok(())
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn save(
        &self,
        saga: &Saga,
        causation: &Message,
        options: &SagaSaveOptions,
    ) -> Result<Saga> {
        self.save_attempts.write().await.push(SaveAttempt {
            saga: saga.to_data(),
            causation: causation.clone(),
            options: *options,
        });

        let key = Saga::identifier(saga.saga_identifier());
        let mut sagas = self.sagas.write().await;
        let stored = sagas.get(&key);

        if let Some(data) = stored
            && data.causation_list.iter().any(|id| id == causation.id())
        {
            tracing::debug!(%key, causation_id = %causation.id(), "causation already recorded");
            return Saga::from_data(data.clone());
        }

        check_revision(saga, stored)?;

        let mut data = saga.to_data();
        data.causation_list.push(causation.id().to_string());
        if let Some(cap) = options.causations_cap
            && cap > 0
            && data.causation_list.len() > cap
        {
            let excess = data.causation_list.len() - cap;
            data.causation_list.drain(..excess);
        }
        data.revision += 1;

        sagas.insert(key, data.clone());
        Saga::from_data(data)
    }

    async fn load(&self, identifier: &AggregateIdentifier) -> Result<Option<Saga>> {
        let sagas = self.sagas.read().await;
        sagas
            .get(&Saga::identifier(identifier))
            .cloned()
            .map(Saga::from_data)
            .transpose()
    }

    async fn clear_messages_to_dispatch(&self, saga: &Saga) -> Result<Saga> {
        self.clear_attempts.write().await.push(saga.to_data());

        let key = Saga::identifier(saga.saga_identifier());
        let mut sagas = self.sagas.write().await;
        let Some(stored) = sagas.get(&key) else {
            return Err(ConcurrencyError::SagaNotInStore(saga.saga_identifier().clone()).into());
        };

        check_revision(saga, Some(stored))?;

        let mut data = saga.to_data();
        data.messages_to_dispatch.clear();
        data.revision += 1;

        sagas.insert(key, data.clone());
        Saga::from_data(data)
    }
}
