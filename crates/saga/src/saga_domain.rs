//! Orchestrates event handling for sagas.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use common::HandlerIdentifier;
use domain::{ConcurrencyError, Conditions, DomainError, Listeners, rejection};
use message::{BoxError, Message, MessageBus, Subscription, Topic};
use tokio::sync::{Mutex, RwLock};

use crate::error::{Result, SagaError};
use crate::handler::{SagaContext, SagaEventRegistration, SagaHandler, handler_key};
use crate::saga::Saga;
use crate::store::SagaStore;

/// Result of running a handler against a loaded saga.
enum Handled {
    /// The handler's changes were saved.
    Saved(Saga),
    /// A permanent domain error discarded the changes; the untouched saga
    /// carries a rejection in its outbox.
    Rejected(Saga),
}

/// Routes events to saga handlers and publishes their outboxes.
pub struct SagaDomain<S, B> {
    store: S,
    bus: Arc<B>,
    handlers: RwLock<HashMap<String, SagaHandler>>,
    listeners: Listeners<Saga, SagaError>,
    /// Outbox messages being published, as `"{saga key}:{message id}"`.
    in_flight: Mutex<HashSet<String>>,
}

impl<S, B> SagaDomain<S, B>
where
    S: SagaStore + 'static,
    B: MessageBus + 'static,
{
    pub fn new(store: S, bus: Arc<B>) -> Arc<Self> {
        Arc::new(Self {
            store,
            bus,
            handlers: RwLock::new(HashMap::new()),
            listeners: Listeners::new(),
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registers a handler for every context of its aggregate target and
    /// subscribes each one to the bus.
    pub async fn register_event_handler(
        self: &Arc<Self>,
        registration: SagaEventRegistration,
    ) -> Result<()> {
        let expanded = registration.expand();

        {
            let mut handlers = self.handlers.write().await;
            if let Some(existing) = expanded
                .iter()
                .map(SagaHandler::key)
                .find(|key| handlers.contains_key(key))
            {
                return Err(SagaError::HandlerAlreadyRegistered(existing));
            }
            for handler in &expanded {
                handlers.insert(handler.key(), handler.clone());
            }
        }

        for handler in expanded {
            let topic = Topic::new(handler.event.clone(), handler.aggregate.clone());
            let saga = handler.saga.clone();
            let domain: Weak<Self> = Arc::downgrade(self);

            self.bus
                .subscribe(Subscription::new(topic, saga.clone(), move |event| {
                    let domain = domain.clone();
                    let saga = saga.clone();
                    async move {
                        let Some(domain) = domain.upgrade() else {
                            return Ok(());
                        };
                        domain
                            .handle_event(event, &saga)
                            .await
                            .map(|_| ())
                            .map_err(BoxError::from)
                    }
                }))
                .await?;

            tracing::debug!(key = %handler.key(), "saga event handler registered");
        }

        Ok(())
    }

    /// Registers a callback run after each saved and published saga.
    pub fn on_success<F>(&self, callback: F)
    where
        F: Fn(&Message, &Saga) + Send + Sync + 'static,
    {
        self.listeners.on_success(callback);
    }

    /// Registers a callback run after each failed event, including
    /// absorbed permanent rejections.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&SagaError, &Message) + Send + Sync + 'static,
    {
        self.listeners.on_error(callback);
    }

    /// Handles one event for the saga kind `saga`.
    ///
    /// A redelivered event skips the handler and only republishes the
    /// stored outbox. Permanent domain errors are absorbed: the saga is not
    /// saved and a rejection event is published instead.
    #[tracing::instrument(
        skip(self, event, saga),
        fields(event = %event.name(), event_id = %event.id(), saga = %saga)
    )]
    pub async fn handle_event(&self, event: Message, saga: &HandlerIdentifier) -> Result<Saga> {
        metrics::counter!("saga_events_total", "saga" => saga.name.clone()).increment(1);

        match self.try_handle_event(&event, saga).await {
            Ok(Handled::Saved(saved)) => {
                tracing::debug!(revision = saved.revision(), "saga saved and handled event");
                self.listeners.emit_success(&event, &saved);
                Ok(saved)
            }
            Ok(Handled::Rejected(untouched)) => Ok(untouched),
            Err(err) => {
                err.class().log(&err, "handling saga event");
                self.listeners.emit_error(&err, &event);
                Err(err)
            }
        }
    }

    async fn try_handle_event(&self, event: &Message, saga: &HandlerIdentifier) -> Result<Handled> {
        let key = handler_key(&event.aggregate().handler(), event.name(), saga);
        let handler = self
            .handlers
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(SagaError::HandlerNotRegistered(key))?;

        let identifier = saga.with_id((handler.get_saga_id)(event));
        let loaded = match self.store.load(&identifier).await? {
            Some(loaded) => loaded,
            None => Saga::new(identifier)?,
        };

        if loaded.has_handled(event.id()) {
            tracing::info!("event already handled, publishing stored messages");
            let published = self.publish_messages(loaded).await?;
            return Ok(Handled::Saved(published));
        }

        let handled = self.handle_saga(loaded, event, &handler).await?;
        Ok(match handled {
            Handled::Saved(saga) => Handled::Saved(self.publish_messages(saga).await?),
            Handled::Rejected(saga) => Handled::Rejected(self.publish_messages(saga).await?),
        })
    }

    async fn handle_saga(
        &self,
        mut saga: Saga,
        event: &Message,
        handler: &SagaHandler,
    ) -> Result<Handled> {
        let untouched = saga.clone();

        match self.run_handler(&mut saga, event, handler).await {
            Ok(saved) => Ok(Handled::Saved(saved)),
            Err(SagaError::Domain(err)) if err.is_permanent() => {
                self.reject_event(untouched, event, err).map(Handled::Rejected)
            }
            Err(err) => Err(err),
        }
    }

    async fn run_handler(
        &self,
        saga: &mut Saga,
        event: &Message,
        handler: &SagaHandler,
    ) -> Result<Saga> {
        check_conditions(saga, &handler.conditions)?;

        let mut ctx = SagaContext::new(event, saga);
        handler.handler.handle(&mut ctx).await?;

        tracing::debug!(
            messages = saga.messages_to_dispatch().len(),
            "saga handler finished"
        );
        self.store.save(saga, event, &handler.save_options).await
    }

    fn reject_event(&self, mut untouched: Saga, event: &Message, err: DomainError) -> Result<Saga> {
        metrics::counter!("saga_events_rejected_total", "error" => err.name().to_string())
            .increment(1);

        let message = rejection(event, &err, untouched.saga_identifier().clone(), false)?;
        untouched.enqueue(message);

        let err = SagaError::Domain(err);
        err.class().log(&err, "handling saga event");
        self.listeners.emit_error(&err, event);
        Ok(untouched)
    }

    /// Publishes the outbox and, for stored sagas, clears it in the store.
    ///
    /// Messages already being published for this saga by an enclosing call
    /// (a handler reacting to the saga's own commands) are left to that
    /// call, which clears the outbox once their delivery succeeded.
    async fn publish_messages(&self, saga: Saga) -> Result<Saga> {
        let (pending, deferred) = self.claim(&saga).await;
        if pending.is_empty() {
            if deferred {
                tracing::debug!("outbox is already being published");
            }
            return Ok(saga);
        }

        let ids: HashSet<String> = pending.iter().map(|message| message.id().to_string()).collect();
        let published = self.bus.publish(pending).await;
        self.release(&saga, &ids).await;
        published?;

        if deferred || saga.revision() == 0 {
            return Ok(saga);
        }
        self.clear_published(saga, &ids).await
    }

    /// Marks the outbox messages not yet in flight and returns them, along
    /// with whether any were skipped.
    async fn claim(&self, saga: &Saga) -> (Vec<Message>, bool) {
        let key = Saga::identifier(saga.saga_identifier());
        let mut in_flight = self.in_flight.lock().await;

        let mut pending = Vec::new();
        let mut deferred = false;
        for message in saga.messages_to_dispatch() {
            if in_flight.insert(format!("{key}:{}", message.id())) {
                pending.push(message.clone());
            } else {
                deferred = true;
            }
        }
        (pending, deferred)
    }

    async fn release(&self, saga: &Saga, ids: &HashSet<String>) {
        let key = Saga::identifier(saga.saga_identifier());
        let mut in_flight = self.in_flight.lock().await;
        for id in ids {
            in_flight.remove(&format!("{key}:{id}"));
        }
    }

    async fn clear_published(&self, saga: Saga, published: &HashSet<String>) -> Result<Saga> {
        match self.store.clear_messages_to_dispatch(&saga).await {
            Err(SagaError::Concurrency(ConcurrencyError::SagaRevision { .. })) => {}
            cleared => return cleared,
        }

        // Saved again while its outbox was being delivered; only clear what
        // this call has delivered.
        let identifier = saga.saga_identifier();
        let current = self
            .store
            .load(identifier)
            .await?
            .ok_or_else(|| ConcurrencyError::SagaNotInStore(identifier.clone()))?;

        if current
            .messages_to_dispatch()
            .iter()
            .all(|message| published.contains(message.id()))
        {
            self.store.clear_messages_to_dispatch(&current).await
        } else {
            tracing::debug!(
                revision = current.revision(),
                "outbox gained messages while publishing, leaving it in place"
            );
            Ok(current)
        }
    }
}

fn check_conditions(saga: &Saga, conditions: &Conditions) -> Result<()> {
    if saga.destroyed() {
        return Err(DomainError::saga_destroyed().into());
    }

    match conditions.created {
        Some(true) if saga.revision() < 1 => {
            Err(DomainError::saga_not_created(conditions.permanent == Some(true)).into())
        }
        Some(false) if saga.revision() > 0 => {
            Err(DomainError::saga_already_created(conditions.permanent != Some(false)).into())
        }
        _ => Ok(()),
    }
}
