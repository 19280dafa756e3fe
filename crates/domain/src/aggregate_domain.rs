//! Orchestrates command handling for aggregates.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;

use common::AggregateIdentifier;
use event_store::{AppendOptions, EventStore};
use message::{BoxError, Message, MessageBus, MessageType, Subscription, Topic};
use tokio::sync::RwLock;

use crate::aggregate::{Aggregate, EventHandlers};
use crate::error::{AggregateError, DomainError, Result};
use crate::handler::{AggregateCommandRegistration, AggregateEventRegistration, CommandContext};
use crate::listener::Listeners;
use crate::rejection::rejection;

/// Routes commands to their handlers and persists the resulting events.
///
/// Handling one command runs replay, validation, the handler, persistence
/// and publication in sequence. Concurrent writers are detected by the
/// event store's expected-tail check; the domain itself never retries.
pub struct AggregateDomain<S, B> {
    store: S,
    bus: Arc<B>,
    command_handlers: RwLock<HashMap<String, AggregateCommandRegistration>>,
    event_handlers: RwLock<HashMap<String, AggregateEventRegistration>>,
    listeners: Listeners<Aggregate, AggregateError>,
}

impl<S, B> AggregateDomain<S, B>
where
    S: EventStore + 'static,
    B: MessageBus + 'static,
{
    pub fn new(store: S, bus: Arc<B>) -> Arc<Self> {
        Arc::new(Self {
            store,
            bus,
            command_handlers: RwLock::new(HashMap::new()),
            event_handlers: RwLock::new(HashMap::new()),
            listeners: Listeners::new(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registers a command handler and subscribes it to the bus.
    ///
    /// Bus deliveries acknowledge permanent rejections, since the rejection
    /// event has already been published; every other failure is left to
    /// the bus for redelivery.
    pub async fn register_command_handler(
        self: &Arc<Self>,
        registration: AggregateCommandRegistration,
    ) -> Result<()> {
        let key = registration.key();
        let topic = Topic::new(registration.command.clone(), registration.aggregate.clone());
        let subscriber = registration.aggregate.clone();

        {
            let mut handlers = self.command_handlers.write().await;
            if handlers.contains_key(&key) {
                return Err(AggregateError::HandlerAlreadyRegistered(key));
            }
            handlers.insert(key.clone(), registration);
        }

        let domain: Weak<Self> = Arc::downgrade(self);
        self.bus
            .subscribe(Subscription::new(topic, subscriber, move |command| {
                let domain = domain.clone();
                async move {
                    let Some(domain) = domain.upgrade() else {
                        return Ok(());
                    };
                    match domain.handle_command(command).await {
                        Ok(_) => Ok(()),
                        Err(err) if err.class().is_permanent() => Ok(()),
                        Err(err) => Err(BoxError::from(err)),
                    }
                }
            }))
            .await?;

        tracing::debug!(%key, "aggregate command handler registered");
        Ok(())
    }

    pub async fn register_event_handler(
        &self,
        registration: AggregateEventRegistration,
    ) -> Result<()> {
        let key = registration.key();
        let mut handlers = self.event_handlers.write().await;
        if handlers.contains_key(&key) {
            return Err(AggregateError::HandlerAlreadyRegistered(key));
        }
        handlers.insert(key.clone(), registration);

        tracing::debug!(%key, "aggregate event handler registered");
        Ok(())
    }

    /// Registers a callback run after each successfully handled command.
    pub fn on_success<F>(&self, callback: F)
    where
        F: Fn(&Message, &Aggregate) + Send + Sync + 'static,
    {
        self.listeners.on_success(callback);
    }

    /// Registers a callback run after each failed command.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&AggregateError, &Message) + Send + Sync + 'static,
    {
        self.listeners.on_error(callback);
    }

    /// Handles one command end to end.
    ///
    /// Redelivering a command whose events are already stored skips the
    /// handler and republishes the stored events. Permanent domain errors
    /// publish a rejection event before being returned.
    #[tracing::instrument(
        skip(self, command),
        fields(command = %command.name(), command_id = %command.id(), aggregate = %command.aggregate())
    )]
    pub async fn handle_command(&self, command: Message) -> Result<Aggregate> {
        let start = Instant::now();
        metrics::counter!("aggregate_commands_total", "aggregate" => command.aggregate().name.clone())
            .increment(1);

        let result = self.try_handle_command(&command).await;

        metrics::histogram!("aggregate_command_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(aggregate) => {
                tracing::debug!("successfully handled command");
                self.listeners.emit_success(&command, &aggregate);
                Ok(aggregate)
            }
            Err(err) => {
                let class = err.class();
                class.log(&err, "handling command");
                self.listeners.emit_error(&err, &command);

                if let Some(domain_error) = err.as_domain()
                    && domain_error.is_permanent()
                {
                    self.reject_command(&command, domain_error).await?;
                }
                Err(err)
            }
        }
    }

    /// Rebuilds an aggregate from its stored events.
    pub async fn load(&self, identifier: &AggregateIdentifier) -> Result<Aggregate> {
        let handlers = self.event_handlers_for(identifier).await;
        let mut aggregate = Aggregate::new(identifier.clone(), handlers)?;

        for event in self.store.load(identifier).await? {
            aggregate.load(event)?;
        }

        tracing::debug!(
            aggregate = %identifier,
            events = aggregate.number_of_loaded_events(),
            "aggregate loaded"
        );
        Ok(aggregate)
    }

    async fn try_handle_command(&self, command: &Message) -> Result<Aggregate> {
        if !command.is_command() {
            return Err(AggregateError::MessageType {
                expected: MessageType::Command,
                actual: command.message_type(),
            });
        }

        let key = format!("{}.{}", command.aggregate().handler(), command.name());
        let registration = self
            .command_handlers
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(AggregateError::HandlerNotRegistered(key))?;

        let mut aggregate = self.load(command.aggregate()).await?;

        let already_handled = aggregate
            .events()
            .iter()
            .any(|event| event.causation_id() == command.id());

        if already_handled {
            tracing::info!("command already handled, republishing stored events");
        } else {
            registration
                .schema
                .validate(command.data())
                .map_err(DomainError::command_schema_validation)?;

            check_conditions(&aggregate, &registration)?;

            let mut ctx = CommandContext::new(command, &mut aggregate);
            registration.handler.handle(&mut ctx).await?;
        }

        let events = self.save(&aggregate, command).await?;
        self.bus.publish(events).await?;

        Ok(aggregate)
    }

    async fn save(&self, aggregate: &Aggregate, command: &Message) -> Result<Vec<Message>> {
        let events: Vec<Message> = aggregate
            .events()
            .iter()
            .filter(|event| event.causation_id() == command.id())
            .cloned()
            .collect();

        if events.is_empty() {
            return Err(AggregateError::CausationMissingEvents(command.id().to_string()));
        }

        let loaded = &aggregate.events()[..aggregate.number_of_loaded_events()];
        let saved = self.store.save(events, AppendOptions::after(loaded)).await?;

        tracing::debug!(events = saved.len(), "aggregate events saved");
        Ok(saved)
    }

    async fn reject_command(&self, command: &Message, error: &DomainError) -> Result<()> {
        metrics::counter!("aggregate_commands_rejected_total", "error" => error.name().to_string())
            .increment(1);

        let event = rejection(command, error, command.aggregate().clone(), true)?;
        if let Err(err) = self.bus.publish(vec![event]).await {
            tracing::error!(error = %err, "failed to reject command");
            return Err(err.into());
        }

        tracing::debug!(rejection = %error.name(), "rejected command");
        Ok(())
    }

    async fn event_handlers_for(&self, identifier: &AggregateIdentifier) -> EventHandlers {
        let kind = identifier.handler();
        self.event_handlers
            .read()
            .await
            .values()
            .filter(|registration| registration.aggregate == kind)
            .map(|registration| (registration.event.clone(), registration.handler.clone()))
            .collect()
    }
}

fn check_conditions(aggregate: &Aggregate, registration: &AggregateCommandRegistration) -> Result<()> {
    if aggregate.destroyed() {
        return Err(DomainError::aggregate_destroyed().into());
    }

    match registration.conditions.created {
        Some(true) if aggregate.events().is_empty() => {
            Err(DomainError::aggregate_not_created().into())
        }
        Some(false) if !aggregate.events().is_empty() => {
            Err(DomainError::aggregate_already_created().into())
        }
        _ => Ok(()),
    }
}
