//! Composition of the three domains over one shared message bus.

use std::sync::Arc;

use common::{AggregateIdentifier, AggregateTarget, HandlerIdentifier};
use domain::{
    Aggregate, AggregateCommandRegistration, AggregateDomain, AggregateEventRegistration,
};
use event_store::InMemoryEventStore;
use message::{InMemoryMessageBus, Message, MessageBuilder, MessageBus, MessageType};
use projections::{InMemoryViewStore, View, ViewDomain, ViewEventRegistration, ViewQuery};
use saga::{InMemorySagaStore, SagaDomain, SagaEventRegistration};

use crate::config::Config;
use crate::error::{ApiError, Result};

pub type Aggregates = AggregateDomain<InMemoryEventStore, InMemoryMessageBus>;
pub type Sagas = SagaDomain<InMemorySagaStore, InMemoryMessageBus>;
pub type Views = ViewDomain<InMemoryViewStore, InMemoryMessageBus>;

/// The runtime: aggregate, saga and view domains sharing one bus.
///
/// Registrations that leave a context empty are assigned the configured
/// domain context.
pub struct App {
    config: Config,
    bus: Arc<InMemoryMessageBus>,
    aggregates: Arc<Aggregates>,
    sagas: Arc<Sagas>,
    views: Arc<Views>,
}

impl App {
    /// Wires the domains over in-memory stores.
    pub fn new(config: Config) -> Self {
        let bus = Arc::new(InMemoryMessageBus::with_retry_policy(config.retry_policy()));
        let aggregates = AggregateDomain::new(InMemoryEventStore::new(), bus.clone());
        let sagas = SagaDomain::new(InMemorySagaStore::new(), bus.clone());
        let views = ViewDomain::new(InMemoryViewStore::new(), bus.clone());

        tracing::info!(
            context = %config.domain_context,
            retry = ?config.retry_policy(),
            "application wired"
        );

        Self {
            config,
            bus,
            aggregates,
            sagas,
            views,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &Arc<InMemoryMessageBus> {
        &self.bus
    }

    pub fn aggregates(&self) -> &Arc<Aggregates> {
        &self.aggregates
    }

    pub fn sagas(&self) -> &Arc<Sagas> {
        &self.sagas
    }

    pub fn views(&self) -> &Arc<Views> {
        &self.views
    }

    /// Publishes a command on the bus.
    pub async fn publish(&self, command: Message) -> Result<()> {
        ensure_command(&command)?;
        self.bus.publish(vec![command]).await?;
        Ok(())
    }

    /// Handles a command directly, returning the resulting aggregate.
    ///
    /// The produced events still go through the bus to sagas and views.
    pub async fn handle_command(&self, command: Message) -> Result<Aggregate> {
        ensure_command(&command)?;
        Ok(self.aggregates.handle_command(command).await?)
    }

    pub async fn query(&self, query: &ViewQuery) -> Result<Vec<View>> {
        Ok(self.views.query(query).await?)
    }

    pub async fn register_command_handler(
        &self,
        mut registration: AggregateCommandRegistration,
    ) -> Result<()> {
        self.default_handler_context(&mut registration.aggregate);
        Ok(self.aggregates.register_command_handler(registration).await?)
    }

    pub async fn register_aggregate_event_handler(
        &self,
        mut registration: AggregateEventRegistration,
    ) -> Result<()> {
        self.default_handler_context(&mut registration.aggregate);
        Ok(self.aggregates.register_event_handler(registration).await?)
    }

    pub async fn register_saga_handler(&self, mut registration: SagaEventRegistration) -> Result<()> {
        self.default_target_contexts(&mut registration.aggregate);
        self.default_handler_context(&mut registration.saga);
        Ok(self.sagas.register_event_handler(registration).await?)
    }

    pub async fn register_view_handler(&self, mut registration: ViewEventRegistration) -> Result<()> {
        self.default_target_contexts(&mut registration.aggregate);
        self.default_handler_context(&mut registration.view);
        Ok(self.views.register_event_handler(registration).await?)
    }

    /// Builds a command for `name` on `aggregate`, defaulting its context.
    pub fn command(&self, name: &str, aggregate: AggregateIdentifier) -> MessageBuilder {
        Message::command(name, aggregate).default_context(&self.config.domain_context)
    }

    fn default_handler_context(&self, identifier: &mut HandlerIdentifier) {
        if identifier.context.is_empty() {
            identifier.context = self.config.domain_context.clone();
        }
    }

    fn default_target_contexts(&self, target: &mut AggregateTarget) {
        if target.contexts.is_empty() {
            target.contexts.push(String::new());
        }
        for context in target.contexts.iter_mut().filter(|context| context.is_empty()) {
            *context = self.config.domain_context.clone();
        }
    }
}

fn ensure_command(message: &Message) -> Result<()> {
    if message.is_command() {
        return Ok(());
    }
    Err(ApiError::BadRequest(format!(
        "expected a {} message, got {}",
        MessageType::Command.as_str(),
        message.message_type().as_str()
    )))
}
