//! Saga event handlers and their registrations.

use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateTarget, HandlerIdentifier};
use domain::Conditions;
use message::{Message, MessageBuilder};
use serde_json::Value;

use crate::error::Result;
use crate::saga::Saga;
use crate::store::SagaSaveOptions;

/// Derives the saga instance id from an incoming event.
pub type SagaIdFn = Arc<dyn Fn(&Message) -> String + Send + Sync>;

/// Reacts to one event on behalf of a saga.
#[async_trait]
pub trait SagaEventHandler: Send + Sync {
    async fn handle(&self, ctx: &mut SagaContext<'_>) -> Result<()>;
}

/// Closure-backed [`SagaEventHandler`] for handlers that do not await.
pub struct HandlerFn<F>(F);

#[async_trait]
impl<F> SagaEventHandler for HandlerFn<F>
where
    F: Fn(&mut SagaContext<'_>) -> Result<()> + Send + Sync,
{
    async fn handle(&self, ctx: &mut SagaContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }
}

/// Wraps a synchronous closure as a saga event handler.
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&mut SagaContext<'_>) -> Result<()> + Send + Sync,
{
    HandlerFn(f)
}

/// Handle given to saga event handlers.
///
/// Dispatch and timeout calls are linked to the event being handled.
pub struct SagaContext<'a> {
    event: &'a Message,
    state: Value,
    saga: &'a mut Saga,
}

impl<'a> SagaContext<'a> {
    pub(crate) fn new(event: &'a Message, saga: &'a mut Saga) -> Self {
        Self {
            event,
            state: saga.state().clone(),
            saga,
        }
    }

    pub fn event(&self) -> &Message {
        self.event
    }

    /// Saga state as it was when the handler started.
    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn saga(&self) -> &Saga {
        self.saga
    }

    pub fn destroy(&mut self) -> Result<()> {
        self.saga.destroy()
    }

    /// Queues a command for publication once the saga is saved.
    pub fn dispatch(&mut self, command: MessageBuilder) -> Result<()> {
        self.saga.dispatch(self.event, command)
    }

    pub fn merge_state(&mut self, data: Value) -> Result<()> {
        self.saga.merge_state(data)
    }

    pub fn set_state(&mut self, path: &str, value: Value) -> Result<()> {
        self.saga.set_state(path, value)
    }

    /// Queues a timeout addressed to this saga.
    pub fn timeout(&mut self, name: &str, data: Value, delay_ms: u64) -> Result<()> {
        self.saga.timeout(self.event, name, data, delay_ms)
    }
}

/// A saga event handler bound to an event of an aggregate kind.
///
/// The target may list several contexts; registration fans out to one
/// handler and one subscription per context.
#[derive(Clone)]
pub struct SagaEventRegistration {
    pub aggregate: AggregateTarget,
    pub event: String,
    pub saga: HandlerIdentifier,
    pub conditions: Conditions,
    pub get_saga_id: SagaIdFn,
    pub save_options: SagaSaveOptions,
    pub handler: Arc<dyn SagaEventHandler>,
}

impl SagaEventRegistration {
    /// Creates a registration keyed on the event's aggregate id.
    pub fn new(
        aggregate: impl Into<AggregateTarget>,
        event: impl Into<String>,
        saga: HandlerIdentifier,
        handler: impl SagaEventHandler + 'static,
    ) -> Self {
        Self {
            aggregate: aggregate.into(),
            event: event.into(),
            saga,
            conditions: Conditions::none(),
            get_saga_id: Arc::new(|event: &Message| event.aggregate().id.clone()),
            save_options: SagaSaveOptions::default(),
            handler: Arc::new(handler),
        }
    }

    pub fn conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// Overrides how the saga id is derived from an event.
    pub fn saga_id_from<F>(mut self, f: F) -> Self
    where
        F: Fn(&Message) -> String + Send + Sync + 'static,
    {
        self.get_saga_id = Arc::new(f);
        self
    }

    pub fn save_options(mut self, options: SagaSaveOptions) -> Self {
        self.save_options = options;
        self
    }

    /// Expands the registration into one handler per aggregate context.
    pub(crate) fn expand(&self) -> Vec<SagaHandler> {
        self.aggregate
            .handlers()
            .map(|aggregate| SagaHandler {
                aggregate,
                event: self.event.clone(),
                saga: self.saga.clone(),
                conditions: self.conditions,
                get_saga_id: self.get_saga_id.clone(),
                save_options: self.save_options,
                handler: self.handler.clone(),
            })
            .collect()
    }
}

/// A registration narrowed to a single aggregate context.
#[derive(Clone)]
pub(crate) struct SagaHandler {
    pub aggregate: HandlerIdentifier,
    pub event: String,
    pub saga: HandlerIdentifier,
    pub conditions: Conditions,
    pub get_saga_id: SagaIdFn,
    pub save_options: SagaSaveOptions,
    pub handler: Arc<dyn SagaEventHandler>,
}

impl SagaHandler {
    pub fn key(&self) -> String {
        handler_key(&self.aggregate, &self.event, &self.saga)
    }
}

/// Returns `"{aggregate context}.{aggregate}.{event}:{saga context}.{saga}"`.
pub(crate) fn handler_key(aggregate: &HandlerIdentifier, event: &str, saga: &HandlerIdentifier) -> String {
    format!("{aggregate}.{event}:{saga}")
}
