//! Handler traits and registrations for aggregates.

use std::sync::Arc;

use async_trait::async_trait;
use common::HandlerIdentifier;
use message::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregate::{Aggregate, AggregateEventContext};
use crate::error::{DomainError, Result};
use crate::schema::{AnyObject, Schema};

/// Preconditions checked before a handler runs.
///
/// `created` is compared against whether the entity already exists. For
/// sagas and views, `permanent` overrides the permanence of the resulting
/// not-created/already-created errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    pub created: Option<bool>,
    pub permanent: Option<bool>,
}

impl Conditions {
    /// No preconditions.
    pub fn none() -> Self {
        Self::default()
    }

    /// Requires the entity to exist.
    pub fn created() -> Self {
        Self {
            created: Some(true),
            permanent: None,
        }
    }

    /// Requires the entity not to exist yet.
    pub fn not_created() -> Self {
        Self {
            created: Some(false),
            permanent: None,
        }
    }

    pub fn permanent(mut self, permanent: bool) -> Self {
        self.permanent = Some(permanent);
        self
    }
}

/// Folds one event into aggregate state.
///
/// Event handlers replay history, so they must be deterministic and must
/// not perform I/O.
pub trait AggregateEventHandler: Send + Sync {
    fn handle(&self, ctx: &mut AggregateEventContext<'_>) -> Result<()>;
}

/// Closure-backed [`AggregateEventHandler`].
pub struct EventHandlerFn<F>(F);

impl<F> AggregateEventHandler for EventHandlerFn<F>
where
    F: Fn(&mut AggregateEventContext<'_>) -> Result<()> + Send + Sync,
{
    fn handle(&self, ctx: &mut AggregateEventContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }
}

/// Wraps a closure as an aggregate event handler.
pub fn event_handler_fn<F>(f: F) -> EventHandlerFn<F>
where
    F: Fn(&mut AggregateEventContext<'_>) -> Result<()> + Send + Sync,
{
    EventHandlerFn(f)
}

/// Decides which events a command produces.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> Result<()>;
}

/// Closure-backed [`CommandHandler`] for handlers that do not await.
pub struct CommandHandlerFn<F>(F);

#[async_trait]
impl<F> CommandHandler for CommandHandlerFn<F>
where
    F: Fn(&mut CommandContext<'_>) -> Result<()> + Send + Sync,
{
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }
}

/// Wraps a synchronous closure as a command handler.
pub fn command_handler_fn<F>(f: F) -> CommandHandlerFn<F>
where
    F: Fn(&mut CommandContext<'_>) -> Result<()> + Send + Sync,
{
    CommandHandlerFn(f)
}

/// Handle given to command handlers.
pub struct CommandContext<'a> {
    command: &'a Message,
    state: Value,
    aggregate: &'a mut Aggregate,
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(command: &'a Message, aggregate: &'a mut Aggregate) -> Self {
        Self {
            command,
            state: aggregate.state().clone(),
            aggregate,
        }
    }

    pub fn command(&self) -> &Message {
        self.command
    }

    /// Aggregate state as it was when the handler started.
    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn aggregate(&self) -> &Aggregate {
        self.aggregate
    }

    /// Applies an event caused by the command.
    pub fn apply(&mut self, name: &str, data: Value) -> Result<()> {
        self.aggregate.apply(self.command, name, data)
    }

    /// Fails with `error` unless `condition` holds.
    pub fn ensure(&self, condition: bool, error: impl FnOnce() -> DomainError) -> Result<()> {
        if condition {
            Ok(())
        } else {
            Err(error().into())
        }
    }
}

/// A command handler bound to an aggregate kind.
#[derive(Clone)]
pub struct AggregateCommandRegistration {
    pub aggregate: HandlerIdentifier,
    pub command: String,
    pub conditions: Conditions,
    pub schema: Arc<dyn Schema>,
    pub handler: Arc<dyn CommandHandler>,
}

impl AggregateCommandRegistration {
    /// Registers `handler` for `command` with no conditions and any-object schema.
    pub fn new(
        aggregate: HandlerIdentifier,
        command: impl Into<String>,
        handler: impl CommandHandler + 'static,
    ) -> Self {
        Self {
            aggregate,
            command: command.into(),
            conditions: Conditions::none(),
            schema: Arc::new(AnyObject),
            handler: Arc::new(handler),
        }
    }

    pub fn conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn schema(mut self, schema: impl Schema + 'static) -> Self {
        self.schema = Arc::new(schema);
        self
    }

    /// Returns `"{context}.{name}.{command}"`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.aggregate, self.command)
    }
}

/// An event handler bound to an aggregate kind.
#[derive(Clone)]
pub struct AggregateEventRegistration {
    pub aggregate: HandlerIdentifier,
    pub event: String,
    pub handler: Arc<dyn AggregateEventHandler>,
}

impl AggregateEventRegistration {
    pub fn new(
        aggregate: HandlerIdentifier,
        event: impl Into<String>,
        handler: impl AggregateEventHandler + 'static,
    ) -> Self {
        Self {
            aggregate,
            event: event.into(),
            handler: Arc::new(handler),
        }
    }

    /// Returns `"{context}.{name}.{event}"`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.aggregate, self.event)
    }
}
