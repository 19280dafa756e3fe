//! Event-sourced aggregate entity.

use std::collections::HashMap;
use std::sync::Arc;

use common::{AggregateIdentifier, is_camel_case, state};
use message::{Message, MessageType};
use serde_json::Value;

use crate::error::{AggregateError, DomainError, Result};
use crate::handler::AggregateEventHandler;
use crate::lifecycle::Lifecycle;

/// Event handlers of one aggregate kind, keyed by event name.
pub type EventHandlers = HashMap<String, Arc<dyn AggregateEventHandler>>;

/// An aggregate whose state is derived by replaying its events.
///
/// An instance lives for one command-handling cycle: it is rebuilt with
/// [`load`](Aggregate::load) from the stored stream, then advanced by the
/// events applied while handling the current command.
pub struct Aggregate {
    identifier: AggregateIdentifier,
    lifecycle: Lifecycle,
    events: Vec<Message>,
    number_of_loaded_events: usize,
    state: Value,
    handlers: EventHandlers,
}

impl Aggregate {
    /// Creates an empty aggregate. The name must be lower camel case.
    pub fn new(identifier: AggregateIdentifier, handlers: EventHandlers) -> Result<Self> {
        if !is_camel_case(&identifier.name) {
            return Err(AggregateError::InvalidName(identifier.name));
        }

        Ok(Self {
            identifier,
            lifecycle: Lifecycle::Active,
            events: Vec::new(),
            number_of_loaded_events: 0,
            state: Value::Object(Default::default()),
            handlers,
        })
    }

    /// Returns the storage key `"{context}.{name}.{id}"`.
    pub fn identifier(identifier: &AggregateIdentifier) -> String {
        identifier.key()
    }

    pub fn id(&self) -> &str {
        &self.identifier.id
    }

    pub fn name(&self) -> &str {
        &self.identifier.name
    }

    pub fn context(&self) -> &str {
        &self.identifier.context
    }

    pub fn aggregate_identifier(&self) -> &AggregateIdentifier {
        &self.identifier
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn destroyed(&self) -> bool {
        self.lifecycle.is_terminal()
    }

    pub fn destroying(&self) -> bool {
        self.lifecycle.is_pending_destruction()
    }

    /// Every handled event, loaded ones first.
    pub fn events(&self) -> &[Message] {
        &self.events
    }

    /// Number of leading events that came from the store.
    pub fn number_of_loaded_events(&self) -> usize {
        self.number_of_loaded_events
    }

    /// Events handled since loading.
    pub fn new_events(&self) -> &[Message] {
        &self.events[self.number_of_loaded_events..]
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    /// Builds an event caused by `causation` and handles it.
    pub fn apply(&mut self, causation: &Message, name: &str, data: Value) -> Result<()> {
        tracing::debug!(
            aggregate = %self.identifier,
            causation_id = %causation.id(),
            name,
            "applying event"
        );

        let event = Message::event(name, self.identifier.clone())
            .data(data)
            .caused_by(causation)
            .build()?;
        self.handle_event(event)
    }

    /// Replays a stored event.
    pub fn load(&mut self, event: Message) -> Result<()> {
        self.handle_event(event)?;
        self.number_of_loaded_events += 1;
        Ok(())
    }

    fn handle_event(&mut self, event: Message) -> Result<()> {
        if !event.is_event() {
            return Err(AggregateError::MessageType {
                expected: MessageType::Event,
                actual: event.message_type(),
            });
        }

        if self.destroyed() {
            return Err(DomainError::aggregate_destroyed().into());
        }

        let was_pending = self.destroying();

        if event.aggregate() != &self.identifier {
            return Err(AggregateError::IdentityMismatch {
                event: event.id().to_string(),
                aggregate: self.identifier.clone(),
            });
        }

        let handler = self
            .handlers
            .get(event.name())
            .cloned()
            .ok_or_else(|| {
                AggregateError::HandlerNotRegistered(format!(
                    "{}.{}",
                    self.identifier.handler(),
                    event.name()
                ))
            })?;

        let mut ctx = AggregateEventContext {
            event: &event,
            state: self.state.clone(),
            aggregate: self,
        };
        handler.handle(&mut ctx)?;

        if was_pending && !self.destroyed() {
            return Err(DomainError::aggregate_not_destroyed().into());
        }

        self.events.push(event);
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.lifecycle = self
            .lifecycle
            .transition(Lifecycle::Destroyed)
            .ok_or_else(DomainError::aggregate_destroyed)?;
        Ok(())
    }

    fn destroy_next(&mut self) -> Result<()> {
        self.lifecycle = self
            .lifecycle
            .transition(Lifecycle::PendingDestruction)
            .ok_or_else(DomainError::aggregate_destroyed)?;
        Ok(())
    }

    fn merge_state(&mut self, data: Value) -> Result<()> {
        if !data.is_object() {
            return Err(AggregateError::InvalidStateData(data.to_string()));
        }
        if self.destroyed() {
            return Err(DomainError::aggregate_destroyed().into());
        }
        state::merge(&mut self.state, data);
        Ok(())
    }

    fn set_state(&mut self, path: &str, value: Value) -> Result<()> {
        if self.destroyed() {
            return Err(DomainError::aggregate_destroyed().into());
        }
        state::set(&mut self.state, path, value);
        Ok(())
    }
}

impl std::fmt::Debug for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregate")
            .field("identifier", &self.identifier)
            .field("lifecycle", &self.lifecycle)
            .field("events", &self.events.len())
            .field("number_of_loaded_events", &self.number_of_loaded_events)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Handle given to aggregate event handlers.
///
/// `state()` is a snapshot taken before the handler ran; mutations go
/// through the methods and apply to the aggregate directly.
pub struct AggregateEventContext<'a> {
    event: &'a Message,
    state: Value,
    aggregate: &'a mut Aggregate,
}

impl AggregateEventContext<'_> {
    pub fn event(&self) -> &Message {
        self.event
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    /// Deep-merges `data` (a JSON object) into the state.
    pub fn merge_state(&mut self, data: Value) -> Result<()> {
        self.aggregate.merge_state(data)
    }

    pub fn set_state(&mut self, path: &str, value: Value) -> Result<()> {
        self.aggregate.set_state(path, value)
    }

    /// Destroys the aggregate; no event is accepted afterwards.
    pub fn destroy(&mut self) -> Result<()> {
        self.aggregate.destroy()
    }

    /// Requires the next handled event to destroy the aggregate.
    pub fn destroy_next(&mut self) -> Result<()> {
        self.aggregate.destroy_next()
    }
}
