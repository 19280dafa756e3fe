//! Saga entity with its durable outbox.

use common::{AggregateIdentifier, is_camel_case, state};
use domain::{DomainError, Lifecycle};
use message::{Message, MessageBuilder, MessageType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SagaError};

/// Serializable snapshot of a saga, as kept by saga stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaData {
    pub id: String,
    pub name: String,
    pub context: String,
    #[serde(default)]
    pub causation_list: Vec<String>,
    #[serde(default)]
    pub messages_to_dispatch: Vec<Message>,
    #[serde(default)]
    pub destroyed: bool,
    #[serde(default)]
    pub revision: u64,
    #[serde(default = "empty_state")]
    pub state: Value,
}

fn empty_state() -> Value {
    Value::Object(Default::default())
}

/// A process manager reacting to domain events.
///
/// Commands and timeouts dispatched by a handler are queued in
/// `messages_to_dispatch` and persisted together with the state change;
/// they are published only after the store accepted the write.
#[derive(Debug, Clone, PartialEq)]
pub struct Saga {
    identifier: AggregateIdentifier,
    causation_list: Vec<String>,
    messages_to_dispatch: Vec<Message>,
    lifecycle: Lifecycle,
    revision: u64,
    state: Value,
}

impl Saga {
    /// Creates a saga that has never been stored.
    pub fn new(identifier: AggregateIdentifier) -> Result<Self> {
        if !is_camel_case(&identifier.name) {
            return Err(SagaError::InvalidName(identifier.name));
        }

        Ok(Self {
            identifier,
            causation_list: Vec::new(),
            messages_to_dispatch: Vec::new(),
            lifecycle: Lifecycle::Active,
            revision: 0,
            state: empty_state(),
        })
    }

    /// Restores a saga from a stored snapshot.
    pub fn from_data(data: SagaData) -> Result<Self> {
        let mut saga = Self::new(AggregateIdentifier::new(data.id, data.name, data.context))?;
        saga.causation_list = data.causation_list;
        saga.messages_to_dispatch = data.messages_to_dispatch;
        saga.lifecycle = if data.destroyed {
            Lifecycle::Destroyed
        } else {
            Lifecycle::Active
        };
        saga.revision = data.revision;
        saga.state = data.state;
        Ok(saga)
    }

    pub fn to_data(&self) -> SagaData {
        SagaData {
            id: self.identifier.id.clone(),
            name: self.identifier.name.clone(),
            context: self.identifier.context.clone(),
            causation_list: self.causation_list.clone(),
            messages_to_dispatch: self.messages_to_dispatch.clone(),
            destroyed: self.destroyed(),
            revision: self.revision,
            state: self.state.clone(),
        }
    }

    /// Returns the storage key `"{context}.{name}.{id}"`.
    pub fn identifier(identifier: &AggregateIdentifier) -> String {
        identifier.key()
    }

    pub fn saga_identifier(&self) -> &AggregateIdentifier {
        &self.identifier
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

    /// Ids of the events this saga has handled.
    pub fn causation_list(&self) -> &[String] {
        &self.causation_list
    }

    pub fn has_handled(&self, causation_id: &str) -> bool {
        self.causation_list.iter().any(|id| id == causation_id)
    }

    /// Messages recorded but not yet published.
    pub fn messages_to_dispatch(&self) -> &[Message] {
        &self.messages_to_dispatch
    }

    pub fn destroyed(&self) -> bool {
        self.lifecycle.is_terminal()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn destroy(&mut self) -> Result<()> {
        tracing::debug!(saga = %self.identifier, "destroying saga");

        self.lifecycle = self
            .lifecycle
            .transition(Lifecycle::Destroyed)
            .ok_or_else(DomainError::saga_destroyed)?;
        Ok(())
    }

    /// Queues a command caused by `causation`.
    ///
    /// The command's aggregate context defaults to the saga's context.
    pub fn dispatch(&mut self, causation: &Message, command: MessageBuilder) -> Result<()> {
        if command.message_type() != MessageType::Command {
            return Err(SagaError::MessageType {
                expected: MessageType::Command,
                actual: command.message_type(),
            });
        }
        self.ensure_active()?;

        let command = command
            .default_context(&self.identifier.context)
            .caused_by(causation)
            .build()?;

        tracing::debug!(
            saga = %self.identifier,
            command = %command.name(),
            target = %command.aggregate(),
            "dispatching command"
        );
        self.messages_to_dispatch.push(command);
        Ok(())
    }

    /// Queues a timeout addressed back to this saga, delivered after `delay_ms`.
    pub fn timeout(
        &mut self,
        causation: &Message,
        name: &str,
        data: Value,
        delay_ms: u64,
    ) -> Result<()> {
        self.ensure_active()?;

        let timeout = Message::timeout(name, self.identifier.clone())
            .data(data)
            .delay_ms(delay_ms)
            .caused_by(causation)
            .build()?;

        tracing::debug!(saga = %self.identifier, name, delay_ms, "dispatching timeout");
        self.messages_to_dispatch.push(timeout);
        Ok(())
    }

    /// Deep-merges `data` (a JSON object) into the state.
    pub fn merge_state(&mut self, data: Value) -> Result<()> {
        if !data.is_object() {
            return Err(SagaError::InvalidStateData(data.to_string()));
        }
        self.ensure_active()?;
        state::merge(&mut self.state, data);
        Ok(())
    }

    pub fn set_state(&mut self, path: &str, value: Value) -> Result<()> {
        self.ensure_active()?;
        state::set(&mut self.state, path, value);
        Ok(())
    }

    /// Appends a message to the outbox without any lifecycle check.
    pub(crate) fn enqueue(&mut self, message: Message) {
        self.messages_to_dispatch.push(message);
    }

    fn ensure_active(&self) -> Result<()> {
        if self.destroyed() {
            return Err(DomainError::saga_destroyed().into());
        }
        Ok(())
    }
}
