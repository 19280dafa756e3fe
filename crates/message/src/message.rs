use std::time::Duration;

use chrono::{DateTime, Utc};
use common::AggregateIdentifier;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::MessageError;

/// Kind of a message on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Command,
    Event,
    Timeout,
    #[default]
    Unknown,
}

impl MessageType {
    /// Returns the wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Command => "command",
            MessageType::Event => "event",
            MessageType::Timeout => "timeout",
            MessageType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Immutable envelope for commands, domain events and timeouts.
///
/// `causation_id` points at the message that provoked this one (its own id
/// for a root message); `correlation_id` is shared by every message of one
/// business transaction. Both are fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: String,
    name: String,
    #[serde(rename = "type", default)]
    message_type: MessageType,
    aggregate: AggregateIdentifier,
    causation_id: String,
    correlation_id: String,
    #[serde(default = "empty_object")]
    data: Value,
    #[serde(default)]
    delay: u64,
    #[serde(default)]
    mandatory: bool,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Starts building a message of the given type.
    pub fn builder(
        message_type: MessageType,
        name: impl Into<String>,
        aggregate: AggregateIdentifier,
    ) -> MessageBuilder {
        MessageBuilder::new(message_type, name, aggregate)
    }

    /// Starts building a command addressed to `aggregate`.
    pub fn command(name: impl Into<String>, aggregate: AggregateIdentifier) -> MessageBuilder {
        MessageBuilder::new(MessageType::Command, name, aggregate)
    }

    /// Starts building a domain event emitted by `aggregate`.
    pub fn event(name: impl Into<String>, aggregate: AggregateIdentifier) -> MessageBuilder {
        MessageBuilder::new(MessageType::Event, name, aggregate)
    }

    /// Starts building a timeout addressed to `aggregate`.
    pub fn timeout(name: impl Into<String>, aggregate: AggregateIdentifier) -> MessageBuilder {
        MessageBuilder::new(MessageType::Timeout, name, aggregate)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn aggregate(&self) -> &AggregateIdentifier {
        &self.aggregate
    }

    pub fn causation_id(&self) -> &str {
        &self.causation_id
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Delivery delay in milliseconds.
    pub fn delay_ms(&self) -> u64 {
        self.delay
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay)
    }

    pub fn mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_command(&self) -> bool {
        self.message_type == MessageType::Command
    }

    pub fn is_event(&self) -> bool {
        self.message_type == MessageType::Event
    }

    pub fn is_timeout(&self) -> bool {
        self.message_type == MessageType::Timeout
    }

    /// Returns true if this message has no causation other than itself.
    pub fn is_root(&self) -> bool {
        self.causation_id == self.id
    }
}

/// Builder for [`Message`].
///
/// Unset fields resolve at [`build`](MessageBuilder::build):
/// - `id`: a fresh v4 UUID
/// - `causation_id`: the causation's id, else the message's own id
/// - `correlation_id`: the causation's correlation id, else a fresh UUID
/// - `data`: `{}`
/// - `timestamp`: now
///
/// Commands and timeouts are always mandatory.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message_type: MessageType,
    name: String,
    aggregate: AggregateIdentifier,
    id: Option<String>,
    causation_id: Option<String>,
    correlation_id: Option<String>,
    causation: Option<(String, String)>,
    data: Option<Value>,
    delay: u64,
    mandatory: bool,
    timestamp: Option<DateTime<Utc>>,
}

impl MessageBuilder {
    fn new(
        message_type: MessageType,
        name: impl Into<String>,
        aggregate: AggregateIdentifier,
    ) -> Self {
        Self {
            message_type,
            name: name.into(),
            aggregate,
            id: None,
            causation_id: None,
            correlation_id: None,
            causation: None,
            data: None,
            delay: 0,
            mandatory: false,
            timestamp: None,
        }
    }

    /// Sets the message id. If not set, a new UUID is generated.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the payload. It must be a JSON object.
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the delivery delay in milliseconds.
    pub fn delay_ms(mut self, delay: u64) -> Self {
        self.delay = delay;
        self
    }

    pub fn mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }

    /// Sets the timestamp. If not set, the current time is used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Overrides the causation id regardless of any causing message.
    pub fn causation_id(mut self, causation_id: impl Into<String>) -> Self {
        self.causation_id = Some(causation_id.into());
        self
    }

    /// Overrides the correlation id regardless of any causing message.
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Links this message to the message that provoked it.
    pub fn caused_by(mut self, causation: &Message) -> Self {
        self.causation = Some((
            causation.id().to_string(),
            causation.correlation_id().to_string(),
        ));
        self
    }

    /// Fills in the aggregate context if it was left empty.
    pub fn default_context(mut self, context: &str) -> Self {
        if self.aggregate.context.is_empty() {
            self.aggregate.context = context.to_string();
        }
        self
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn aggregate(&self) -> &AggregateIdentifier {
        &self.aggregate
    }

    /// Builds the message.
    pub fn build(self) -> Result<Message, MessageError> {
        if self.name.is_empty() {
            return Err(MessageError::MissingName);
        }

        let data = self.data.unwrap_or_else(empty_object);
        if !data.is_object() {
            return Err(MessageError::InvalidData(data.to_string()));
        }

        let id = self.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let (causation, correlation) = match self.causation {
            Some((causation, correlation)) => (Some(causation), Some(correlation)),
            None => (None, None),
        };
        let causation_id = self
            .causation_id
            .or(causation)
            .unwrap_or_else(|| id.clone());
        let correlation_id = self
            .correlation_id
            .or(correlation)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mandatory = match self.message_type {
            MessageType::Command | MessageType::Timeout => true,
            MessageType::Event | MessageType::Unknown => self.mandatory,
        };

        Ok(Message {
            id,
            name: self.name,
            message_type: self.message_type,
            aggregate: self.aggregate,
            causation_id,
            correlation_id,
            data,
            delay: self.delay,
            mandatory,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        })
    }
}
