//! Message envelopes and the publish/subscribe contract.
//!
//! - [`Message`] is the immutable envelope shared by commands, domain events
//!   and timeouts, built through [`MessageBuilder`]
//! - [`MessageBus`] is the transport contract; [`InMemoryMessageBus`] is the
//!   in-process implementation used by tests and the bundled application

pub mod bus;
pub mod error;
pub mod memory;
pub mod message;

pub use bus::{BoxError, MessageBus, RetryPolicy, Subscription, Topic};
pub use common::{AggregateIdentifier, HandlerIdentifier};
pub use error::{BusError, MessageError, Result};
pub use memory::InMemoryMessageBus;
pub use message::{Message, MessageBuilder, MessageType};
