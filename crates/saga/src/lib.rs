//! Sagas: process managers that react to domain events.
//!
//! A saga handler receives an event, updates the saga's state and queues
//! commands or timeouts in the saga's outbox. The outbox is saved together
//! with the state and published afterwards, so a crash between the two
//! steps only leads to a republish on redelivery.

pub mod error;
pub mod handler;
pub mod saga;
pub mod saga_domain;
pub mod store;

pub use error::{Result, SagaError};
pub use handler::{
    HandlerFn, SagaContext, SagaEventHandler, SagaEventRegistration, SagaIdFn, handler_fn,
};
pub use saga::{Saga, SagaData};
pub use saga_domain::SagaDomain;
pub use store::{InMemorySagaStore, SagaSaveOptions, SagaStore, SaveAttempt};
