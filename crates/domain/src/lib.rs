//! Domain layer of the event-sourcing runtime.
//!
//! This crate provides:
//! - The error families shared by every domain (`DomainError`,
//!   `ConcurrencyError`, `ErrorClass`)
//! - The `Lifecycle` state machine used by aggregates, sagas and views
//! - The `Aggregate` entity, its handler contracts and `AggregateDomain`
//! - Typed success/error `Listeners` and command `Schema` validation

pub mod aggregate;
pub mod aggregate_domain;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod listener;
pub mod rejection;
pub mod schema;

pub use aggregate::{Aggregate, AggregateEventContext, EventHandlers};
pub use aggregate_domain::AggregateDomain;
pub use error::{
    AggregateError, ConcurrencyError, DomainError, DomainErrorKind, ErrorClass, Result,
};
pub use handler::{
    AggregateCommandRegistration, AggregateEventHandler, AggregateEventRegistration,
    CommandContext, CommandHandler, Conditions, command_handler_fn, event_handler_fn,
};
pub use lifecycle::Lifecycle;
pub use listener::Listeners;
pub use rejection::rejection;
pub use schema::{AnyObject, FieldType, ObjectSchema, Schema, schema_fn};
