//! Shared building blocks for the event-sourcing runtime.
//!
//! - [`AggregateIdentifier`] and [`HandlerIdentifier`] address entities and handlers
//! - [`naming`] enforces the lower-camel-case entity naming rule
//! - [`state`] provides path-addressable operations over JSON state trees

pub mod naming;
pub mod state;
pub mod types;

pub use naming::is_camel_case;
pub use types::{AggregateIdentifier, AggregateTarget, HandlerIdentifier};
