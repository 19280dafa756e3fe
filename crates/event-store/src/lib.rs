//! Event store contract for event-sourced aggregates.
//!
//! Streams are keyed by aggregate identity. Writes are idempotent by
//! causation id and guarded by the expected tail of the stream.

pub mod error;
pub mod memory;
pub mod store;

pub use common::AggregateIdentifier;
pub use error::{EventStoreError, Result};
pub use memory::InMemoryEventStore;
pub use store::{AppendOptions, EventStore, validate_events_for_append};
