//! Rejection events published for permanent domain errors.

use common::AggregateIdentifier;
use message::{Message, MessageError};
use serde_json::json;

use crate::error::DomainError;

/// Builds the event announcing that `cause` was rejected with `error`.
///
/// The event is named after the error and its id is derived from the
/// cause, so redelivering the same cause yields the same rejection. The
/// payload carries the rendered error and the full causing message.
pub fn rejection(
    cause: &Message,
    error: &DomainError,
    aggregate: AggregateIdentifier,
    mandatory: bool,
) -> Result<Message, MessageError> {
    let id = format!("{}.{}", cause.id(), error.name());

    Message::event(error.name(), aggregate)
        .id(id.clone())
        .causation_id(id)
        .correlation_id(cause.correlation_id())
        .data(json!({
            "error": error.to_value(),
            "message": serde_json::to_value(cause)?,
        }))
        .mandatory(mandatory)
        .build()
}
