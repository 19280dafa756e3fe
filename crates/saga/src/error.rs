//! Saga error types.

use domain::{ConcurrencyError, DomainError, ErrorClass};
use message::{BoxError, BusError, MessageError, MessageType};
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Business rule violation raised by a condition or a handler.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Conditional write against the saga store failed.
    #[error("Concurrency error: {0}")]
    Concurrency(#[from] ConcurrencyError),

    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    #[error("Handler has not been registered: {0}")]
    HandlerNotRegistered(String),

    #[error("Handler has already been registered: {0}")]
    HandlerAlreadyRegistered(String),

    #[error("Message is not a valid type: expected {expected}, got {actual}")]
    MessageType {
        expected: MessageType,
        actual: MessageType,
    },

    #[error("Saga name must be lower camel case: {0}")]
    InvalidName(String),

    #[error("State data must be a JSON object, got {0}")]
    InvalidStateData(String),

    /// Failure raised by application handler code.
    #[error("Handler error: {0}")]
    Handler(BoxError),
}

impl SagaError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SagaError::Domain(err) => ErrorClass::Domain {
                permanent: err.is_permanent(),
            },
            SagaError::Concurrency(_) => ErrorClass::Concurrency,
            _ => ErrorClass::Fatal,
        }
    }

    /// Wraps an arbitrary handler failure.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        SagaError::Handler(err.into())
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
