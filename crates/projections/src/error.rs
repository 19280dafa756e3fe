//! View error types.

use domain::{ConcurrencyError, DomainError, ErrorClass};
use message::{BoxError, BusError, MessageError};
use thiserror::Error;

/// Errors that can occur while maintaining views.
#[derive(Debug, Error)]
pub enum ViewError {
    /// Business rule violation raised by a condition or a handler.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Conditional write against the view store failed.
    #[error("Concurrency error: {0}")]
    Concurrency(#[from] ConcurrencyError),

    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    /// A removal found no element to remove.
    #[error("{message} at path {path}")]
    FieldNotFound { path: String, message: String },

    /// An array operation addressed a value that is not an array.
    #[error("Value at path {0} is not an array")]
    NotAnArray(String),

    #[error("Handler has not been registered: {0}")]
    HandlerNotRegistered(String),

    #[error("Handler has already been registered: {0}")]
    HandlerAlreadyRegistered(String),

    #[error("View name must be lower camel case: {0}")]
    InvalidName(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure raised by application handler code.
    #[error("Handler error: {0}")]
    Handler(BoxError),
}

impl ViewError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ViewError::Domain(err) => ErrorClass::Domain {
                permanent: err.is_permanent(),
            },
            ViewError::Concurrency(_) => ErrorClass::Concurrency,
            _ => ErrorClass::Fatal,
        }
    }

    /// Wraps an arbitrary handler failure.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        ViewError::Handler(err.into())
    }
}

/// Result type for view operations.
pub type Result<T> = std::result::Result<T, ViewError>;
