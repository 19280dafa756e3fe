//! Error families shared by aggregates, sagas and views, and the aggregate
//! domain's own error type.

use common::AggregateIdentifier;
use event_store::EventStoreError;
use message::{BoxError, BusError, MessageError, MessageType};
use serde_json::{Value, json};
use thiserror::Error;

/// Business rule violations raised by entities and condition checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainErrorKind {
    AggregateAlreadyCreated,
    AggregateDestroyed,
    AggregateNotCreated,
    AggregateNotDestroyed,
    CommandSchemaValidation,
    SagaAlreadyCreated,
    SagaDestroyed,
    SagaNotCreated,
    ViewAlreadyCreated,
    ViewDestroyed,
    ViewNotCreated,
    /// Application-defined error, carrying its wire name.
    Custom(String),
}

impl DomainErrorKind {
    /// Wire name, used as the name of rejection events.
    pub fn name(&self) -> &str {
        match self {
            DomainErrorKind::AggregateAlreadyCreated => "AggregateAlreadyCreatedError",
            DomainErrorKind::AggregateDestroyed => "AggregateDestroyedError",
            DomainErrorKind::AggregateNotCreated => "AggregateNotCreatedError",
            DomainErrorKind::AggregateNotDestroyed => "AggregateNotDestroyedError",
            DomainErrorKind::CommandSchemaValidation => "CommandSchemaValidationError",
            DomainErrorKind::SagaAlreadyCreated => "SagaAlreadyCreatedError",
            DomainErrorKind::SagaDestroyed => "SagaDestroyedError",
            DomainErrorKind::SagaNotCreated => "SagaNotCreatedError",
            DomainErrorKind::ViewAlreadyCreated => "ViewAlreadyCreatedError",
            DomainErrorKind::ViewDestroyed => "ViewDestroyedError",
            DomainErrorKind::ViewNotCreated => "ViewNotCreatedError",
            DomainErrorKind::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for DomainErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A domain error.
///
/// Permanent errors end the business operation: the aggregate domain
/// publishes a rejection before propagating them, and the saga and view
/// domains absorb them after publishing a rejection. Non-permanent errors
/// are left to redelivery.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}: {message}", .kind.name())]
pub struct DomainError {
    kind: DomainErrorKind,
    message: String,
    permanent: bool,
    details: Option<Value>,
}

impl DomainError {
    pub fn new(kind: DomainErrorKind, message: impl Into<String>, permanent: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            permanent,
            details: None,
        }
    }

    /// Creates an application-defined error. Non-permanent unless marked.
    pub fn custom(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DomainErrorKind::Custom(name.into()), message, false)
    }

    pub fn aggregate_already_created() -> Self {
        Self::new(
            DomainErrorKind::AggregateAlreadyCreated,
            "Aggregate has already been created",
            true,
        )
    }

    pub fn aggregate_destroyed() -> Self {
        Self::new(
            DomainErrorKind::AggregateDestroyed,
            "Aggregate has been destroyed",
            true,
        )
    }

    pub fn aggregate_not_created() -> Self {
        Self::new(
            DomainErrorKind::AggregateNotCreated,
            "Aggregate has not been created",
            true,
        )
    }

    pub fn aggregate_not_destroyed() -> Self {
        Self::new(
            DomainErrorKind::AggregateNotDestroyed,
            "Aggregate was expected to be destroyed",
            true,
        )
    }

    pub fn command_schema_validation(reason: impl Into<String>) -> Self {
        Self::new(
            DomainErrorKind::CommandSchemaValidation,
            "Command schema validation error",
            true,
        )
        .with_details(json!({ "reason": reason.into() }))
    }

    pub fn saga_already_created(permanent: bool) -> Self {
        Self::new(
            DomainErrorKind::SagaAlreadyCreated,
            "Saga has already been created",
            permanent,
        )
    }

    pub fn saga_destroyed() -> Self {
        Self::new(DomainErrorKind::SagaDestroyed, "Saga has been destroyed", true)
    }

    pub fn saga_not_created(permanent: bool) -> Self {
        Self::new(
            DomainErrorKind::SagaNotCreated,
            "Saga has not been created",
            permanent,
        )
    }

    pub fn view_already_created(permanent: bool) -> Self {
        Self::new(
            DomainErrorKind::ViewAlreadyCreated,
            "View has already been created",
            permanent,
        )
    }

    pub fn view_destroyed() -> Self {
        Self::new(DomainErrorKind::ViewDestroyed, "View has been destroyed", true)
    }

    pub fn view_not_created(permanent: bool) -> Self {
        Self::new(
            DomainErrorKind::ViewNotCreated,
            "View has not been created",
            permanent,
        )
    }

    /// Marks the error permanent or transient.
    pub fn permanent(mut self, permanent: bool) -> Self {
        self.permanent = permanent;
        self
    }

    /// Attaches structured details, rendered into rejection payloads.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn kind(&self) -> &DomainErrorKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Renders the error for a rejection payload.
    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "name": self.name(),
            "message": self.message,
            "permanent": self.permanent,
        });
        if let Some(details) = &self.details {
            value["details"] = details.clone();
        }
        value
    }
}

/// Conditional-write conflicts in saga and view stores.
///
/// Always transient: the write should be retried by redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConcurrencyError {
    #[error("Saga {saga} is at an unexpected revision: expected {expected}, found {actual}")]
    SagaRevision {
        saga: AggregateIdentifier,
        expected: u64,
        actual: u64,
    },

    #[error("Saga {0} is not in the store")]
    SagaNotInStore(AggregateIdentifier),

    #[error("View {view} is at an unexpected revision: expected {expected}, found {actual}")]
    ViewRevision {
        view: AggregateIdentifier,
        expected: u64,
        actual: u64,
    },

    /// Another view in the collection already holds the unique index values.
    #[error("View {view} duplicates unique index [{index}] of collection {collection}")]
    ViewDuplicateKey {
        view: AggregateIdentifier,
        collection: String,
        index: String,
    },
}

/// How a failure is treated by the domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Conflicting write; logged and propagated, never rejected.
    Concurrency,
    /// Business rule violation.
    Domain { permanent: bool },
    /// Anything else; logged and propagated, never rejected.
    Fatal,
}

impl ErrorClass {
    /// Returns true for permanent domain errors.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ErrorClass::Domain { permanent: true })
    }

    /// Logs `error` at the level its class calls for.
    pub fn log(&self, error: &dyn std::error::Error, operation: &str) {
        match self {
            ErrorClass::Concurrency => {
                tracing::warn!(error = %error, "transient concurrency error while {operation}")
            }
            ErrorClass::Domain { permanent } => {
                tracing::warn!(error = %error, permanent = *permanent, "domain error while {operation}")
            }
            ErrorClass::Fatal => tracing::error!(error = %error, "failed while {operation}"),
        }
    }
}

/// Errors raised by aggregates and the aggregate domain.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Handler has not been registered: {0}")]
    HandlerNotRegistered(String),

    #[error("Handler has already been registered: {0}")]
    HandlerAlreadyRegistered(String),

    #[error("Message is not a valid type: expected {expected}, got {actual}")]
    MessageType {
        expected: MessageType,
        actual: MessageType,
    },

    #[error("Causation {0} produced no events in aggregate")]
    CausationMissingEvents(String),

    #[error("Event {event} does not target aggregate {aggregate}")]
    IdentityMismatch {
        event: String,
        aggregate: AggregateIdentifier,
    },

    #[error("Name must be lower camel case: {0}")]
    InvalidName(String),

    #[error("State data must be a JSON object, got {0}")]
    InvalidStateData(String),

    /// Failure raised by application handler code.
    #[error("Handler error: {0}")]
    Handler(BoxError),
}

impl AggregateError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AggregateError::Domain(err) => ErrorClass::Domain {
                permanent: err.is_permanent(),
            },
            AggregateError::EventStore(err) if err.is_concurrency() => ErrorClass::Concurrency,
            _ => ErrorClass::Fatal,
        }
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            AggregateError::Domain(err) => Some(err),
            _ => None,
        }
    }

    /// Wraps an arbitrary handler failure.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        AggregateError::Handler(err.into())
    }
}

/// Result type for aggregate operations.
pub type Result<T> = std::result::Result<T, AggregateError>;
