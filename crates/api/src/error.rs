//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{AggregateError, ErrorClass};
use message::{BusError, MessageError};
use projections::ViewError;
use saga::SagaError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request from the client.
    #[error("{0}")]
    BadRequest(String),

    /// No handler or resource for the request.
    #[error("{0}")]
    NotFound(String),

    /// Command handling failed.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// Saga registration or handling failed.
    #[error(transparent)]
    Saga(#[from] SagaError),

    /// View registration, handling or query failed.
    #[error(transparent)]
    View(#[from] ViewError),

    /// The message bus gave up on a delivery.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl ApiError {
    /// HTTP status for this error.
    ///
    /// Domain rejections are `422`, optimistic-concurrency conflicts `409`.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Aggregate(AggregateError::HandlerNotRegistered(_)) => StatusCode::NOT_FOUND,
            ApiError::Aggregate(AggregateError::MessageType { .. } | AggregateError::InvalidName(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Aggregate(err) => class_status(err.class()),
            ApiError::Saga(err) => class_status(err.class()),
            ApiError::View(err) => class_status(err.class()),
            ApiError::Bus(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire name of the underlying domain error, if any.
    fn domain_name(&self) -> Option<&str> {
        match self {
            ApiError::Aggregate(err) => err.as_domain().map(|err| err.name()),
            ApiError::Saga(SagaError::Domain(err)) | ApiError::View(ViewError::Domain(err)) => {
                Some(err.name())
            }
            _ => None,
        }
    }
}

fn class_status(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Domain { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorClass::Concurrency => StatusCode::CONFLICT,
        ErrorClass::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "internal server error");
        }

        let mut body = serde_json::json!({ "error": self.to_string() });
        if let Some(name) = self.domain_name() {
            body["name"] = name.into();
        }
        (status, axum::Json(body)).into_response()
    }
}

impl From<MessageError> for ApiError {
    fn from(err: MessageError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
