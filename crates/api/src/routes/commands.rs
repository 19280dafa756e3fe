//! Command submission endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::AggregateIdentifier;
use message::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::App;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub name: String,
    pub aggregate: AggregateRequest,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// Target aggregate; a missing id creates a new one, a missing context
/// uses the configured domain context.
#[derive(Debug, Deserialize)]
pub struct AggregateRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAccepted {
    pub id: String,
    pub correlation_id: String,
    pub aggregate: AggregateIdentifier,
    pub events: Vec<String>,
}

/// POST /commands: handles a command and returns the events it produced.
#[tracing::instrument(skip(app, req), fields(command = %req.name, aggregate = %req.aggregate.name))]
pub async fn submit(
    State(app): State<Arc<App>>,
    Json(req): Json<CommandRequest>,
) -> Result<(StatusCode, Json<CommandAccepted>), ApiError> {
    let id = req
        .aggregate
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let aggregate = AggregateIdentifier::new(id, req.aggregate.name, req.aggregate.context);

    let mut builder = app
        .command(&req.name, aggregate)
        .data(req.data.unwrap_or_else(|| Value::Object(Default::default())));
    if let Some(correlation_id) = req.correlation_id {
        builder = builder.correlation_id(correlation_id);
    }
    let command: Message = builder.build()?;
    metrics::counter!("api_commands_received_total", "command" => command.name().to_string())
        .increment(1);

    let id = command.id().to_string();
    let correlation_id = command.correlation_id().to_string();
    let aggregate = app.handle_command(command).await?;

    let events = aggregate
        .events()
        .iter()
        .filter(|event| event.causation_id() == id)
        .map(|event| event.name().to_string())
        .collect();

    Ok((
        StatusCode::ACCEPTED,
        Json(CommandAccepted {
            id,
            correlation_id,
            aggregate: aggregate.aggregate_identifier().clone(),
            events,
        }),
    ))
}
