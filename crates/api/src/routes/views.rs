//! View query endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use projections::{ViewData, ViewQuery};

use crate::app::App;
use crate::error::ApiError;

/// POST /views/query: returns the views matching the query body.
pub async fn query(
    State(app): State<Arc<App>>,
    Json(query): Json<ViewQuery>,
) -> Result<Json<Vec<ViewData>>, ApiError> {
    let views = app.query(&query).await?;
    tracing::debug!(view = %query.name, matches = views.len(), "view query");
    Ok(Json(views.iter().map(|view| view.to_data()).collect()))
}
