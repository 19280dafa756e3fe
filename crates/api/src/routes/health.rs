//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::app::App;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub context: String,
    pub subscriptions: usize,
}

/// GET /health: returns runtime status and the number of bus subscriptions.
pub async fn check(State(app): State<Arc<App>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        context: app.config().domain_context.clone(),
        subscriptions: app.bus().subscriptions().await.len(),
    })
}
