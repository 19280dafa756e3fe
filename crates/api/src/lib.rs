//! HTTP API server with observability for the event-sourcing runtime.
//!
//! Wires the aggregate, saga and view domains over one shared message bus
//! ([`App`]), registers the bundled greeting domain and exposes commands
//! and view queries over HTTP, with structured logging (tracing) and
//! Prometheus metrics.

pub mod app;
pub mod config;
pub mod error;
pub mod greeting;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use app::App;
pub use config::{Config, LogFormat};
pub use error::{ApiError, Result};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(app: Arc<App>, metrics_handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(routes::health::check))
        .route("/commands", post(routes::commands::submit))
        .route("/views/query", post(routes::views::query))
        .with_state(app)
        .merge(routes::metrics::router(metrics_handle))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application with the greeting domain registered.
pub async fn create_default_app(config: Config) -> Result<Arc<App>> {
    let app = App::new(config);
    greeting::register(&app).await?;
    Ok(Arc::new(app))
}
