//! HTTP server setup and routing
//!
//! Sets up the Axum HTTP server with routes for control endpoints and SSE.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::state::SharedState;
use crate::switcher::EngineHandle;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub handle: EngineHandle,
}

/// Build the application router.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))
        // Registry
        .route("/sources", get(super::handlers::get_sources))
        .route("/sources/add", post(super::handlers::add_source))
        .route("/sources/delete", post(super::handlers::delete_source))
        .route("/sources/move", post(super::handlers::move_source))
        .route("/sources/rename", post(super::handlers::rename_source))
        .route("/sources/duplicate", post(super::handlers::duplicate_source))
        .route("/sources/paste", post(super::handlers::paste_source))
        .route("/sources/store", post(super::handlers::store_source))
        .route("/sources/select", post(super::handlers::select_source))
        .route("/sources/init", post(super::handlers::init_registry))
        .route(
            "/sources/store-default",
            post(super::handlers::store_default),
        )
        // Switcher
        .route("/switcher/take", post(super::handlers::take))
        .route("/switcher/state", get(super::handlers::get_switcher_state))
        .route(
            "/switcher/queue/clear",
            post(super::handlers::clear_pending),
        )
        .route(
            "/switcher/queue/skip-to-last",
            post(super::handlers::skip_to_last_pending),
        )
        .route(
            "/switcher/done-signal",
            post(super::handlers::done_signal),
        )
        .route("/switcher/telemetry", post(super::handlers::telemetry))
        // Safety gate
        .route("/safety/toggle", post(super::handlers::toggle_safety))
        // Switch log ring
        .route("/log", get(super::handlers::get_log))
        .route("/log/clear", post(super::handlers::clear_log))
        // Import/export
        .route("/transfer/import", post(super::handlers::import_sources))
        .route("/transfer/export", get(super::handlers::export_sources))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        // Attach application context
        .with_state(ctx)
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until shutdown.
pub async fn run(config: &Config, state: Arc<SharedState>, handle: EngineHandle) -> Result<()> {
    let ctx = AppContext { state, handle };
    let app = router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
