use super::handlers;
use super::state::AppState;
use super::stream;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Per-call duplex media channel
        .route("/stream", get(stream::stream_handler))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
