//! Route table.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/analyze", post(handlers::analyze))
        .route("/api/models", get(handlers::list_models))
        .route(
            "/api/cache",
            get(handlers::list_cache).delete(handlers::reset_cache),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
