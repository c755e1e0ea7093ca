//! API routes

use axum::{routing::get, Router};

use super::handlers::{self, AppState};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health))

        // Statistics
        .route("/api/stats/current", get(handlers::current_stats))
        .route("/api/stats/history", get(handlers::history))

        // Request logs
        .route("/api/stats/logs", get(handlers::logs))

        // Models
        .route("/api/models", get(handlers::model_stats))

        // Configuration
        .route("/api/config", get(handlers::config))

        .with_state(state)
}
