//! Axum router configuration.

use std::sync::Arc;

use axum::{Router, routing::post};

use crate::{handlers, state::AppState};

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/messages", post(handlers::receive_activity))
        .with_state(app_state)
}
