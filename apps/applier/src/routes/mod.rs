pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use crate::workflow::handlers;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Session lifecycle
        .route("/api/v1/session", get(handlers::handle_get_session))
        .route("/api/v1/login", post(handlers::handle_start_login))
        .route("/api/v1/login/verify", post(handlers::handle_submit_code))
        .route("/api/v1/login/cancel", post(handlers::handle_cancel_login))
        .route("/api/v1/logout", post(handlers::handle_logout))
        // Bulk apply
        .route("/api/v1/apply", post(handlers::handle_bulk_apply))
        .route("/api/v1/progress", get(handlers::handle_get_progress))
        .with_state(state)
}
