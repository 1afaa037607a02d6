//! JSON endpoints under `/api`

use axum::{
    routing::{get, post},
    Router,
};

use crate::health::api_health_handler;
use crate::server::AppState;

pub mod handlers;
pub mod models;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/calculate", post(handlers::calculate))
        .route("/api/calculator", post(handlers::calculator))
        .route("/api/fibonacci", post(handlers::fibonacci))
        .route("/api/factorial", post(handlers::factorial))
        .route("/api/cache/stats", get(handlers::cache_stats))
        .route("/api/cache/clear", post(handlers::clear_cache))
        .route("/api/history", get(handlers::history))
        .route("/api/analytics", get(handlers::analytics))
        .route("/api/sessions/{session_id}", get(handlers::session))
        .route("/api/login", post(handlers::login))
        .route("/api/logout", post(handlers::logout))
        .route("/api/auth/status", get(handlers::auth_status))
        .route("/api/health", get(api_health_handler))
}
