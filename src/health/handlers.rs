use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use tracing::debug;

use super::{HealthManager, HealthResponse, HealthStatus};

pub const SERVICE_VERSION: &str = "1.0.0";

/// Liveness probe: the process is up
pub async fn liveness_handler() -> &'static str {
    debug!("Liveness check requested");
    "OK"
}

/// Readiness probe with per-service detail
///
/// `Starting` is served as 200 only during the startup grace period.
pub async fn readiness_handler(
    State(health_manager): State<HealthManager>,
) -> Result<Json<HealthResponse>, StatusCode> {
    debug!("Readiness check requested");

    let health = health_manager.get_health().await;
    match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => Ok(Json(health)),
        HealthStatus::Starting if health_manager.is_in_startup_period() => Ok(Json(health)),
        HealthStatus::Starting | HealthStatus::Unhealthy => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub status: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: &'static str,
}

/// `GET /api/health`
pub async fn api_health_handler() -> Json<ServiceStatus> {
    Json(ServiceStatus {
        status: "healthy",
        timestamp: chrono::Utc::now(),
        version: SERVICE_VERSION,
    })
}
