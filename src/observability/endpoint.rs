use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension,
};

use super::recorder::{get_metrics_manager, MetricsManager};
use crate::auth::CallerContext;

/// `GET /metrics`
pub async fn metrics_endpoint(Extension(caller): Extension<CallerContext>) -> Response {
    let manager = match get_metrics_manager() {
        Ok(manager) => manager,
        Err(e) => {
            tracing::error!("Metrics manager not initialized: {}", e);
            return (StatusCode::SERVICE_UNAVAILABLE, "Metrics not available").into_response();
        }
    };

    render_metrics(&manager, caller.ip_address.as_deref())
}

/// Render the exposition text if `client_ip` passes the allowlist
pub fn render_metrics(manager: &MetricsManager, client_ip: Option<&str>) -> Response {
    let client_ip = client_ip.unwrap_or("unknown");

    if !manager.is_ip_allowed(client_ip) {
        tracing::warn!(client_ip = %client_ip, "Metrics access denied: IP not in allowlist");
        return (StatusCode::FORBIDDEN, "Access denied: IP not authorized").into_response();
    }

    let metrics_content = manager.render();
    tracing::debug!(
        client_ip = %client_ip,
        metrics_size = metrics_content.len(),
        "Metrics served"
    );

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics_content,
    )
        .into_response()
}
