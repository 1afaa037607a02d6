use anyhow::Result;
use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::AppState;
use crate::api;
use crate::auth::caller_context_middleware;
use crate::config::{AppConfig, HealthConfig};
use crate::health::{liveness_handler, readiness_handler};
use crate::logging::trace_requests;
use crate::middleware::metrics_middleware;
use crate::observability::metrics_endpoint;

/// Bind the configured address and serve until SIGINT/SIGTERM
pub async fn start_server(config: AppConfig, state: AppState) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {}: {}. Is another process using this port?",
            bind_addr,
            e
        )
    })?;
    info!("Server successfully bound to {}", bind_addr);

    serve(listener, config, state, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, config: AppConfig, state: AppState, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let health = state.health.clone();
    let app = create_router(state, &config.health);

    health.mark_ready().await;
    info!(addr = ?listener.local_addr().ok(), "Accepting connections");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Routes plus the middleware stack
///
/// Outermost first: CORS, metrics, trace id and access log, caller
/// resolution.
pub fn create_router(state: AppState, health: &HealthConfig) -> Router {
    Router::new()
        .merge(api::routes())
        .route("/metrics", get(metrics_endpoint))
        .route(&health.liveness_path, get(liveness_handler))
        .route(&health.readiness_path, get(readiness_handler))
        .layer(middleware::from_fn_with_state(
            state.resolver.clone(),
            caller_context_middleware,
        ))
        .layer(middleware::from_fn(trace_requests))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), starting graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
