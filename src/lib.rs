pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod observability;
pub mod schema;
pub mod server;
pub mod services;

pub use config::*;
pub use error::*;
pub use server::*;

use anyhow::Result;

use crate::observability::{init_metrics, MetricsConfig};

/// Install metrics, open storage and serve until shutdown.
///
/// Logging must already be initialized.
pub async fn run_server(config: AppConfig) -> Result<()> {
    if config.metrics.enabled {
        init_metrics(MetricsConfig {
            environment: config.environment.as_str().to_string(),
            ip_allowlist: config.metrics.ip_allowlist.clone(),
        })?;
        ::tracing::info!("Prometheus recorder installed");
    }

    let state = server::build_state(&config).await?;
    server::start_server(config, state).await
}
