use anyhow::{anyhow, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Arc, OnceLock};

/// Settings for the Prometheus recorder
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Value of the `environment` global label
    pub environment: String,
    /// Client IPs allowed to scrape `/metrics`; `None` allows everyone
    pub ip_allowlist: Option<Vec<String>>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            ip_allowlist: None,
        }
    }
}

pub struct MetricsManager {
    handle: PrometheusHandle,
    config: MetricsConfig,
}

impl MetricsManager {
    fn builder(config: &MetricsConfig) -> PrometheusBuilder {
        PrometheusBuilder::new()
            .add_global_label("service", "calc-api")
            .add_global_label("environment", &config.environment)
            .add_global_label("version", env!("CARGO_PKG_VERSION"))
    }

    /// Build a recorder and install it as the global `metrics` recorder
    pub fn install(config: MetricsConfig) -> Result<Self> {
        let recorder = Self::builder(&config).build_recorder();
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder)
            .map_err(|e| anyhow!("Failed to install Prometheus recorder: {}", e))?;

        tracing::info!(
            environment = %config.environment,
            allowlist = ?config.ip_allowlist,
            "Prometheus metrics recorder initialized"
        );

        Ok(Self { handle, config })
    }

    /// Recorder that is rendered but never installed globally
    pub fn detached(config: MetricsConfig) -> Self {
        let handle = Self::builder(&config).build_recorder().handle();
        Self { handle, config }
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn is_ip_allowed(&self, ip: &str) -> bool {
        match &self.config.ip_allowlist {
            Some(allowlist) => allowlist.iter().any(|allowed| allowed == ip),
            None => true,
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }
}

static METRICS_MANAGER: OnceLock<Arc<MetricsManager>> = OnceLock::new();

/// Install the global recorder once; later calls return the existing manager
pub fn init_metrics(config: MetricsConfig) -> Result<Arc<MetricsManager>> {
    if let Some(manager) = METRICS_MANAGER.get() {
        return Ok(manager.clone());
    }

    let manager = Arc::new(MetricsManager::install(config)?);
    Ok(METRICS_MANAGER.get_or_init(|| manager).clone())
}

pub fn get_metrics_manager() -> Result<Arc<MetricsManager>> {
    METRICS_MANAGER
        .get()
        .cloned()
        .ok_or_else(|| anyhow!("Metrics manager not initialized. Call init_metrics() first."))
}
