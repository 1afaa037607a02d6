use anyhow::{Context, Result};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// `RUST_LOG` wins over the configured level when set
fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {}", level)),
    }
}

fn build_layer(format: &str) -> Result<BoxedLayer> {
    let layer: BoxedLayer = match format {
        // One JSON object per event, span fields (trace_id) included
        "json" => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed(),
        "pretty" => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_names(true)
            .boxed(),
        other => anyhow::bail!("Unsupported log format: {}. Use 'json' or 'pretty'", other),
    };
    Ok(layer)
}

/// Install the global subscriber; fails if one is already set
pub fn setup_tracing(config: &LoggingConfig) -> Result<()> {
    let layer = build_layer(&config.format)?;
    let filter = build_filter(&config.level)?;

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .context("Global tracing subscriber already installed")
}
