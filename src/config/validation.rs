use anyhow::Result;
use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use garde::Validate;
use std::path::PathBuf;

use super::AppConfig;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "calc-api", about = "Calculation service with caching, authorization and auditing")]
pub struct Cli {
    /// Path to an additional configuration file
    #[arg(long, env = "APP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long)]
    pub bind: Option<String>,

    /// Environment name (development, staging, production)
    #[arg(long, env = "ENVIRONMENT")]
    pub environment: Option<String>,

    /// Audit storage backend (memory, surreal)
    #[arg(long)]
    pub storage: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Flags that were actually given, as dotted config keys
    fn overrides(&self) -> Figment {
        let mut figment = Figment::new();
        if let Some(port) = self.port {
            figment = figment.merge(Serialized::default("server.port", port));
        }
        if let Some(bind) = &self.bind {
            figment = figment.merge(Serialized::default("server.bind", bind));
        }
        if let Some(environment) = &self.environment {
            figment = figment.merge(Serialized::default("environment", environment.to_lowercase()));
        }
        if let Some(storage) = &self.storage {
            figment = figment.merge(Serialized::default("storage.backend", storage.to_lowercase()));
        }
        if self.debug {
            figment = figment.merge(Serialized::default("logging.level", "debug"));
        }
        figment
    }
}

/// Load configuration from the process command line
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&Cli::parse())
}

/// Merge configuration tiers, lowest priority first:
/// embedded defaults, `config/default.toml`, `config/<environment>.toml`,
/// the `--config` file, `APP_` environment variables, then CLI flags.
pub fn load_config_from(cli: &Cli) -> Result<AppConfig> {
    let env_name = cli
        .environment
        .clone()
        .or_else(|| std::env::var("ENVIRONMENT").ok())
        .unwrap_or_else(|| "production".to_string())
        .to_lowercase();

    let mut figment = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file("config/default.toml"))
        .merge(Toml::file(format!("config/{}.toml", env_name)));

    if let Some(path) = &cli.config {
        if !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }
        figment = figment.merge(Toml::file(path));
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("APP_").split("__"))
        .merge(cli.overrides())
        .extract()?;

    config.validate()?;

    if config.history.default_limit > config.history.max_limit {
        anyhow::bail!(
            "history.default_limit ({}) exceeds history.max_limit ({})",
            config.history.default_limit,
            config.history.max_limit
        );
    }

    Ok(config)
}
