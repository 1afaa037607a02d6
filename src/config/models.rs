use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::auth::{GatePolicy, Role, UserAccount};
use crate::engine::EngineLimits;
use crate::services::audit::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};

#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
pub struct AppConfig {
    #[garde(dive)]
    #[serde(default)]
    pub server: ServerConfig,

    #[garde(dive)]
    #[serde(default)]
    pub logging: LoggingConfig,

    #[garde(dive)]
    #[serde(default)]
    pub health: HealthConfig,

    #[garde(dive)]
    #[serde(default)]
    pub engine: EngineConfig,

    #[garde(dive)]
    #[serde(default)]
    pub authorization: AuthorizationConfig,

    #[garde(dive)]
    #[serde(default)]
    pub auth: AuthConfig,

    #[garde(dive)]
    #[serde(default)]
    pub storage: StorageConfig,

    #[garde(dive)]
    #[serde(default)]
    pub history: HistoryConfig,

    #[garde(dive)]
    #[serde(default)]
    pub metrics: MetricsSettings,

    #[garde(skip)]
    #[serde(default)]
    pub environment: Environment,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[garde(range(min = 1024, max = 65535))]
    pub port: u16,

    #[garde(length(min = 1), custom(validate_bind_address))]
    #[serde(default = "default_bind")]
    pub bind: String,

    #[garde(range(min = 1, max = 300))]
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64, // seconds
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: default_bind(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LoggingConfig {
    #[garde(length(min = 1))]
    #[serde(default = "default_log_level")]
    pub level: String, // trace, debug, info, warn, error

    #[garde(pattern(r"^(json|pretty)$"))]
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct HealthConfig {
    #[garde(length(min = 1))]
    #[serde(default = "default_liveness_path")]
    pub liveness_path: String,

    #[garde(length(min = 1))]
    #[serde(default = "default_readiness_path")]
    pub readiness_path: String,

    #[garde(range(min = 1, max = 3600))]
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_seconds: u32,
}

fn default_liveness_path() -> String {
    "/health".to_string()
}

fn default_readiness_path() -> String {
    "/health/ready".to_string()
}

fn default_startup_timeout() -> u32 {
    300
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            liveness_path: default_liveness_path(),
            readiness_path: default_readiness_path(),
            startup_timeout_seconds: default_startup_timeout(),
        }
    }
}

/// Role-independent input ceilings
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct EngineConfig {
    /// fib(92) is the largest value that fits in an i64
    #[garde(range(min = 1, max = 92))]
    #[serde(default = "default_fibonacci_ceiling")]
    pub fibonacci_ceiling: u32,

    #[garde(range(min = 1, max = 100000))]
    #[serde(default = "default_factorial_ceiling")]
    pub factorial_ceiling: u32,
}

fn default_fibonacci_ceiling() -> u32 {
    40
}

fn default_factorial_ceiling() -> u32 {
    20_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fibonacci_ceiling: default_fibonacci_ceiling(),
            factorial_ceiling: default_factorial_ceiling(),
        }
    }
}

impl EngineConfig {
    pub fn limits(&self) -> EngineLimits {
        EngineLimits {
            fibonacci_ceiling: self.fibonacci_ceiling,
            factorial_ceiling: self.factorial_ceiling,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AuthorizationConfig {
    /// Role for requests that carry no bearer token
    #[garde(skip)]
    #[serde(default = "default_role")]
    pub default_role: Role,

    #[garde(range(max = 92))]
    #[serde(default = "default_fibonacci_user_max")]
    pub fibonacci_user_max: u32,

    #[garde(range(max = 100000))]
    #[serde(default = "default_factorial_user_max")]
    pub factorial_user_max: u32,

    #[garde(inner(length(min = 1)))]
    #[serde(default = "default_restricted_keywords")]
    pub restricted_keywords: Vec<String>,
}

fn default_role() -> Role {
    Role::User
}

fn default_fibonacci_user_max() -> u32 {
    29
}

fn default_factorial_user_max() -> u32 {
    200
}

fn default_restricted_keywords() -> Vec<String> {
    GatePolicy::default().restricted_keywords
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            default_role: default_role(),
            fibonacci_user_max: default_fibonacci_user_max(),
            factorial_user_max: default_factorial_user_max(),
            restricted_keywords: default_restricted_keywords(),
        }
    }
}

impl AuthorizationConfig {
    pub fn policy(&self) -> GatePolicy {
        GatePolicy {
            fibonacci_user_max: self.fibonacci_user_max,
            factorial_user_max: self.factorial_user_max,
            restricted_keywords: self
                .restricted_keywords
                .iter()
                .map(|keyword| keyword.to_lowercase())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AuthConfig {
    #[garde(length(min = 1), dive)]
    #[serde(default = "UserAccount::defaults")]
    pub users: Vec<UserAccount>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users: UserAccount::defaults(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Surreal,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StorageConfig {
    #[garde(skip)]
    #[serde(default)]
    pub backend: StorageBackend,

    #[garde(length(min = 1))]
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[garde(length(min = 1))]
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_namespace() -> String {
    "calc".to_string()
}

fn default_database() -> String {
    "audit".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            namespace: default_namespace(),
            database: default_database(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct HistoryConfig {
    #[garde(range(min = 1, max = MAX_HISTORY_LIMIT))]
    #[serde(default = "default_page_size")]
    pub default_limit: usize,

    #[garde(range(min = 1, max = MAX_HISTORY_LIMIT))]
    #[serde(default = "default_max_page_size")]
    pub max_limit: usize,
}

fn default_page_size() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_max_page_size() -> usize {
    MAX_HISTORY_LIMIT
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_page_size(),
            max_limit: default_max_page_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MetricsSettings {
    #[garde(skip)]
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// `None` leaves `/metrics` open to every client
    #[garde(inner(inner(custom(validate_bind_address))))]
    #[serde(default)]
    pub ip_allowlist: Option<Vec<String>>,
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            ip_allowlist: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    #[default]
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

fn validate_bind_address(value: &str, _: &()) -> garde::Result {
    value
        .parse::<std::net::IpAddr>()
        .map(|_| ())
        .map_err(|_| garde::Error::new("Invalid IP address"))
}
