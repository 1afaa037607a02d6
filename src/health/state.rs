use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::services::audit::AuditStore;

pub const API_SERVICE: &str = "api";
pub const AUDIT_SERVICE: &str = "audit_store";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Starting,
}

impl HealthStatus {
    /// Lower is worse
    fn priority(&self) -> u8 {
        match self {
            HealthStatus::Unhealthy => 0,
            HealthStatus::Starting => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Healthy => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    pub message: String,
    pub last_checked: chrono::DateTime<chrono::Utc>,
}

impl ServiceHealth {
    fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            last_checked: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status across all services
    pub status: HealthStatus,
    pub services: HashMap<String, ServiceHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone)]
struct CachedHealth {
    response: HealthResponse,
    cached_at: Instant,
}

/// Tracks readiness of the API and its audit store
///
/// Readiness reports are cached for `cache_ttl`; any status change clears
/// the cache.
#[derive(Debug, Clone)]
pub struct HealthManager {
    services: Arc<RwLock<HashMap<String, ServiceHealth>>>,
    cache: Arc<RwLock<Option<CachedHealth>>>,
    startup_time: Instant,
    cache_ttl: Duration,
    startup_grace_period: Duration,
}

impl HealthManager {
    pub fn new(startup_grace_period: Duration) -> Self {
        let mut services = HashMap::new();
        services.insert(
            API_SERVICE.to_string(),
            ServiceHealth::new(HealthStatus::Starting, "API server starting up"),
        );

        Self {
            services: Arc::new(RwLock::new(services)),
            cache: Arc::new(RwLock::new(None)),
            startup_time: Instant::now(),
            cache_ttl: Duration::from_secs(5),
            startup_grace_period,
        }
    }

    /// Called once the listener is bound
    pub async fn mark_ready(&self) {
        self.update_service_health(API_SERVICE, HealthStatus::Healthy, "API server is ready")
            .await;
    }

    pub async fn update_service_health(
        &self,
        service_name: &str,
        status: HealthStatus,
        message: impl Into<String>,
    ) {
        let health = ServiceHealth::new(status.clone(), message);
        self.services
            .write()
            .await
            .insert(service_name.to_string(), health);
        *self.cache.write().await = None;
        info!(service = %service_name, status = ?status, "Updated service health");
    }

    /// Probe the audit store and record the result under [`AUDIT_SERVICE`]
    pub async fn check_audit_store(&self, store: &dyn AuditStore) -> HealthStatus {
        let (status, message) = match store.health_check().await {
            Ok(()) => (HealthStatus::Healthy, format!("{} audit store reachable", store.backend())),
            Err(e) => {
                warn!(backend = store.backend(), error = %e, "Audit store health check failed");
                (HealthStatus::Unhealthy, e.to_string())
            }
        };
        self.update_service_health(AUDIT_SERVICE, status.clone(), message)
            .await;
        status
    }

    pub async fn get_health(&self) -> HealthResponse {
        if let Some(cached) = &*self.cache.read().await {
            if cached.cached_at.elapsed() <= self.cache_ttl {
                return cached.response.clone();
            }
        }
        self.refresh_health().await
    }

    async fn refresh_health(&self) -> HealthResponse {
        let services = self.services.read().await.clone();

        let status = services
            .values()
            .map(|service| &service.status)
            .min_by_key(|status| status.priority())
            .cloned()
            .unwrap_or(HealthStatus::Healthy);

        let response = HealthResponse {
            status,
            services,
            timestamp: chrono::Utc::now(),
            uptime_seconds: self.startup_time.elapsed().as_secs(),
        };

        *self.cache.write().await = Some(CachedHealth {
            response: response.clone(),
            cached_at: Instant::now(),
        });

        response
    }

    pub fn is_in_startup_period(&self) -> bool {
        self.startup_time.elapsed() < self.startup_grace_period
    }
}

impl Default for HealthManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
