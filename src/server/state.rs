use anyhow::{Context, Result};
use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth::{AuthService, AuthorizationGate, CallerResolver};
use crate::cache::CacheStore;
use crate::config::{AppConfig, HistoryConfig, StorageBackend};
use crate::dispatch::CalculationService;
use crate::engine::CalculationEngine;
use crate::health::HealthManager;
use crate::services::audit::{AuditStore, InMemoryAuditStore, SurrealAuditStore};

/// Everything the handlers share
#[derive(Clone, FromRef)]
pub struct AppState {
    pub calculations: CalculationService,
    pub auth: Arc<AuthService>,
    pub resolver: CallerResolver,
    pub health: HealthManager,
    pub history: HistoryConfig,
}

impl AppState {
    /// Assemble state around an existing audit store
    pub fn with_store(config: &AppConfig, audit: Arc<dyn AuditStore>) -> Self {
        let engine = CalculationEngine::new(CacheStore::new(), config.engine.limits());
        let gate = AuthorizationGate::new(config.authorization.policy());
        let auth = Arc::new(AuthService::new(config.auth.users.clone()));

        Self {
            calculations: CalculationService::new(gate, engine, audit),
            resolver: CallerResolver::new(auth.clone(), config.authorization.default_role),
            auth,
            health: HealthManager::new(Duration::from_secs(
                config.health.startup_timeout_seconds.into(),
            )),
            history: config.history.clone(),
        }
    }
}

/// Open the configured audit backend and build the shared state
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let audit: Arc<dyn AuditStore> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryAuditStore::new()),
        StorageBackend::Surreal => Arc::new(
            SurrealAuditStore::connect_in_memory(&config.storage.namespace, &config.storage.database)
                .await
                .context("Failed to open SurrealDB audit store")?,
        ),
    };
    info!(backend = audit.backend(), "Audit store ready");

    let state = AppState::with_store(config, audit);
    state
        .health
        .check_audit_store(state.calculations.audit().as_ref())
        .await;

    Ok(state)
}
