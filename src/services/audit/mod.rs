//! Audit log and session persistence
//!
//! Every calculation attempt is appended as an immutable [`AuditRecord`];
//! per-caller [`Session`] state lives alongside it. [`AuditStore`] is the
//! seam the dispatcher depends on, with an in-memory and an embedded
//! SurrealDB implementation.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod models;
pub mod surreal;

pub use memory::InMemoryAuditStore;
pub use models::*;
pub use surreal::SurrealAuditStore;

/// Hard upper bound on a history page
pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Default history page size
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Storage connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Storage query failed: {0}")]
    QueryFailed(String),

    #[error("Stored data is malformed: {0}")]
    Corrupt(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),
}

pub fn clamp_history_limit(limit: usize) -> usize {
    limit.min(MAX_HISTORY_LIMIT)
}

/// Persistence contract for audit records and sessions
///
/// Appends and session upserts are atomic per call. Concurrent session
/// writers race; the last write wins.
///
/// # Example
/// ```no_run
/// # use calc_api::services::audit::{AuditStore, InMemoryAuditStore, NewAuditRecord};
/// # use calc_api::schema::OperationType;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryAuditStore::new();
/// let id = store
///     .record_attempt(NewAuditRecord::success(OperationType::Calculator, "2 + 2", "4", false))
///     .await?;
/// let page = store.history(10, 0).await?;
/// assert_eq!(page[0].id, id);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Short backend name for health reporting
    fn backend(&self) -> &'static str;

    /// Persist one attempt under a fresh UUID v4 and return that id
    async fn record_attempt(&self, attempt: NewAuditRecord) -> Result<Uuid, AuditError>;

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, AuditError>;

    /// Create the session with defaults if needed, then apply `update`
    async fn upsert_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<Session, AuditError>;

    /// Most recent first; `limit` is capped at [`MAX_HISTORY_LIMIT`]
    async fn history(&self, limit: usize, offset: usize) -> Result<Vec<AuditRecord>, AuditError>;

    async fn analytics(&self) -> Result<Analytics, AuditError>;

    /// Cheap liveness probe of the backing storage
    async fn health_check(&self) -> Result<(), AuditError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_limit_is_capped() {
        assert_eq!(clamp_history_limit(10), 10);
        assert_eq!(clamp_history_limit(1000), 1000);
        assert_eq!(clamp_history_limit(5000), 1000);
    }
}
