use async_trait::async_trait;
use chrono::Utc;
use garde::Validate;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{clamp_history_limit, AuditError, AuditStore};
use super::models::{Analytics, AuditRecord, NewAuditRecord, Session, SessionUpdate};

/// Process-local audit store; contents are lost on exit
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditStore {
    records: Arc<RwLock<Vec<AuditRecord>>>,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn record_attempt(&self, attempt: NewAuditRecord) -> Result<Uuid, AuditError> {
        let id = Uuid::new_v4();
        let record = attempt.into_record(id, Utc::now());
        debug!(record_id = %id, status = %record.status, "Audit record appended");
        self.records.write().await.push(record);
        Ok(id)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, AuditError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn upsert_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<Session, AuditError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;

        let session = match sessions.entry(session_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let fresh = Session::new(session_id, now);
                fresh
                    .validate()
                    .map_err(|report| AuditError::InvalidSession(report.to_string()))?;
                entry.insert(fresh)
            }
        };
        session.apply(&update, now);
        Ok(session.clone())
    }

    async fn history(&self, limit: usize, offset: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .skip(offset)
            .take(clamp_history_limit(limit))
            .cloned()
            .collect())
    }

    async fn analytics(&self) -> Result<Analytics, AuditError> {
        let records = self.records.read().await;
        Ok(Analytics::from_records(records.iter()))
    }

    async fn health_check(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::OperationType;
    use crate::services::audit::AuditStatus;

    #[tokio::test]
    async fn test_record_ids_are_unique() {
        let store = InMemoryAuditStore::new();
        let a = store
            .record_attempt(NewAuditRecord::success(OperationType::Calculator, "1", "1", false))
            .await
            .unwrap();
        let b = store
            .record_attempt(NewAuditRecord::success(OperationType::Calculator, "1", "1", true))
            .await
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(a.get_version_num(), 4);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_history_is_newest_first_with_paging() {
        let store = InMemoryAuditStore::new();
        for n in 0..5 {
            store
                .record_attempt(NewAuditRecord::success(
                    OperationType::Factorial,
                    &n.to_string(),
                    "1",
                    false,
                ))
                .await
                .unwrap();
        }

        let first_page = store.history(2, 0).await.unwrap();
        let inputs: Vec<_> = first_page.iter().map(|r| r.input_value.as_str()).collect();
        assert_eq!(inputs, vec!["4", "3"]);

        let second_page = store.history(2, 2).await.unwrap();
        let inputs: Vec<_> = second_page.iter().map(|r| r.input_value.as_str()).collect();
        assert_eq!(inputs, vec!["2", "1"]);

        assert!(store.history(10, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_upsert_creates_then_updates() {
        let store = InMemoryAuditStore::new();
        assert!(store.get_session("s1").await.unwrap().is_none());

        let created = store
            .upsert_session(
                "s1",
                SessionUpdate {
                    last_choice: Some(1),
                    last_input: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(created.last_choice, 1);
        assert_eq!(created.last_input, "");

        let updated = store
            .upsert_session("s1", SessionUpdate::attempt(OperationType::Factorial, "5"))
            .await
            .unwrap();
        assert_eq!(updated.last_choice, 3);
        assert_eq!(updated.last_input, "5");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);

        assert_eq!(store.get_session("s1").await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_invalid_session_id_rejected() {
        let store = InMemoryAuditStore::new();
        let err = store
            .upsert_session("bad id", SessionUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::InvalidSession(_)));
    }

    #[tokio::test]
    async fn test_analytics_counts() {
        let store = InMemoryAuditStore::new();
        store
            .record_attempt(NewAuditRecord::success(OperationType::Fibonacci, "10", "55", false))
            .await
            .unwrap();
        store
            .record_attempt(NewAuditRecord::error(OperationType::Fibonacci, "50", "denied"))
            .await
            .unwrap();

        let analytics = store.analytics().await.unwrap();
        assert_eq!(analytics.total_requests, 2);
        assert_eq!(analytics.operation_stats.get("fibonacci"), Some(&2));
        assert_eq!(analytics.status_stats.get(AuditStatus::Error.as_str()), Some(&1));
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_all_kept() {
        let store = InMemoryAuditStore::new();
        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .record_attempt(NewAuditRecord::success(
                        OperationType::Calculator,
                        &format!("{} + 0", i),
                        &i.to_string(),
                        false,
                    ))
                    .await
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().unwrap());
        }
        assert_eq!(ids.len(), 50);
        assert_eq!(store.len().await, 50);
    }
}
