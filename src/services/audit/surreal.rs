//! Embedded SurrealDB audit store
//!
//! Records live in the `audit_record` table keyed by request id; sessions in
//! `user_session` keyed by session id. Rows hold plain strings and integers
//! and are converted to the domain types on the way out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use surrealdb::engine::local::{Db, Mem};
use surrealdb::Surreal;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::models::{Analytics, AuditRecord, AuditStatus, NewAuditRecord, Session, SessionUpdate};
use super::{clamp_history_limit, AuditError, AuditStore};
use crate::schema::OperationType;

const AUDIT_TABLE: &str = "audit_record";
const SESSION_TABLE: &str = "user_session";

#[derive(Debug, Serialize, Deserialize)]
struct AuditRow {
    request_id: String,
    /// Insertion order; timestamps can collide
    seq: i64,
    operation_type: String,
    input_value: String,
    #[serde(default)]
    result: Option<String>,
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    timestamp: String,
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    user_agent: Option<String>,
}

impl AuditRow {
    fn from_record(record: &AuditRecord, seq: i64) -> Self {
        Self {
            request_id: record.id.to_string(),
            seq,
            operation_type: record.operation_type.to_string(),
            input_value: record.input_value.clone(),
            result: record.result.clone(),
            status: record.status.to_string(),
            error_message: record.error_message.clone(),
            timestamp: record.timestamp.to_rfc3339(),
            ip_address: record.caller_ip.clone(),
            user_agent: record.caller_agent.clone(),
        }
    }

    fn into_record(self) -> Result<AuditRecord, AuditError> {
        Ok(AuditRecord {
            id: Uuid::parse_str(&self.request_id)
                .map_err(|e| AuditError::Corrupt(format!("request_id: {}", e)))?,
            operation_type: self
                .operation_type
                .parse::<OperationType>()
                .map_err(|e| AuditError::Corrupt(e.to_string()))?,
            input_value: self.input_value,
            result: self.result,
            status: self.status.parse::<AuditStatus>().map_err(AuditError::Corrupt)?,
            error_message: self.error_message,
            timestamp: parse_timestamp(&self.timestamp)?,
            caller_ip: self.ip_address,
            caller_agent: self.user_agent,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionRow {
    session_id: String,
    last_choice: i64,
    last_input: String,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            last_choice: i64::from(session.last_choice),
            last_input: session.last_input.clone(),
            created_at: session.created_at.to_rfc3339(),
            updated_at: session.updated_at.to_rfc3339(),
        }
    }

    fn into_session(self) -> Result<Session, AuditError> {
        Ok(Session {
            last_choice: u8::try_from(self.last_choice)
                .map_err(|e| AuditError::Corrupt(format!("last_choice: {}", e)))?,
            session_id: self.session_id,
            last_input: self.last_input,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TotalRow {
    total: i64,
}

#[derive(Debug, Deserialize)]
struct OperationCountRow {
    operation_type: String,
    total: i64,
}

#[derive(Debug, Deserialize)]
struct StatusCountRow {
    status: String,
    total: i64,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, AuditError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AuditError::Corrupt(format!("timestamp '{}': {}", value, e)))
}

fn query_failed(context: &str) -> impl Fn(surrealdb::Error) -> AuditError + '_ {
    move |e| AuditError::QueryFailed(format!("{}: {}", context, e))
}

fn count(total: i64) -> u64 {
    u64::try_from(total).unwrap_or(0)
}

/// Audit store backed by an embedded in-memory SurrealDB instance
pub struct SurrealAuditStore {
    client: Surreal<Db>,
    sequence: AtomicI64,
    /// Serializes read-modify-write of sessions
    session_lock: Mutex<()>,
}

impl SurrealAuditStore {
    pub async fn connect_in_memory(namespace: &str, database: &str) -> Result<Self, AuditError> {
        let client = Surreal::new::<Mem>(())
            .await
            .map_err(|e| AuditError::ConnectionFailed(format!("Failed to create client: {}", e)))?;

        client.use_ns(namespace).use_db(database).await.map_err(|e| {
            AuditError::ConnectionFailed(format!("Failed to use namespace/database: {}", e))
        })?;

        info!(namespace, database, "Connected to embedded SurrealDB audit store");

        Ok(Self {
            client,
            sequence: AtomicI64::new(0),
            session_lock: Mutex::new(()),
        })
    }

    async fn fetch_session(&self, session_id: &str) -> Result<Option<Session>, AuditError> {
        let mut response = self
            .client
            .query(
                "SELECT session_id, last_choice, last_input, created_at, updated_at \
                 FROM type::thing($table, $id)",
            )
            .bind(("table", SESSION_TABLE))
            .bind(("id", session_id.to_string()))
            .await
            .map_err(query_failed("Session lookup failed"))?;

        let rows: Vec<SessionRow> = response
            .take(0)
            .map_err(query_failed("Failed to parse session row"))?;

        rows.into_iter().next().map(SessionRow::into_session).transpose()
    }
}

#[async_trait]
impl AuditStore for SurrealAuditStore {
    fn backend(&self) -> &'static str {
        "surrealdb"
    }

    async fn record_attempt(&self, attempt: NewAuditRecord) -> Result<Uuid, AuditError> {
        let id = Uuid::new_v4();
        let record = attempt.into_record(id, Utc::now());
        let row = AuditRow::from_record(&record, self.sequence.fetch_add(1, Ordering::SeqCst));

        self.client
            .query("CREATE type::thing($table, $id) CONTENT $row RETURN NONE")
            .bind(("table", AUDIT_TABLE))
            .bind(("id", id.to_string()))
            .bind(("row", row))
            .await
            .and_then(|response| response.check())
            .map_err(query_failed("Create audit record failed"))?;

        debug!(record_id = %id, status = %record.status, "Audit record appended");
        Ok(id)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, AuditError> {
        self.fetch_session(session_id).await
    }

    async fn upsert_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<Session, AuditError> {
        let _guard = self.session_lock.lock().await;
        let now = Utc::now();

        let mut session = match self.fetch_session(session_id).await? {
            Some(session) => session,
            None => {
                let fresh = Session::new(session_id, now);
                fresh
                    .validate()
                    .map_err(|report| AuditError::InvalidSession(report.to_string()))?;
                fresh
            }
        };
        session.apply(&update, now);

        self.client
            .query("UPSERT type::thing($table, $id) CONTENT $row RETURN NONE")
            .bind(("table", SESSION_TABLE))
            .bind(("id", session_id.to_string()))
            .bind(("row", SessionRow::from_session(&session)))
            .await
            .and_then(|response| response.check())
            .map_err(query_failed("Upsert session failed"))?;

        Ok(session)
    }

    async fn history(&self, limit: usize, offset: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let limit = clamp_history_limit(limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut response = self
            .client
            .query(format!(
                "SELECT request_id, seq, operation_type, input_value, result, status, \
                 error_message, timestamp, ip_address, user_agent \
                 FROM {} ORDER BY seq DESC LIMIT $limit START $offset",
                AUDIT_TABLE
            ))
            .bind(("limit", i64::try_from(limit).unwrap_or(i64::MAX)))
            .bind(("offset", i64::try_from(offset).unwrap_or(i64::MAX)))
            .await
            .map_err(query_failed("History query failed"))?;

        let rows: Vec<AuditRow> = response
            .take(0)
            .map_err(query_failed("Failed to parse history rows"))?;

        rows.into_iter().map(AuditRow::into_record).collect()
    }

    async fn analytics(&self) -> Result<Analytics, AuditError> {
        let mut response = self
            .client
            .query(format!("SELECT count() AS total FROM {} GROUP ALL", AUDIT_TABLE))
            .query(format!(
                "SELECT operation_type, count() AS total FROM {} GROUP BY operation_type",
                AUDIT_TABLE
            ))
            .query(format!(
                "SELECT status, count() AS total FROM {} GROUP BY status",
                AUDIT_TABLE
            ))
            .await
            .map_err(query_failed("Analytics query failed"))?;

        let totals: Vec<TotalRow> = response
            .take(0)
            .map_err(query_failed("Failed to parse total count"))?;
        let operations: Vec<OperationCountRow> = response
            .take(1)
            .map_err(query_failed("Failed to parse operation counts"))?;
        let statuses: Vec<StatusCountRow> = response
            .take(2)
            .map_err(query_failed("Failed to parse status counts"))?;

        Ok(Analytics {
            total_requests: totals.first().map_or(0, |row| count(row.total)),
            operation_stats: operations
                .into_iter()
                .map(|row| (row.operation_type, count(row.total)))
                .collect(),
            status_stats: statuses
                .into_iter()
                .map(|row| (row.status, count(row.total)))
                .collect(),
        })
    }

    async fn health_check(&self) -> Result<(), AuditError> {
        self.client
            .health()
            .await
            .map_err(|e| AuditError::ConnectionFailed(format!("Health check failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SurrealAuditStore {
        SurrealAuditStore::connect_in_memory("test", "test")
            .await
            .expect("embedded database should start")
    }

    #[tokio::test]
    async fn test_record_and_read_back() {
        let store = store().await;
        let attempt = NewAuditRecord::success(OperationType::Calculator, "2 + 2", "4", false)
            .with_caller(Some("127.0.0.1".to_string()), Some("curl/8.0".to_string()));
        let id = store.record_attempt(attempt).await.unwrap();

        let history = store.history(10, 0).await.unwrap();
        assert_eq!(history.len(), 1);
        let record = &history[0];
        assert_eq!(record.id, id);
        assert_eq!(record.operation_type, OperationType::Calculator);
        assert_eq!(record.result.as_deref(), Some("4"));
        assert_eq!(record.status, AuditStatus::Success);
        assert_eq!(record.error_message, None);
        assert_eq!(record.caller_ip.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_history_order_and_paging() {
        let store = store().await;
        for n in 0..4 {
            store
                .record_attempt(NewAuditRecord::success(
                    OperationType::Fibonacci,
                    &n.to_string(),
                    "0",
                    false,
                ))
                .await
                .unwrap();
        }

        let page: Vec<_> = store
            .history(2, 1)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.input_value)
            .collect();
        assert_eq!(page, vec!["2", "1"]);
        assert!(store.history(0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_analytics_groups() {
        let store = store().await;
        assert_eq!(store.analytics().await.unwrap(), Analytics::default());

        store
            .record_attempt(NewAuditRecord::success(OperationType::Factorial, "5", "120", false))
            .await
            .unwrap();
        store
            .record_attempt(NewAuditRecord::success(OperationType::Factorial, "5", "120", true))
            .await
            .unwrap();
        store
            .record_attempt(NewAuditRecord::error(OperationType::Calculator, "eval(1)", "denied"))
            .await
            .unwrap();

        let analytics = store.analytics().await.unwrap();
        assert_eq!(analytics.total_requests, 3);
        assert_eq!(analytics.operation_stats.get("factorial"), Some(&2));
        assert_eq!(analytics.operation_stats.get("calculator"), Some(&1));
        assert_eq!(analytics.status_stats.get("success"), Some(&1));
        assert_eq!(analytics.status_stats.get("success_cached"), Some(&1));
        assert_eq!(analytics.status_stats.get("error"), Some(&1));
    }

    #[tokio::test]
    async fn test_session_upsert() {
        let store = store().await;
        assert!(store.get_session("web-1").await.unwrap().is_none());

        let created = store
            .upsert_session("web-1", SessionUpdate::attempt(OperationType::Calculator, "1+1"))
            .await
            .unwrap();
        assert_eq!(created.last_choice, 1);

        let updated = store
            .upsert_session(
                "web-1",
                SessionUpdate {
                    last_choice: None,
                    last_input: Some("2+2".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.last_choice, 1);
        assert_eq!(updated.last_input, "2+2");

        let stored = store.get_session("web-1").await.unwrap().unwrap();
        assert_eq!(stored.last_input, "2+2");
        assert_eq!(stored.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_every_write_is_persisted() {
        let store = store().await;
        for n in 0..3 {
            store
                .record_attempt(NewAuditRecord::error(OperationType::Factorial, &n.to_string(), "denied"))
                .await
                .unwrap();
            store
                .upsert_session("web-2", SessionUpdate::attempt(OperationType::Factorial, &n.to_string()))
                .await
                .unwrap();
        }

        let history = store.history(10, 0).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|r| r.result.is_none()));
        assert_eq!(history[0].error_message.as_deref(), Some("denied"));

        let session = store.get_session("web-2").await.unwrap().unwrap();
        assert_eq!(session.last_choice, 3);
        assert_eq!(session.last_input, "2");
    }

    #[tokio::test]
    async fn test_history_offset_beyond_i64() {
        let store = store().await;
        store
            .record_attempt(NewAuditRecord::success(OperationType::Calculator, "1", "1", false))
            .await
            .unwrap();

        assert!(store.history(10, usize::MAX).await.unwrap().is_empty());
        assert_eq!(store.history(usize::MAX, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_health_check() {
        assert!(store().await.health_check().await.is_ok());
    }
}
