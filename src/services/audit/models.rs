use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::OperationType;

/// How an attempt ended, as stored in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    SuccessCached,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::SuccessCached => "success_cached",
            AuditStatus::Error => "error",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AuditStatus::Success),
            "success_cached" => Ok(AuditStatus::SuccessCached),
            "error" => Ok(AuditStatus::Error),
            other => Err(format!("Unknown audit status: {}", other)),
        }
    }
}

/// One persisted calculation attempt. Never modified after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub operation_type: OperationType,
    pub input_value: String,
    pub result: Option<String>,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub caller_ip: Option<String>,
    pub caller_agent: Option<String>,
}

/// Caller-supplied part of an audit record; the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditRecord {
    pub operation_type: OperationType,
    pub input_value: String,
    pub result: Option<String>,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub caller_ip: Option<String>,
    pub caller_agent: Option<String>,
}

impl NewAuditRecord {
    /// A computed (or domain-failed) attempt. Cached results are stored with
    /// a `" (cached)"` suffix under `success_cached`.
    pub fn success(operation_type: OperationType, input_value: &str, result: &str, cached: bool) -> Self {
        let (result, status) = if cached {
            (format!("{} (cached)", result), AuditStatus::SuccessCached)
        } else {
            (result.to_string(), AuditStatus::Success)
        };
        Self {
            operation_type,
            input_value: input_value.to_string(),
            result: Some(result),
            status,
            error_message: None,
            caller_ip: None,
            caller_agent: None,
        }
    }

    pub fn error(operation_type: OperationType, input_value: &str, message: &str) -> Self {
        Self {
            operation_type,
            input_value: input_value.to_string(),
            result: None,
            status: AuditStatus::Error,
            error_message: Some(message.to_string()),
            caller_ip: None,
            caller_agent: None,
        }
    }

    pub fn with_caller(mut self, ip: Option<String>, agent: Option<String>) -> Self {
        self.caller_ip = ip;
        self.caller_agent = agent;
        self
    }

    pub fn into_record(self, id: Uuid, timestamp: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            id,
            operation_type: self.operation_type,
            input_value: self.input_value,
            result: self.result,
            status: self.status,
            error_message: self.error_message,
            timestamp,
            caller_ip: self.caller_ip,
            caller_agent: self.caller_agent,
        }
    }
}

fn valid_session_id(value: &str, _: &()) -> garde::Result {
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(garde::Error::new(
            "Session ID must contain only alphanumeric characters, dots, underscores and hyphens",
        ));
    }
    Ok(())
}

/// Per-caller interaction state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Session {
    #[garde(length(min = 1, max = 128), custom(valid_session_id))]
    pub session_id: String,
    /// 0 until an operation is chosen, then the operation's choice number
    #[garde(range(max = 3))]
    pub last_choice: u8,
    #[garde(skip)]
    pub last_input: String,
    #[garde(skip)]
    pub created_at: DateTime<Utc>,
    #[garde(skip)]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            last_choice: 0,
            last_input: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite only the supplied fields; `updated_at` always moves
    pub fn apply(&mut self, update: &SessionUpdate, now: DateTime<Utc>) {
        if let Some(choice) = update.last_choice {
            self.last_choice = choice;
        }
        if let Some(input) = &update.last_input {
            self.last_input = input.clone();
        }
        self.updated_at = now;
    }

    pub fn last_operation(&self) -> Option<OperationType> {
        OperationType::from_choice(self.last_choice)
    }
}

/// Partial session write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub last_choice: Option<u8>,
    pub last_input: Option<String>,
}

impl SessionUpdate {
    /// Both fields at once, as written by a calculate call
    pub fn attempt(operation: OperationType, input: &str) -> Self {
        Self {
            last_choice: Some(operation.choice()),
            last_input: Some(input.to_string()),
        }
    }
}

/// Aggregate counts over the whole audit log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analytics {
    pub total_requests: u64,
    pub operation_stats: BTreeMap<String, u64>,
    pub status_stats: BTreeMap<String, u64>,
}

impl Analytics {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AuditRecord>) -> Self {
        let mut analytics = Analytics::default();
        for record in records {
            analytics.total_requests += 1;
            *analytics
                .operation_stats
                .entry(record.operation_type.to_string())
                .or_default() += 1;
            *analytics
                .status_stats
                .entry(record.status.to_string())
                .or_default() += 1;
        }
        analytics
    }
}
