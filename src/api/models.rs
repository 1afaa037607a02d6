use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::Role;
use crate::cache::CacheStats;
use crate::dispatch::{AttemptOutcome, AttemptReport};
use crate::schema::{CalcOutcome, OperationType};
use crate::services::audit::AuditRecord;

/// `POST /api/calculate` body; fields are optional so that a missing one
/// can be reported with a single message
#[derive(Debug, Default, Deserialize)]
pub struct CalculateBody {
    pub operation_type: Option<String>,
    pub input_value: Option<Value>,
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpressionBody {
    pub expression: Option<Value>,
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SequenceBody {
    pub n: Option<Value>,
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearCacheBody {
    pub operation_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginBody {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Accept JSON strings and numbers as calculation input
pub fn input_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
pub struct CalculationSuccess {
    pub request_id: Uuid,
    pub operation_type: OperationType,
    pub input_value: String,
    pub result: CalcOutcome,
    pub cached: bool,
    pub status: &'static str,
    pub session_id: String,
    pub execution_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation_time_ms: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct CalculationFailure {
    pub request_id: Uuid,
    pub operation_type: OperationType,
    pub input_value: String,
    pub error: String,
    pub cached: bool,
    pub status: &'static str,
    pub session_id: String,
    pub execution_time_ms: f64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CalculateResponse {
    Success(CalculationSuccess),
    Failure(CalculationFailure),
}

impl From<AttemptReport> for CalculateResponse {
    fn from(report: AttemptReport) -> Self {
        let execution_time_ms = millis(report.execution_time);
        match report.outcome {
            AttemptOutcome::Computed {
                outcome,
                cached,
                calculation_time,
            } => CalculateResponse::Success(CalculationSuccess {
                request_id: report.request_id,
                operation_type: report.operation,
                input_value: report.input,
                result: outcome,
                cached,
                status: "success",
                session_id: report.session_id,
                execution_time_ms,
                calculation_time_ms: calculation_time.map(millis),
            }),
            AttemptOutcome::Denied { reason } => CalculateResponse::Failure(CalculationFailure {
                request_id: report.request_id,
                operation_type: report.operation,
                input_value: report.input,
                error: reason,
                cached: false,
                status: "error",
                session_id: report.session_id,
                execution_time_ms,
            }),
            // The cause stays in the audit record and the log
            AttemptOutcome::Failed { .. } => CalculateResponse::Failure(CalculationFailure {
                request_id: report.request_id,
                operation_type: report.operation,
                input_value: report.input,
                error: "Internal error".to_string(),
                cached: false,
                status: "error",
                session_id: report.session_id,
                execution_time_ms,
            }),
        }
    }
}

fn millis(duration: std::time::Duration) -> f64 {
    (duration.as_secs_f64() * 1_000_000.0).round() / 1000.0
}

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<AuditRecord>,
    pub limit: usize,
    pub offset: usize,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub status: &'static str,
    pub message: String,
    pub token: String,
    pub user: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    pub user: Option<String>,
    pub role: Role,
    pub is_admin: bool,
    pub timestamp: DateTime<Utc>,
}
