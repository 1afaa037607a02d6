use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::permissions::GateDecision;
use super::CallerContext;
use crate::logging::sanitize_log_message;
use crate::schema::OperationType;

#[derive(Debug, Clone, Serialize)]
pub struct DecisionEntry {
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub user: String,
    pub role: String,
    pub operation: OperationType,
    pub allowed: bool,
    pub reason: String,
}

/// Emit a structured log line for a gate decision; denials log at warn
pub fn log_authorization_decision(
    caller: &CallerContext,
    operation: OperationType,
    input: &str,
    decision: &GateDecision,
) -> DecisionEntry {
    let entry = DecisionEntry {
        timestamp: Utc::now(),
        trace_id: caller.trace_id.clone(),
        user: caller.username.clone().unwrap_or_else(|| "anonymous".to_string()),
        role: caller.role.to_string(),
        operation,
        allowed: decision.allowed,
        reason: decision.reason.clone(),
    };

    let input = sanitize_log_message(input.trim());
    if entry.allowed {
        info!(
            event = "PERMISSION_GRANTED",
            audit_type = "authorization",
            trace_id = %entry.trace_id,
            user = %entry.user,
            role = %entry.role,
            operation = %entry.operation,
            input = %input,
            reason = %entry.reason,
            "Authorization decision"
        );
    } else {
        warn!(
            event = "PERMISSION_DENIED",
            audit_type = "authorization",
            trace_id = %entry.trace_id,
            user = %entry.user,
            role = %entry.role,
            operation = %entry.operation,
            input = %input,
            reason = %entry.reason,
            "Authorization decision"
        );
    }

    entry
}
