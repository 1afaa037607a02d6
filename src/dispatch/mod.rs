//! Request dispatcher
//!
//! Drives one calculation attempt through session tracking, the
//! authorization gate, the engine and the audit log. Every attempt that
//! gets past input validation leaves exactly one audit record, whether it
//! was computed, served from cache, denied or failed internally.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::{log_authorization_decision, AuthorizationGate, CallerContext};
use crate::engine::CalculationEngine;
use crate::logging::sanitize_log_message;
use crate::observability::record_attempt;
use crate::schema::{CalcOutcome, OperationType};
use crate::services::audit::{AuditError, AuditStore, NewAuditRecord, SessionUpdate};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Audit(#[from] AuditError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculationRequest {
    pub operation: OperationType,
    pub input: String,
    /// Generated when absent
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Computed {
        outcome: CalcOutcome,
        cached: bool,
        calculation_time: Option<Duration>,
    },
    Denied {
        reason: String,
    },
    /// The attempt was audited but could not be computed
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptReport {
    pub request_id: Uuid,
    pub operation: OperationType,
    pub input: String,
    pub session_id: String,
    pub outcome: AttemptOutcome,
    pub execution_time: Duration,
}

impl AttemptReport {
    pub fn is_denied(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Denied { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Failed { .. })
    }
}

#[derive(Clone)]
pub struct CalculationService {
    gate: AuthorizationGate,
    engine: CalculationEngine,
    audit: Arc<dyn AuditStore>,
}

impl CalculationService {
    pub fn new(gate: AuthorizationGate, engine: CalculationEngine, audit: Arc<dyn AuditStore>) -> Self {
        Self { gate, engine, audit }
    }

    pub fn engine(&self) -> &CalculationEngine {
        &self.engine
    }

    pub fn audit(&self) -> &Arc<dyn AuditStore> {
        &self.audit
    }

    pub async fn calculate(
        &self,
        caller: &CallerContext,
        request: CalculationRequest,
    ) -> Result<AttemptReport, DispatchError> {
        let started = Instant::now();
        let CalculationRequest {
            operation,
            input,
            session_id,
        } = request;
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        self.audit
            .upsert_session(&session_id, SessionUpdate::attempt(operation, &input))
            .await?;

        info!(
            event = "CALCULATION_START",
            operation = %operation,
            input = %sanitize_log_message(input.trim()),
            choice = operation.choice(),
            session_id = %session_id,
            "Calculation requested"
        );

        let decision = self.gate.check(caller.role, operation, &input);
        log_authorization_decision(caller, operation, &input, &decision);

        if !decision.allowed {
            let request_id = self
                .record(NewAuditRecord::error(operation, &input, &decision.reason), caller)
                .await?;
            return Ok(AttemptReport {
                request_id,
                operation,
                session_id,
                outcome: AttemptOutcome::Denied {
                    reason: decision.reason,
                },
                input,
                execution_time: started.elapsed(),
            });
        }

        let evaluation = match self.engine.evaluate(operation, &input).await {
            Ok(evaluation) => evaluation,
            Err(err) => {
                let message = err.to_string();
                let request_id = self
                    .record(NewAuditRecord::error(operation, &input, &message), caller)
                    .await?;
                error!(
                    event = "CALCULATION_ERROR",
                    request_id = %request_id,
                    operation = %operation,
                    error = %message,
                    "Calculation failed"
                );
                return Ok(AttemptReport {
                    request_id,
                    operation,
                    session_id,
                    outcome: AttemptOutcome::Failed { message },
                    input,
                    execution_time: started.elapsed(),
                });
            }
        };

        let result_text = evaluation.outcome.to_string();
        let request_id = self
            .record(
                NewAuditRecord::success(operation, &input, &result_text, evaluation.cached),
                caller,
            )
            .await?;

        let execution_time = started.elapsed();
        info!(
            event = "CALCULATION_SUCCESS",
            request_id = %request_id,
            operation = %operation,
            result = %result_text,
            cached = evaluation.cached,
            execution_time_ms = execution_time.as_secs_f64() * 1000.0,
            "Calculation finished"
        );

        Ok(AttemptReport {
            request_id,
            operation,
            input,
            session_id,
            outcome: AttemptOutcome::Computed {
                outcome: evaluation.outcome,
                cached: evaluation.cached,
                calculation_time: evaluation.calculation_time,
            },
            execution_time,
        })
    }

    async fn record(&self, attempt: NewAuditRecord, caller: &CallerContext) -> Result<Uuid, AuditError> {
        let operation = attempt.operation_type;
        let status = attempt.status;
        let attempt = attempt.with_caller(caller.ip_address.clone(), caller.user_agent.clone());

        let id = self.audit.record_attempt(attempt).await.inspect_err(|err| {
            error!(event = "AUDIT_WRITE_FAILED", operation = %operation, error = %err, "Failed to persist audit record");
        })?;

        record_attempt(operation, status.as_str());

        Ok(id)
    }
}
