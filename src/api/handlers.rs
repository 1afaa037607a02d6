use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::models::*;
use crate::auth::{AuthService, CallerContext};
use crate::config::HistoryConfig;
use crate::dispatch::{CalculationRequest, CalculationService};
use crate::error::AppError;
use crate::schema::OperationType;
use crate::services::audit::{Analytics, Session};

const MISSING_FIELDS: &str = "operation_type and input_value are required";

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::InvalidInput("No JSON data provided".to_string()));
    }
    serde_json::from_slice(body).map_err(|e| AppError::InvalidInput(format!("Invalid JSON body: {}", e)))
}

fn required_input(value: Option<&Value>, missing: &str) -> Result<String, AppError> {
    let value = value
        .filter(|v| !v.is_null())
        .ok_or_else(|| AppError::InvalidInput(missing.to_string()))?;
    input_text(value).ok_or_else(|| AppError::InvalidInput("Input must be a string or number".to_string()))
}

async fn dispatch(
    service: &CalculationService,
    caller: &CallerContext,
    request: CalculationRequest,
) -> Result<Response, AppError> {
    let report = service.calculate(caller, request).await?;
    let status = if report.is_denied() {
        StatusCode::FORBIDDEN
    } else if report.is_failed() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    Ok((status, Json(CalculateResponse::from(report))).into_response())
}

/// `POST /api/calculate`
pub async fn calculate(
    State(service): State<CalculationService>,
    Extension(caller): Extension<CallerContext>,
    body: Bytes,
) -> Result<Response, AppError> {
    let body: CalculateBody = parse_body(&body)?;

    let operation = body
        .operation_type
        .as_deref()
        .map(str::trim)
        .filter(|op| !op.is_empty())
        .ok_or_else(|| AppError::InvalidInput(MISSING_FIELDS.to_string()))?;
    let input = required_input(body.input_value.as_ref(), MISSING_FIELDS)?;
    let operation: OperationType = operation.parse()?;

    dispatch(
        &service,
        &caller,
        CalculationRequest {
            operation,
            input,
            session_id: body.session_id,
        },
    )
    .await
}

/// `POST /api/calculator`
pub async fn calculator(
    State(service): State<CalculationService>,
    Extension(caller): Extension<CallerContext>,
    body: Bytes,
) -> Result<Response, AppError> {
    let body: ExpressionBody = parse_body(&body)?;
    let input = required_input(body.expression.as_ref(), "expression is required")?;

    dispatch(
        &service,
        &caller,
        CalculationRequest {
            operation: OperationType::Calculator,
            input,
            session_id: body.session_id,
        },
    )
    .await
}

/// `POST /api/fibonacci`
pub async fn fibonacci(
    State(service): State<CalculationService>,
    Extension(caller): Extension<CallerContext>,
    body: Bytes,
) -> Result<Response, AppError> {
    sequence(service, caller, OperationType::Fibonacci, body).await
}

/// `POST /api/factorial`
pub async fn factorial(
    State(service): State<CalculationService>,
    Extension(caller): Extension<CallerContext>,
    body: Bytes,
) -> Result<Response, AppError> {
    sequence(service, caller, OperationType::Factorial, body).await
}

async fn sequence(
    service: CalculationService,
    caller: CallerContext,
    operation: OperationType,
    body: Bytes,
) -> Result<Response, AppError> {
    let body: SequenceBody = parse_body(&body)?;
    let input = required_input(body.n.as_ref(), "n is required")?;

    dispatch(
        &service,
        &caller,
        CalculationRequest {
            operation,
            input,
            session_id: body.session_id,
        },
    )
    .await
}

/// `GET /api/cache/stats`
pub async fn cache_stats(State(service): State<CalculationService>) -> Json<CacheStatsResponse> {
    Json(CacheStatsResponse {
        stats: service.engine().cache().stats().await,
        timestamp: Utc::now(),
    })
}

/// `POST /api/cache/clear`
///
/// A body without a usable `operation_type` clears every partition.
pub async fn clear_cache(
    State(service): State<CalculationService>,
    body: Bytes,
) -> Result<Json<MessageResponse>, AppError> {
    let target = serde_json::from_slice::<ClearCacheBody>(&body)
        .ok()
        .and_then(|body| body.operation_type)
        .map(|op| op.trim().to_string())
        .filter(|op| !op.is_empty());

    service.engine().cache().clear_named(target.as_deref()).await?;

    let message = match &target {
        Some(op) => format!("Cache cleared for {}", op),
        None => "All caches cleared".to_string(),
    };
    Ok(Json(MessageResponse {
        status: None,
        message,
        timestamp: Utc::now(),
    }))
}

/// `GET /api/history`
pub async fn history(
    State(service): State<CalculationService>,
    State(config): State<HistoryConfig>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let limit = query.limit.unwrap_or(config.default_limit).min(config.max_limit);
    let offset = query.offset.unwrap_or(0);

    let history = service.audit().history(limit, offset).await?;
    Ok(Json(HistoryResponse {
        count: history.len(),
        history,
        limit,
        offset,
    }))
}

/// `GET /api/analytics`
pub async fn analytics(State(service): State<CalculationService>) -> Result<Json<Analytics>, AppError> {
    Ok(Json(service.audit().analytics().await?))
}

/// `GET /api/sessions/{session_id}`
pub async fn session(
    State(service): State<CalculationService>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, AppError> {
    service
        .audit()
        .get_session(&session_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
}

/// `POST /api/login`
pub async fn login(
    State(auth): State<Arc<AuthService>>,
    body: Bytes,
) -> Result<Json<LoginResponse>, AppError> {
    let body: LoginBody = parse_body(&body)?;
    let (Some(username), Some(password)) = (body.username, body.password) else {
        return Err(AppError::InvalidInput(
            "username and password are required".to_string(),
        ));
    };

    let grant = auth.login(&username, &password).await?;
    Ok(Json(LoginResponse {
        status: "success",
        message: "Login successful".to_string(),
        token: grant.token,
        user: grant.user.username,
        role: grant.user.role,
        timestamp: Utc::now(),
    }))
}

/// `POST /api/logout`
pub async fn logout(
    State(auth): State<Arc<AuthService>>,
    Extension(caller): Extension<CallerContext>,
) -> Result<Json<MessageResponse>, AppError> {
    let token = caller
        .token
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;
    let user = auth.logout(&token).await?;

    info!(username = %user.username, trace_id = %caller.trace_id, "Session token revoked");
    Ok(Json(MessageResponse {
        status: Some("success"),
        message: "Logged out successfully".to_string(),
        timestamp: Utc::now(),
    }))
}

/// `GET /api/auth/status`
pub async fn auth_status(Extension(caller): Extension<CallerContext>) -> Json<AuthStatusResponse> {
    Json(AuthStatusResponse {
        authenticated: caller.username.is_some(),
        is_admin: caller.role.is_admin(),
        user: caller.username,
        role: caller.role,
        timestamp: Utc::now(),
    })
}
