//! Promotion engine API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use bumper_core::{EngineError, EngineStatus, Outcome};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a promotion cycle
#[derive(Debug, Deserialize)]
pub struct StartCycleBody {
    /// When the cycle ends, HH:MM local time, same day
    pub stop_time: String,
}

/// Response for a started cycle
#[derive(Debug, Serialize)]
pub struct StartCycleResponse {
    pub per_account_cap: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u64>,
}

/// Simple message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Outcome of a manually triggered tick
#[derive(Debug, Serialize)]
pub struct TickResponse {
    pub outcome: Outcome,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct EngineErrorResponse {
    pub error: String,
}

type EngineResult<T> = Result<T, (StatusCode, Json<EngineErrorResponse>)>;

fn engine_error_response(err: EngineError) -> (StatusCode, Json<EngineErrorResponse>) {
    let status = match &err {
        EngineError::SchedulingConflict(_) => StatusCode::CONFLICT,
        EngineError::TenantNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidStopTime(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(EngineErrorResponse {
            error: err.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Get engine status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<EngineStatus> {
    Json(state.engine().status())
}

/// Start a promotion cycle for a tenant
pub async fn start_cycle(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Json(body): Json<StartCycleBody>,
) -> EngineResult<Json<StartCycleResponse>> {
    let info = state
        .engine()
        .start(&tenant_id, &body.stop_time)
        .await
        .map_err(engine_error_response)?;
    Ok(Json(StartCycleResponse {
        per_account_cap: info.per_account_cap,
        interval_minutes: info.interval_minutes,
    }))
}

/// Stop a tenant's promotion cycle
pub async fn stop_cycle(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> EngineResult<Json<MessageResponse>> {
    let was_running = state
        .engine()
        .stop(&tenant_id)
        .await
        .map_err(engine_error_response)?;
    let message = if was_running {
        "Promotion cycle stopped".to_string()
    } else {
        "No promotion cycle was running".to_string()
    };
    Ok(Json(MessageResponse { message }))
}

/// Run one promotion tick immediately
pub async fn run_tick(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> EngineResult<Json<TickResponse>> {
    let outcome = state
        .engine()
        .run_tick(&tenant_id)
        .await
        .map_err(engine_error_response)?;
    Ok(Json(TickResponse { outcome }))
}

/// Drop all promotion state for a tenant
pub async fn reset(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> EngineResult<Json<MessageResponse>> {
    state
        .engine()
        .reset(&tenant_id)
        .await
        .map_err(engine_error_response)?;
    Ok(Json(MessageResponse {
        message: "Promotion state cleared".to_string(),
    }))
}

/// Install the daily auto-start timer for a tenant
pub async fn enable_auto_start(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> EngineResult<Json<MessageResponse>> {
    state
        .engine()
        .enable_auto_start(&tenant_id)
        .map_err(engine_error_response)?;
    Ok(Json(MessageResponse {
        message: "Auto start enabled".to_string(),
    }))
}

/// Remove the tenant's auto-start timer
pub async fn disable_auto_start(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> EngineResult<Json<MessageResponse>> {
    let removed = state
        .engine()
        .disable_auto_start(&tenant_id)
        .map_err(engine_error_response)?;
    let message = if removed {
        "Auto start disabled".to_string()
    } else {
        "Auto start was not enabled".to_string()
    };
    Ok(Json(MessageResponse { message }))
}
