//! Tenant API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use bumper_core::{Policy, PoolError, Tenant};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for updating tenant settings
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsBody {
    /// Enable or disable the tenant
    pub active: Option<bool>,
    /// Candidate selection policy
    pub policy: Option<String>,
    /// Total promotions desired per cycle
    pub daily_cap: Option<u32>,
}

/// Response for tenant operations
#[derive(Debug, Serialize)]
pub struct TenantResponse {
    pub id: String,
    pub active: bool,
    pub daily_cap: u32,
    pub per_account_cap: u32,
    pub policy: Policy,
    pub created_at: String,
}

impl From<Tenant> for TenantResponse {
    fn from(tenant: Tenant) -> Self {
        Self {
            id: tenant.id,
            active: tenant.active,
            daily_cap: tenant.daily_cap,
            per_account_cap: tenant.per_account_cap,
            policy: tenant.policy,
            created_at: tenant.created_at.to_rfc3339(),
        }
    }
}

/// Response for listing tenants
#[derive(Debug, Serialize)]
pub struct ListTenantsResponse {
    pub tenants: Vec<TenantResponse>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct TenantErrorResponse {
    pub error: String,
}

pub(super) fn pool_error_response(err: PoolError) -> (StatusCode, Json<TenantErrorResponse>) {
    let status = match &err {
        PoolError::TenantNotFound(_) | PoolError::AccountNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(TenantErrorResponse {
            error: err.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Register a tenant, or return it unchanged when it already exists.
/// New tenants start disabled with the configured default daily cap.
pub async fn upsert_tenant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<TenantResponse>), (StatusCode, Json<TenantErrorResponse>)> {
    let existed = state
        .store()
        .get_tenant(&id)
        .map_err(pool_error_response)?
        .is_some();
    let tenant = state
        .store()
        .upsert_tenant(&id, state.default_daily_cap())
        .map_err(pool_error_response)?;
    let status = if existed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(tenant.into())))
}

/// Get a tenant by id
pub async fn get_tenant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TenantResponse>, (StatusCode, Json<TenantErrorResponse>)> {
    match state.store().get_tenant(&id).map_err(pool_error_response)? {
        Some(tenant) => Ok(Json(tenant.into())),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(TenantErrorResponse {
                error: format!("tenant not found: {id}"),
            }),
        )),
    }
}

/// List all tenants
pub async fn list_tenants(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListTenantsResponse>, (StatusCode, Json<TenantErrorResponse>)> {
    let tenants = state
        .store()
        .list_tenants()
        .map_err(pool_error_response)?
        .into_iter()
        .map(TenantResponse::from)
        .collect();
    Ok(Json(ListTenantsResponse { tenants }))
}

/// Update tenant settings (activation, policy, daily cap)
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateSettingsBody>,
) -> Result<Json<TenantResponse>, (StatusCode, Json<TenantErrorResponse>)> {
    if let Some(policy) = &body.policy {
        let policy = Policy::parse(policy).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(TenantErrorResponse {
                    error: format!("unknown policy: {policy}"),
                }),
            )
        })?;
        state
            .store()
            .set_policy(&id, policy)
            .map_err(pool_error_response)?;
    }
    if let Some(cap) = body.daily_cap {
        if cap == 0 {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(TenantErrorResponse {
                    error: "daily_cap must be positive".to_string(),
                }),
            ));
        }
        state
            .store()
            .set_daily_cap(&id, cap)
            .map_err(pool_error_response)?;
    }
    if let Some(active) = body.active {
        state
            .store()
            .set_tenant_active(&id, active)
            .map_err(pool_error_response)?;
    }

    match state.store().get_tenant(&id).map_err(pool_error_response)? {
        Some(tenant) => Ok(Json(tenant.into())),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(TenantErrorResponse {
                error: format!("tenant not found: {id}"),
            }),
        )),
    }
}
