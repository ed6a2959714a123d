//! Account API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use bumper_core::Account;

use super::tenants::{pool_error_response, TenantErrorResponse};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for registering an account
#[derive(Debug, Deserialize)]
pub struct UpsertAccountBody {
    /// Account identifier, e.g. a phone number
    pub id: String,
    /// Session credential from the login flow
    pub credential: String,
}

/// Request body for updating an account
#[derive(Debug, Deserialize)]
pub struct UpdateAccountBody {
    pub active: Option<bool>,
    /// Replacement session credential
    pub credential: Option<String>,
}

/// Response for account operations. The credential never leaves the
/// server.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub tenant_id: String,
    pub active: bool,
    pub used_count: u32,
    pub created_at: String,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            tenant_id: account.tenant_id,
            active: account.active,
            used_count: account.used_count,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Response for listing accounts
#[derive(Debug, Serialize)]
pub struct ListAccountsResponse {
    pub accounts: Vec<AccountResponse>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Register an account under a tenant, refreshing the credential and
/// reactivating it when the account already exists.
pub async fn upsert_account(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Json(body): Json<UpsertAccountBody>,
) -> Result<(StatusCode, Json<AccountResponse>), impl IntoResponse> {
    if state
        .store()
        .get_tenant(&tenant_id)
        .map_err(pool_error_response)?
        .is_none()
    {
        return Err((
            StatusCode::NOT_FOUND,
            Json(TenantErrorResponse {
                error: format!("tenant not found: {tenant_id}"),
            }),
        ));
    }
    let account = state
        .store()
        .upsert_account(&tenant_id, &body.id, &body.credential)
        .map_err(pool_error_response)?;
    Ok((StatusCode::CREATED, Json(account.into())))
}

/// List a tenant's accounts in registration order
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Result<Json<ListAccountsResponse>, (StatusCode, Json<TenantErrorResponse>)> {
    let accounts = state
        .store()
        .list_accounts(&tenant_id)
        .map_err(pool_error_response)?
        .into_iter()
        .map(AccountResponse::from)
        .collect();
    Ok(Json(ListAccountsResponse { accounts }))
}

/// Update an account's activation or credential
pub async fn update_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateAccountBody>,
) -> Result<Json<AccountResponse>, (StatusCode, Json<TenantErrorResponse>)> {
    let account = state
        .store()
        .get_account(&id)
        .map_err(pool_error_response)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(TenantErrorResponse {
                    error: format!("account not found: {id}"),
                }),
            )
        })?;

    if let Some(credential) = &body.credential {
        state
            .store()
            .upsert_account(&account.tenant_id, &id, credential)
            .map_err(pool_error_response)?;
    }
    if let Some(active) = body.active {
        state
            .store()
            .set_account_active(&id, active)
            .map_err(pool_error_response)?;
    }

    match state.store().get_account(&id).map_err(pool_error_response)? {
        Some(account) => Ok(Json(account.into())),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(TenantErrorResponse {
                error: format!("account not found: {id}"),
            }),
        )),
    }
}
