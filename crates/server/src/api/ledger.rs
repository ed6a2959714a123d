//! Token ledger API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use bumper_core::{LedgerStats, Token, TokenStatus};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing tokens
#[derive(Debug, Deserialize)]
pub struct ListTokensParams {
    /// Restrict to one account
    pub account: Option<String>,
}

/// Query parameters for ledger stats
#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub account: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub value: String,
    pub account_id: String,
    pub status: TokenStatus,
    pub created_at: String,
}

impl From<Token> for TokenResponse {
    fn from(token: Token) -> Self {
        Self {
            value: token.value,
            account_id: token.account_id,
            status: token.status,
            created_at: token.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListTokensResponse {
    pub tokens: Vec<TokenResponse>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub pending: u64,
    pub success: u64,
    pub failed: u64,
    pub total: u64,
}

impl From<LedgerStats> for StatsResponse {
    fn from(stats: LedgerStats) -> Self {
        Self {
            pending: stats.pending,
            success: stats.success,
            failed: stats.failed,
            total: stats.total,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LedgerErrorResponse {
    pub error: String,
}

type LedgerResult<T> = Result<T, (StatusCode, Json<LedgerErrorResponse>)>;

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, Json<LedgerErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(LedgerErrorResponse {
            error: err.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// List pending tokens in insertion order
pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Query(params): Query<ListTokensParams>,
) -> LedgerResult<Json<ListTokensResponse>> {
    let tokens = state
        .ledger()
        .list_pending(&tenant_id, params.account.as_deref())
        .map_err(internal_error)?
        .into_iter()
        .map(TokenResponse::from)
        .collect();
    Ok(Json(ListTokensResponse { tokens }))
}

/// Ledger counters by status
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Query(params): Query<StatsParams>,
) -> LedgerResult<Json<StatsResponse>> {
    let stats = state
        .ledger()
        .stats(&tenant_id, params.account.as_deref())
        .map_err(internal_error)?;
    Ok(Json(stats.into()))
}
