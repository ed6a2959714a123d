use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{accounts, engine, handlers, ledger, middleware, tenants};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Tenants
        .route("/tenants", get(tenants::list_tenants))
        .route("/tenants/{id}", post(tenants::upsert_tenant))
        .route("/tenants/{id}", get(tenants::get_tenant))
        .route("/tenants/{id}/settings", post(tenants::update_settings))
        // Accounts
        .route("/tenants/{id}/accounts", get(accounts::list_accounts))
        .route("/tenants/{id}/accounts", post(accounts::upsert_account))
        .route("/accounts/{id}", post(accounts::update_account))
        // Token ledger
        .route("/tenants/{id}/tokens", get(ledger::list_pending))
        .route("/tenants/{id}/stats", get(ledger::get_stats))
        // Promotion engine
        .route("/engine/status", get(engine::get_status))
        .route("/tenants/{id}/start", post(engine::start_cycle))
        .route("/tenants/{id}/stop", post(engine::stop_cycle))
        .route("/tenants/{id}/tick", post(engine::run_tick))
        .route("/tenants/{id}/reset", post(engine::reset))
        .route("/tenants/{id}/auto-start", post(engine::enable_auto_start))
        .route(
            "/tenants/{id}/auto-start",
            delete(engine::disable_auto_start),
        )
        .with_state(Arc::clone(&state));

    let metrics_route = Router::new()
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(metrics_route)
        .layer(axum_middleware::from_fn(middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
