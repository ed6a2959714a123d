//! Testing utilities and mock implementations for engine tests.
//!
//! Mocks for the two external seams, the promotion site API and the
//! notification channel, plus fixtures for common store setup.
//!
//! # Example
//!
//! ```rust,ignore
//! use bumper_core::testing::{MockNotifier, MockPromotionApi};
//!
//! let api = MockPromotionApi::new();
//! let notifier = MockNotifier::new();
//!
//! api.set_candidates("cookie", &["tok-1"]).await;
//!
//! // Use in a PromotionEngine...
//! ```

mod mock_api;
mod mock_notifier;

pub use mock_api::MockPromotionApi;
pub use mock_notifier::MockNotifier;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;

    use crate::ledger::{SqliteTokenLedger, TokenLedger};
    use crate::pool::{Account, Policy, SqliteTenantStore, Tenant, TenantStore};

    /// In-memory store pair shared by most engine tests.
    pub fn stores() -> (Arc<SqliteTenantStore>, Arc<SqliteTokenLedger>) {
        let store = Arc::new(SqliteTenantStore::in_memory().unwrap());
        let ledger = Arc::new(SqliteTokenLedger::in_memory().unwrap());
        (store, ledger)
    }

    /// Create an active tenant with the given policy and daily cap.
    pub fn tenant(store: &dyn TenantStore, id: &str, policy: Policy, daily_cap: u32) -> Tenant {
        store.upsert_tenant(id, daily_cap).unwrap();
        store.set_tenant_active(id, true).unwrap();
        store.set_policy(id, policy).unwrap();
        store.get_tenant(id).unwrap().unwrap()
    }

    /// Register an account whose credential is `cookie-{id}`.
    pub fn account(store: &dyn TenantStore, tenant_id: &str, id: &str) -> Account {
        store
            .upsert_account(tenant_id, id, &format!("cookie-{id}"))
            .unwrap()
    }

    /// Seed pending tokens for an account.
    pub fn seed_tokens(ledger: &dyn TokenLedger, tenant_id: &str, account_id: &str, values: &[&str]) {
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        ledger.add_candidates(tenant_id, account_id, &values).unwrap();
    }
}
