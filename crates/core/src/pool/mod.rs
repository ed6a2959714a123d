//! Account pool: tenants, their external accounts, and per-cycle
//! eligibility.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTenantStore;
pub use store::TenantStore;
pub use types::{Account, Policy, PoolError, Tenant};

use std::sync::Arc;

use crate::ledger::TokenLedger;

/// Eligibility logic over the tenant store and the token ledger.
#[derive(Clone)]
pub struct AccountPool {
    store: Arc<dyn TenantStore>,
    ledger: Arc<dyn TokenLedger>,
}

impl AccountPool {
    pub fn new(store: Arc<dyn TenantStore>, ledger: Arc<dyn TokenLedger>) -> Self {
        Self { store, ledger }
    }

    /// Accounts with `active = true`, in stable order.
    pub fn active_accounts(&self, tenant_id: &str) -> Result<Vec<Account>, PoolError> {
        Ok(self
            .store
            .list_accounts(tenant_id)?
            .into_iter()
            .filter(|a| a.active)
            .collect())
    }

    /// Active accounts that may still promote this cycle: under the cap by
    /// `used_count`, or holding at least one pending token. The backlog
    /// override keeps an over-cap account eligible until its pending work
    /// drains.
    pub fn eligible(&self, tenant_id: &str, cap: u32) -> Result<Vec<Account>, PoolError> {
        let mut eligible = Vec::new();
        for account in self.active_accounts(tenant_id)? {
            if account.used_count <= cap {
                eligible.push(account);
                continue;
            }
            let pending = self.ledger.stats(tenant_id, Some(&account.id))?.pending;
            if pending > 0 {
                eligible.push(account);
            }
        }
        Ok(eligible)
    }

    pub fn increment_used(&self, account_id: &str) -> Result<(), PoolError> {
        self.store.increment_used(account_id)
    }

    pub fn reset_used(&self, tenant_id: &str) -> Result<(), PoolError> {
        self.store.reset_used(tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SqliteTokenLedger;

    fn setup() -> (Arc<SqliteTenantStore>, Arc<SqliteTokenLedger>, AccountPool) {
        let store = Arc::new(SqliteTenantStore::in_memory().unwrap());
        let ledger = Arc::new(SqliteTokenLedger::in_memory().unwrap());
        let pool = AccountPool::new(store.clone(), ledger.clone());
        (store, ledger, pool)
    }

    fn seed_accounts(store: &SqliteTenantStore, tenant_id: &str, ids: &[&str]) {
        store.upsert_tenant(tenant_id, 100).unwrap();
        for id in ids {
            store.upsert_account(tenant_id, id, "cookie").unwrap();
        }
    }

    #[test]
    fn test_active_accounts_filters_inactive() {
        let (store, _ledger, pool) = setup();
        seed_accounts(&store, "t1", &["a1", "a2"]);
        store.set_account_active("a2", false).unwrap();

        let active = pool.active_accounts("t1").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "a1");
    }

    #[test]
    fn test_eligible_under_cap() {
        let (store, _ledger, pool) = setup();
        seed_accounts(&store, "t1", &["a1", "a2"]);
        store.increment_used("a1").unwrap();
        store.increment_used("a1").unwrap();

        // cap 1: a1 has used 2 and no pending backlog, a2 has used 0.
        let eligible = pool.eligible("t1", 1).unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, "a2");
    }

    #[test]
    fn test_over_cap_account_with_backlog_stays_eligible() {
        let (store, ledger, pool) = setup();
        seed_accounts(&store, "t1", &["a1"]);
        store.increment_used("a1").unwrap();
        store.increment_used("a1").unwrap();
        ledger
            .add_candidates("t1", "a1", &["tok-1".to_string()])
            .unwrap();

        let eligible = pool.eligible("t1", 1).unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, "a1");
    }

    #[test]
    fn test_eligible_preserves_account_order() {
        let (store, _ledger, pool) = setup();
        seed_accounts(&store, "t1", &["a1", "a2", "a3"]);

        let ids: Vec<String> = pool
            .eligible("t1", 5)
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["a1", "a2", "a3"]);
    }
}
