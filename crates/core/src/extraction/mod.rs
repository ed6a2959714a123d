//! Extraction: refilling the token ledger from the upstream site, and the
//! auto-reset cycle that keeps a tenant's loop self-sustaining.

use std::sync::Arc;

use tracing::{info, warn};

use crate::ledger::TokenLedger;
use crate::metrics;
use crate::pool::{Account, AccountPool};
use crate::upstream::PromotionApi;

/// Errors from extraction bookkeeping. Upstream listing failures are
/// per-account and never fatal; the affected account is skipped.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractionError {
    #[error("ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),
    #[error("pool error: {0}")]
    Pool(#[from] crate::pool::PoolError),
}

/// Decides when and how to refill the ledger.
#[derive(Clone)]
pub struct ExtractionCoordinator {
    api: Arc<dyn PromotionApi>,
    ledger: Arc<dyn TokenLedger>,
    pool: AccountPool,
}

impl ExtractionCoordinator {
    pub fn new(api: Arc<dyn PromotionApi>, ledger: Arc<dyn TokenLedger>, pool: AccountPool) -> Self {
        Self { api, ledger, pool }
    }

    /// Refill the ledger from the upstream site, but only when no pending
    /// token is left anywhere for the tenant. Returns the number of fresh
    /// candidates inserted. A failing account is skipped; the others still
    /// refill.
    pub async fn refill_if_needed(
        &self,
        tenant_id: &str,
        accounts: &[Account],
    ) -> Result<usize, ExtractionError> {
        if self.ledger.has_pending(tenant_id)? {
            return Ok(0);
        }
        self.refill(tenant_id, accounts).await
    }

    async fn refill(
        &self,
        tenant_id: &str,
        accounts: &[Account],
    ) -> Result<usize, ExtractionError> {
        let mut inserted = 0;
        for account in accounts {
            match self.api.list_candidates(&account.credential).await {
                Ok(values) => {
                    let fresh = self.ledger.add_candidates(tenant_id, &account.id, &values)?;
                    if fresh > 0 {
                        info!(
                            "extracted {} fresh candidates for account {} of tenant {}",
                            fresh, account.id, tenant_id
                        );
                    }
                    inserted += fresh;
                }
                Err(e) => {
                    warn!(
                        "candidate listing failed for account {} of tenant {}, skipping: {}",
                        account.id, tenant_id, e
                    );
                }
            }
        }
        metrics::TOKENS_EXTRACTED.inc_by(inserted as u64);
        Ok(inserted)
    }

    /// After a promotion empties the ledger (no pending left and at least
    /// one terminal token), clear everything, zero the usage counters, and
    /// refill immediately. Returns the refill count when a reset fired.
    pub async fn auto_reset_if_drained(
        &self,
        tenant_id: &str,
    ) -> Result<Option<usize>, ExtractionError> {
        let stats = self.ledger.stats(tenant_id, None)?;
        if stats.pending > 0 || stats.total == 0 {
            return Ok(None);
        }

        info!(
            "ledger drained for tenant {} ({} success, {} failed), starting reset cycle",
            tenant_id, stats.success, stats.failed
        );
        metrics::CYCLE_RESETS.inc();

        self.ledger.clear(tenant_id)?;
        self.pool.reset_used(tenant_id)?;

        let accounts = self.pool.active_accounts(tenant_id)?;
        let inserted = self.refill(tenant_id, &accounts).await?;
        Ok(Some(inserted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{SqliteTokenLedger, TokenStatus};
    use crate::pool::{SqliteTenantStore, TenantStore};
    use crate::testing::MockPromotionApi;

    struct Setup {
        store: Arc<SqliteTenantStore>,
        ledger: Arc<SqliteTokenLedger>,
        api: Arc<MockPromotionApi>,
        coordinator: ExtractionCoordinator,
    }

    fn setup() -> Setup {
        let store = Arc::new(SqliteTenantStore::in_memory().unwrap());
        let ledger = Arc::new(SqliteTokenLedger::in_memory().unwrap());
        let api = Arc::new(MockPromotionApi::new());
        let pool = AccountPool::new(store.clone(), ledger.clone());
        let coordinator = ExtractionCoordinator::new(api.clone(), ledger.clone(), pool);
        store.upsert_tenant("t1", 100).unwrap();
        store.upsert_account("t1", "a1", "cookie-1").unwrap();
        store.upsert_account("t1", "a2", "cookie-2").unwrap();
        Setup {
            store,
            ledger,
            api,
            coordinator,
        }
    }

    fn accounts(s: &Setup) -> Vec<Account> {
        s.store.list_accounts("t1").unwrap()
    }

    #[tokio::test]
    async fn test_refill_fetches_per_account() {
        let s = setup();
        s.api.set_candidates("cookie-1", &["tok-1", "tok-2"]).await;
        s.api.set_candidates("cookie-2", &["tok-3"]).await;

        let inserted = s
            .coordinator
            .refill_if_needed("t1", &accounts(&s))
            .await
            .unwrap();

        assert_eq!(inserted, 3);
        assert_eq!(s.ledger.list_pending("t1", Some("a1")).unwrap().len(), 2);
        assert_eq!(s.ledger.list_pending("t1", Some("a2")).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refill_skipped_while_pending_exists() {
        let s = setup();
        s.ledger
            .add_candidates("t1", "a1", &["existing".to_string()])
            .unwrap();
        s.api.set_candidates("cookie-1", &["tok-1"]).await;

        let inserted = s
            .coordinator
            .refill_if_needed("t1", &accounts(&s))
            .await
            .unwrap();

        assert_eq!(inserted, 0);
        assert_eq!(s.api.list_call_count().await, 0);
    }

    #[tokio::test]
    async fn test_failing_account_is_skipped() {
        let s = setup();
        s.api.fail_listing_for("cookie-1").await;
        s.api.set_candidates("cookie-2", &["tok-3"]).await;

        let inserted = s
            .coordinator
            .refill_if_needed("t1", &accounts(&s))
            .await
            .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(s.ledger.list_pending("t1", Some("a2")).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refill_dedups_against_existing_buckets() {
        let s = setup();
        s.ledger
            .add_candidates("t1", "a1", &["tok-1".to_string()])
            .unwrap();
        s.ledger
            .transition("t1", "a1", "tok-1", TokenStatus::Success)
            .unwrap();
        s.api.set_candidates("cookie-1", &["tok-1", "tok-2"]).await;

        let inserted = s
            .coordinator
            .refill_if_needed("t1", &accounts(&s))
            .await
            .unwrap();

        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn test_auto_reset_fires_only_when_drained() {
        let s = setup();

        // Empty ledger: nothing to reset.
        assert_eq!(
            s.coordinator.auto_reset_if_drained("t1").await.unwrap(),
            None
        );

        // Pending work left: no reset.
        s.ledger
            .add_candidates("t1", "a1", &["tok-1".to_string(), "tok-2".to_string()])
            .unwrap();
        s.ledger
            .transition("t1", "a1", "tok-1", TokenStatus::Success)
            .unwrap();
        assert_eq!(
            s.coordinator.auto_reset_if_drained("t1").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_auto_reset_clears_and_refills() {
        let s = setup();
        s.store.increment_used("a1").unwrap();
        s.ledger
            .add_candidates("t1", "a1", &["tok-1".to_string()])
            .unwrap();
        s.ledger
            .transition("t1", "a1", "tok-1", TokenStatus::Success)
            .unwrap();
        s.api.set_candidates("cookie-1", &["fresh-1", "fresh-2"]).await;

        let result = s.coordinator.auto_reset_if_drained("t1").await.unwrap();

        assert_eq!(result, Some(2));
        // Old terminal tokens are gone, usage counters zeroed, fresh
        // pending in place.
        let stats = s.ledger.stats("t1", None).unwrap();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.success, 0);
        assert_eq!(s.store.get_account("a1").unwrap().unwrap().used_count, 0);
    }
}
