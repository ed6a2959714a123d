//! Candidate selection: the four policies over the account pool and the
//! token ledger.

use std::sync::Arc;

use rand::seq::IndexedRandom;

use crate::ledger::{LedgerError, Token, TokenLedger};
use crate::pool::{Account, Policy, Tenant};

/// What the policy decided for this run.
#[derive(Debug, Clone)]
pub enum Selection {
    /// No eligible candidate anywhere; the run ends with a notification.
    Empty,
    /// Exactly one attempt, regardless of outcome.
    One(Account, Token),
    /// Attempt in order, stopping at the first success. Only the
    /// sequential policy produces this.
    Ordered(Vec<(Account, Token)>),
}

/// Applies the tenant's configured policy to the eligible accounts and the
/// pending buckets.
#[derive(Clone)]
pub struct CandidateSelector {
    ledger: Arc<dyn TokenLedger>,
}

impl CandidateSelector {
    pub fn new(ledger: Arc<dyn TokenLedger>) -> Self {
        Self { ledger }
    }

    pub fn select(
        &self,
        tenant: &Tenant,
        eligible: &[Account],
    ) -> Result<Selection, LedgerError> {
        match tenant.policy {
            Policy::Sequential => self.sequential(tenant, eligible),
            Policy::Random => self.random(tenant, eligible),
            Policy::RoundRobin => self.round_robin(tenant, eligible),
            Policy::NaturalFlow => self.natural_flow(tenant, eligible),
        }
    }

    /// Oldest pending token of the given account, if any.
    fn oldest_pending(
        &self,
        tenant: &Tenant,
        account: &Account,
    ) -> Result<Option<Token>, LedgerError> {
        Ok(self
            .ledger
            .list_pending(&tenant.id, Some(&account.id))?
            .into_iter()
            .next())
    }

    /// Each eligible account's oldest pending token, in stable account
    /// order. The caller walks the list until one attempt succeeds.
    fn sequential(
        &self,
        tenant: &Tenant,
        eligible: &[Account],
    ) -> Result<Selection, LedgerError> {
        let mut candidates = Vec::new();
        for account in eligible {
            if let Some(token) = self.oldest_pending(tenant, account)? {
                candidates.push((account.clone(), token));
            }
        }
        if candidates.is_empty() {
            Ok(Selection::Empty)
        } else {
            Ok(Selection::Ordered(candidates))
        }
    }

    /// Uniform pick over the full cross-account pending pool.
    fn random(&self, tenant: &Tenant, eligible: &[Account]) -> Result<Selection, LedgerError> {
        let mut pool = Vec::new();
        for account in eligible {
            for token in self.ledger.list_pending(&tenant.id, Some(&account.id))? {
                pool.push((account.clone(), token));
            }
        }
        match pool.choose(&mut rand::rng()) {
            Some((account, token)) => Ok(Selection::One(account.clone(), token.clone())),
            None => Ok(Selection::Empty),
        }
    }

    /// Circular scan starting immediately after the last successful
    /// account; the first account with a pending token wins. The pointer
    /// itself is only advanced by the caller on success.
    fn round_robin(
        &self,
        tenant: &Tenant,
        eligible: &[Account],
    ) -> Result<Selection, LedgerError> {
        if eligible.is_empty() {
            return Ok(Selection::Empty);
        }

        let start = match &tenant.last_round_robin_account {
            Some(last) => eligible
                .iter()
                .position(|a| &a.id == last)
                .map(|pos| (pos + 1) % eligible.len())
                .unwrap_or(0),
            None => 0,
        };

        for offset in 0..eligible.len() {
            let account = &eligible[(start + offset) % eligible.len()];
            if let Some(token) = self.oldest_pending(tenant, account)? {
                return Ok(Selection::One(account.clone(), token));
            }
        }
        Ok(Selection::Empty)
    }

    /// First per-account oldest-token representative in account iteration
    /// order. Deliberately not a global oldest-first merge across
    /// accounts; the literal behavior is the contract.
    fn natural_flow(
        &self,
        tenant: &Tenant,
        eligible: &[Account],
    ) -> Result<Selection, LedgerError> {
        for account in eligible {
            if let Some(token) = self.oldest_pending(tenant, account)? {
                return Ok(Selection::One(account.clone(), token));
            }
        }
        Ok(Selection::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SqliteTokenLedger;
    use crate::pool::{SqliteTenantStore, TenantStore};

    struct Setup {
        store: Arc<SqliteTenantStore>,
        ledger: Arc<SqliteTokenLedger>,
        selector: CandidateSelector,
    }

    fn setup(policy: Policy, accounts: &[&str]) -> Setup {
        let store = Arc::new(SqliteTenantStore::in_memory().unwrap());
        let ledger = Arc::new(SqliteTokenLedger::in_memory().unwrap());
        store.upsert_tenant("t1", 100).unwrap();
        store.set_policy("t1", policy).unwrap();
        for id in accounts {
            store.upsert_account("t1", id, "cookie").unwrap();
        }
        let selector = CandidateSelector::new(ledger.clone());
        Setup {
            store,
            ledger,
            selector,
        }
    }

    fn tenant(s: &Setup) -> Tenant {
        s.store.get_tenant("t1").unwrap().unwrap()
    }

    fn accounts(s: &Setup) -> Vec<Account> {
        s.store.list_accounts("t1").unwrap()
    }

    fn add(s: &Setup, account: &str, values: &[&str]) {
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        s.ledger.add_candidates("t1", account, &values).unwrap();
    }

    #[test]
    fn test_sequential_orders_oldest_per_account() {
        let s = setup(Policy::Sequential, &["a1", "a2", "a3"]);
        add(&s, "a1", &["a1-old", "a1-new"]);
        add(&s, "a3", &["a3-old"]);

        let selection = s.selector.select(&tenant(&s), &accounts(&s)).unwrap();
        match selection {
            Selection::Ordered(candidates) => {
                let pairs: Vec<(String, String)> = candidates
                    .into_iter()
                    .map(|(a, t)| (a.id, t.value))
                    .collect();
                assert_eq!(
                    pairs,
                    vec![
                        ("a1".to_string(), "a1-old".to_string()),
                        ("a3".to_string(), "a3-old".to_string()),
                    ]
                );
            }
            other => panic!("expected ordered selection, got {:?}", other),
        }
    }

    #[test]
    fn test_random_picks_from_pending_pool() {
        let s = setup(Policy::Random, &["a1", "a2"]);
        add(&s, "a1", &["tok-1", "tok-2"]);
        add(&s, "a2", &["tok-3"]);

        for _ in 0..10 {
            let selection = s.selector.select(&tenant(&s), &accounts(&s)).unwrap();
            match selection {
                Selection::One(account, token) => {
                    assert_eq!(token.account_id, account.id);
                    assert!(["tok-1", "tok-2", "tok-3"].contains(&token.value.as_str()));
                }
                other => panic!("expected one selection, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_round_robin_starts_after_last_account() {
        let s = setup(Policy::RoundRobin, &["a", "b", "c"]);
        add(&s, "a", &["tok-a"]);
        add(&s, "b", &["tok-b"]);
        add(&s, "c", &["tok-c"]);
        s.store.set_last_round_robin("t1", Some("b")).unwrap();

        let selection = s.selector.select(&tenant(&s), &accounts(&s)).unwrap();
        match selection {
            Selection::One(account, token) => {
                assert_eq!(account.id, "c");
                assert_eq!(token.value, "tok-c");
            }
            other => panic!("expected one selection, got {:?}", other),
        }
    }

    #[test]
    fn test_round_robin_wraps_when_next_has_no_pending() {
        let s = setup(Policy::RoundRobin, &["a", "b", "c"]);
        add(&s, "a", &["tok-a"]);
        s.store.set_last_round_robin("t1", Some("b")).unwrap();

        // c has no pending, so the scan wraps around to a.
        let selection = s.selector.select(&tenant(&s), &accounts(&s)).unwrap();
        match selection {
            Selection::One(account, _) => assert_eq!(account.id, "a"),
            other => panic!("expected one selection, got {:?}", other),
        }
    }

    #[test]
    fn test_round_robin_unset_pointer_starts_at_first() {
        let s = setup(Policy::RoundRobin, &["a", "b"]);
        add(&s, "a", &["tok-a"]);
        add(&s, "b", &["tok-b"]);

        let selection = s.selector.select(&tenant(&s), &accounts(&s)).unwrap();
        match selection {
            Selection::One(account, _) => assert_eq!(account.id, "a"),
            other => panic!("expected one selection, got {:?}", other),
        }
    }

    #[test]
    fn test_round_robin_missing_pointer_account_starts_at_first() {
        let s = setup(Policy::RoundRobin, &["a", "b"]);
        add(&s, "b", &["tok-b"]);
        // The pointer names an account no longer eligible.
        s.store.set_last_round_robin("t1", Some("gone")).unwrap();

        let selection = s.selector.select(&tenant(&s), &accounts(&s)).unwrap();
        match selection {
            Selection::One(account, _) => assert_eq!(account.id, "b"),
            other => panic!("expected one selection, got {:?}", other),
        }
    }

    #[test]
    fn test_natural_flow_takes_first_representative() {
        let s = setup(Policy::NaturalFlow, &["a1", "a2"]);
        add(&s, "a2", &["a2-old"]);
        add(&s, "a1", &["a1-old"]);

        // a2's token is globally older, but a1 comes first in account
        // iteration order.
        let selection = s.selector.select(&tenant(&s), &accounts(&s)).unwrap();
        match selection {
            Selection::One(account, token) => {
                assert_eq!(account.id, "a1");
                assert_eq!(token.value, "a1-old");
            }
            other => panic!("expected one selection, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_when_no_pending_anywhere() {
        for policy in [
            Policy::Sequential,
            Policy::Random,
            Policy::RoundRobin,
            Policy::NaturalFlow,
        ] {
            let s = setup(policy, &["a1", "a2"]);
            let selection = s.selector.select(&tenant(&s), &accounts(&s)).unwrap();
            assert!(matches!(selection, Selection::Empty));
        }
    }

    #[test]
    fn test_terminal_tokens_are_never_selected() {
        use crate::ledger::TokenStatus;

        let s = setup(Policy::Sequential, &["a1"]);
        add(&s, "a1", &["tok-1", "tok-2"]);
        s.ledger
            .transition("t1", "a1", "tok-1", TokenStatus::Failed)
            .unwrap();

        let selection = s.selector.select(&tenant(&s), &accounts(&s)).unwrap();
        match selection {
            Selection::Ordered(candidates) => {
                assert_eq!(candidates.len(), 1);
                assert_eq!(candidates[0].1.value, "tok-2");
            }
            other => panic!("expected ordered selection, got {:?}", other),
        }
    }
}
