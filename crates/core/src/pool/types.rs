//! Tenant and account types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Candidate-selection policy for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Walk eligible accounts in order, retrying the next account within
    /// the same run when a promotion fails.
    Sequential,
    /// Pick uniformly from the cross-account pending pool.
    Random,
    /// Rotate through accounts, advancing the pointer only on success.
    RoundRobin,
    /// One oldest-per-account representative, with irregular rerun delays.
    NaturalFlow,
}

impl Default for Policy {
    fn default() -> Self {
        Policy::Sequential
    }
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Sequential => "sequential",
            Policy::Random => "random",
            Policy::RoundRobin => "round_robin",
            Policy::NaturalFlow => "natural_flow",
        }
    }

    pub fn parse(s: &str) -> Option<Policy> {
        match s {
            "sequential" => Some(Policy::Sequential),
            "random" => Some(Policy::Random),
            "round_robin" => Some(Policy::RoundRobin),
            "natural_flow" => Some(Policy::NaturalFlow),
            _ => None,
        }
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chat-scoped automation context.
///
/// Tenants are created on first interaction and never deleted; disabling
/// happens through the `active` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub active: bool,
    /// Total promotions desired across all accounts per cycle.
    pub daily_cap: u32,
    /// Derived at cycle start: `round(daily_cap / account_count)`.
    pub per_account_cap: u32,
    pub policy: Policy,
    /// Pointer for the round-robin policy; advanced only on success.
    pub last_round_robin_account: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One external login bound to a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// External identifier, e.g. a phone number.
    pub id: String,
    pub tenant_id: String,
    /// Opaque session credential supplied by the login flow.
    pub credential: String,
    pub active: bool,
    /// Promotions completed by this account in the current cycle.
    pub used_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Errors from tenant/account operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    #[error("database error: {0}")]
    Database(String),
    #[error("tenant not found: {0}")]
    TenantNotFound(String),
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_default_is_sequential() {
        assert_eq!(Policy::default(), Policy::Sequential);
    }

    #[test]
    fn test_policy_string_round_trip() {
        for policy in [
            Policy::Sequential,
            Policy::Random,
            Policy::RoundRobin,
            Policy::NaturalFlow,
        ] {
            assert_eq!(Policy::parse(policy.as_str()), Some(policy));
        }
        assert_eq!(Policy::parse("bogus"), None);
    }

    #[test]
    fn test_policy_serde_form() {
        let json = serde_json::to_string(&Policy::RoundRobin).unwrap();
        assert_eq!(json, "\"round_robin\"");
    }

    #[test]
    fn test_pool_error_display() {
        let err = PoolError::TenantNotFound("chat-1".to_string());
        assert_eq!(err.to_string(), "tenant not found: chat-1");
    }
}
