//! Token lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a promotion token.
///
/// A token starts out `Pending` and moves exactly once to either `Success`
/// or `Failed`. Terminal statuses are never reverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Waiting to be promoted.
    Pending,
    /// Promotion completed.
    Success,
    /// Promotion failed at some pipeline step.
    Failed,
}

impl TokenStatus {
    /// Whether this status is terminal (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TokenStatus::Pending)
    }

    /// Stable string form used for storage and filtering.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Pending => "pending",
            TokenStatus::Success => "success",
            TokenStatus::Failed => "failed",
        }
    }

    /// Parse the stable string form back into a status.
    pub fn parse(s: &str) -> Option<TokenStatus> {
        match s {
            "pending" => Some(TokenStatus::Pending),
            "success" => Some(TokenStatus::Success),
            "failed" => Some(TokenStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate identifier for one promotable listing, scoped to
/// (tenant, account).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Owning tenant.
    pub tenant_id: String,
    /// Owning account.
    pub account_id: String,
    /// The opaque listing identifier.
    pub value: String,
    /// Current lifecycle status.
    pub status: TokenStatus,
    /// When the token was first recorded.
    pub created_at: DateTime<Utc>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

/// Bucket counts for a tenant (optionally narrowed to one account).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub pending: u64,
    pub success: u64,
    pub failed: u64,
    pub total: u64,
}

/// Errors from ledger operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_is_not_terminal() {
        assert!(!TokenStatus::Pending.is_terminal());
    }

    #[test]
    fn test_success_and_failed_are_terminal() {
        assert!(TokenStatus::Success.is_terminal());
        assert!(TokenStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            TokenStatus::Pending,
            TokenStatus::Success,
            TokenStatus::Failed,
        ] {
            assert_eq!(TokenStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TokenStatus::parse("bogus"), None);
    }

    #[test]
    fn test_status_serde_form() {
        let json = serde_json::to_string(&TokenStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
        let back: TokenStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(back, TokenStatus::Failed);
    }

    #[test]
    fn test_stats_default_is_empty() {
        let stats = LedgerStats::default();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.pending, 0);
    }
}
