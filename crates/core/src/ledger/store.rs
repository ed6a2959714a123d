//! Token ledger storage trait.

use super::{LedgerError, LedgerStats, Token, TokenStatus};

/// Per-tenant, per-account record of candidate tokens and their lifecycle
/// status.
///
/// Implementations must preserve insertion order for pending tokens: every
/// selection policy depends on "oldest first" meaning "first inserted".
pub trait TokenLedger: Send + Sync {
    /// Insert candidate values not already present in any bucket for the
    /// given (tenant, account). Returns the number actually inserted, so
    /// re-extraction of the same listing set is idempotent.
    fn add_candidates(
        &self,
        tenant_id: &str,
        account_id: &str,
        values: &[String],
    ) -> Result<usize, LedgerError>;

    /// Move a pending token to a terminal status. Returns false when the
    /// value is unknown or already terminal; terminal statuses are never
    /// reverted.
    fn transition(
        &self,
        tenant_id: &str,
        account_id: &str,
        value: &str,
        new_status: TokenStatus,
    ) -> Result<bool, LedgerError>;

    /// Pending tokens in insertion order (oldest first), optionally
    /// narrowed to one account.
    fn list_pending(
        &self,
        tenant_id: &str,
        account_id: Option<&str>,
    ) -> Result<Vec<Token>, LedgerError>;

    /// Whether the tenant has any pending token across all accounts.
    fn has_pending(&self, tenant_id: &str) -> Result<bool, LedgerError>;

    /// Bucket counts, optionally narrowed to one account.
    fn stats(&self, tenant_id: &str, account_id: Option<&str>)
        -> Result<LedgerStats, LedgerError>;

    /// Remove every token for the tenant. Used by reset-cycle operations
    /// only.
    fn clear(&self, tenant_id: &str) -> Result<(), LedgerError>;
}
