//! Tenant/account storage trait.

use super::{Account, Policy, PoolError, Tenant};

/// Persistent records for tenants, their accounts, and scheduled-job
/// bookkeeping.
pub trait TenantStore: Send + Sync {
    /// Fetch a tenant, creating it with defaults on first sight.
    fn upsert_tenant(&self, tenant_id: &str, default_daily_cap: u32) -> Result<Tenant, PoolError>;

    fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, PoolError>;

    fn list_tenants(&self) -> Result<Vec<Tenant>, PoolError>;

    fn set_tenant_active(&self, tenant_id: &str, active: bool) -> Result<(), PoolError>;

    fn set_policy(&self, tenant_id: &str, policy: Policy) -> Result<(), PoolError>;

    fn set_daily_cap(&self, tenant_id: &str, cap: u32) -> Result<(), PoolError>;

    fn set_per_account_cap(&self, tenant_id: &str, cap: u32) -> Result<(), PoolError>;

    fn set_last_round_robin(
        &self,
        tenant_id: &str,
        account_id: Option<&str>,
    ) -> Result<(), PoolError>;

    /// Insert an account or refresh its credential when it already exists.
    fn upsert_account(
        &self,
        tenant_id: &str,
        account_id: &str,
        credential: &str,
    ) -> Result<Account, PoolError>;

    fn get_account(&self, account_id: &str) -> Result<Option<Account>, PoolError>;

    /// Accounts for a tenant in their stable creation order.
    fn list_accounts(&self, tenant_id: &str) -> Result<Vec<Account>, PoolError>;

    fn set_account_active(&self, account_id: &str, active: bool) -> Result<(), PoolError>;

    fn increment_used(&self, account_id: &str) -> Result<(), PoolError>;

    /// Zero `used_count` on every account of the tenant.
    fn reset_used(&self, tenant_id: &str) -> Result<(), PoolError>;

    /// Record a scheduled job id for (tenant, kind). Written before the
    /// in-process timer is created so a crash can be detected on restart.
    fn record_job(&self, tenant_id: &str, kind: &str, job_id: &str) -> Result<(), PoolError>;

    fn clear_job(&self, tenant_id: &str, kind: &str) -> Result<(), PoolError>;

    /// All persisted (tenant_id, kind, job_id) records.
    fn list_jobs(&self) -> Result<Vec<(String, String, String)>, PoolError>;
}
