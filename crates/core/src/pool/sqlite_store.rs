//! SQLite-backed tenant/account store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{Account, Policy, PoolError, Tenant, TenantStore};

/// SQLite-backed tenant/account store.
pub struct SqliteTenantStore {
    conn: Mutex<Connection>,
}

impl SqliteTenantStore {
    /// Create a new store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, PoolError> {
        let conn = Connection::open(path).map_err(|e| PoolError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, PoolError> {
        let conn = Connection::open_in_memory().map_err(|e| PoolError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), PoolError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                active INTEGER NOT NULL DEFAULT 0,
                daily_cap INTEGER NOT NULL,
                per_account_cap INTEGER NOT NULL DEFAULT 0,
                policy TEXT NOT NULL,
                last_round_robin_account TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                credential TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                used_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_tenant ON accounts(tenant_id);

            CREATE TABLE IF NOT EXISTS jobs (
                tenant_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                job_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(tenant_id, kind)
            );
            "#,
        )
        .map_err(|e| PoolError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_tenant(row: &rusqlite::Row) -> rusqlite::Result<Tenant> {
        let id: String = row.get(0)?;
        let active: bool = row.get(1)?;
        let daily_cap: u32 = row.get(2)?;
        let per_account_cap: u32 = row.get(3)?;
        let policy_str: String = row.get(4)?;
        let last_round_robin_account: Option<String> = row.get(5)?;
        let created_at_str: String = row.get(6)?;

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Tenant {
            id,
            active,
            daily_cap,
            per_account_cap,
            policy: Policy::parse(&policy_str).unwrap_or_default(),
            last_round_robin_account,
            created_at,
        })
    }

    fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
        let id: String = row.get(0)?;
        let tenant_id: String = row.get(1)?;
        let credential: String = row.get(2)?;
        let active: bool = row.get(3)?;
        let used_count: u32 = row.get(4)?;
        let created_at_str: String = row.get(5)?;

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Account {
            id,
            tenant_id,
            credential,
            active,
            used_count,
            created_at,
        })
    }

    fn update_tenant_field(
        &self,
        tenant_id: &str,
        sql: &str,
        value: &dyn rusqlite::ToSql,
    ) -> Result<(), PoolError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(sql, params![value, tenant_id])
            .map_err(|e| PoolError::Database(e.to_string()))?;
        if changed == 0 {
            return Err(PoolError::TenantNotFound(tenant_id.to_string()));
        }
        Ok(())
    }
}

const TENANT_COLUMNS: &str =
    "id, active, daily_cap, per_account_cap, policy, last_round_robin_account, created_at";
const ACCOUNT_COLUMNS: &str = "id, tenant_id, credential, active, used_count, created_at";

impl TenantStore for SqliteTenantStore {
    fn upsert_tenant(&self, tenant_id: &str, default_daily_cap: u32) -> Result<Tenant, PoolError> {
        {
            let conn = self.conn.lock().unwrap();
            // New tenants start disabled, matching how they are created on
            // first interaction before any account exists.
            conn.execute(
                "INSERT OR IGNORE INTO tenants (id, active, daily_cap, policy, created_at) VALUES (?, 0, ?, ?, ?)",
                params![
                    tenant_id,
                    default_daily_cap,
                    Policy::default().as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| PoolError::Database(e.to_string()))?;
        }

        self.get_tenant(tenant_id)?
            .ok_or_else(|| PoolError::TenantNotFound(tenant_id.to_string()))
    }

    fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, PoolError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?"),
            params![tenant_id],
            Self::row_to_tenant,
        )
        .optional()
        .map_err(|e| PoolError::Database(e.to_string()))
    }

    fn list_tenants(&self) -> Result<Vec<Tenant>, PoolError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TENANT_COLUMNS} FROM tenants ORDER BY created_at ASC"
            ))
            .map_err(|e| PoolError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::row_to_tenant)
            .map_err(|e| PoolError::Database(e.to_string()))?;

        let mut tenants = Vec::new();
        for row in rows {
            tenants.push(row.map_err(|e| PoolError::Database(e.to_string()))?);
        }
        Ok(tenants)
    }

    fn set_tenant_active(&self, tenant_id: &str, active: bool) -> Result<(), PoolError> {
        self.update_tenant_field(tenant_id, "UPDATE tenants SET active = ? WHERE id = ?", &active)
    }

    fn set_policy(&self, tenant_id: &str, policy: Policy) -> Result<(), PoolError> {
        self.update_tenant_field(
            tenant_id,
            "UPDATE tenants SET policy = ? WHERE id = ?",
            &policy.as_str(),
        )
    }

    fn set_daily_cap(&self, tenant_id: &str, cap: u32) -> Result<(), PoolError> {
        self.update_tenant_field(tenant_id, "UPDATE tenants SET daily_cap = ? WHERE id = ?", &cap)
    }

    fn set_per_account_cap(&self, tenant_id: &str, cap: u32) -> Result<(), PoolError> {
        self.update_tenant_field(
            tenant_id,
            "UPDATE tenants SET per_account_cap = ? WHERE id = ?",
            &cap,
        )
    }

    fn set_last_round_robin(
        &self,
        tenant_id: &str,
        account_id: Option<&str>,
    ) -> Result<(), PoolError> {
        self.update_tenant_field(
            tenant_id,
            "UPDATE tenants SET last_round_robin_account = ? WHERE id = ?",
            &account_id,
        )
    }

    fn upsert_account(
        &self,
        tenant_id: &str,
        account_id: &str,
        credential: &str,
    ) -> Result<Account, PoolError> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO accounts (id, tenant_id, credential, created_at) VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET credential = excluded.credential, active = 1",
                params![account_id, tenant_id, credential, Utc::now().to_rfc3339()],
            )
            .map_err(|e| PoolError::Database(e.to_string()))?;
        }

        self.get_account(account_id)?
            .ok_or_else(|| PoolError::AccountNotFound(account_id.to_string()))
    }

    fn get_account(&self, account_id: &str) -> Result<Option<Account>, PoolError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"),
            params![account_id],
            Self::row_to_account,
        )
        .optional()
        .map_err(|e| PoolError::Database(e.to_string()))
    }

    fn list_accounts(&self, tenant_id: &str) -> Result<Vec<Account>, PoolError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE tenant_id = ? ORDER BY created_at ASC, id ASC"
            ))
            .map_err(|e| PoolError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![tenant_id], Self::row_to_account)
            .map_err(|e| PoolError::Database(e.to_string()))?;

        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row.map_err(|e| PoolError::Database(e.to_string()))?);
        }
        Ok(accounts)
    }

    fn set_account_active(&self, account_id: &str, active: bool) -> Result<(), PoolError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE accounts SET active = ? WHERE id = ?",
                params![active, account_id],
            )
            .map_err(|e| PoolError::Database(e.to_string()))?;
        if changed == 0 {
            return Err(PoolError::AccountNotFound(account_id.to_string()));
        }
        Ok(())
    }

    fn increment_used(&self, account_id: &str) -> Result<(), PoolError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE accounts SET used_count = used_count + 1 WHERE id = ?",
                params![account_id],
            )
            .map_err(|e| PoolError::Database(e.to_string()))?;
        if changed == 0 {
            return Err(PoolError::AccountNotFound(account_id.to_string()));
        }
        Ok(())
    }

    fn reset_used(&self, tenant_id: &str) -> Result<(), PoolError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE accounts SET used_count = 0 WHERE tenant_id = ?",
            params![tenant_id],
        )
        .map_err(|e| PoolError::Database(e.to_string()))?;
        Ok(())
    }

    fn record_job(&self, tenant_id: &str, kind: &str, job_id: &str) -> Result<(), PoolError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs (tenant_id, kind, job_id, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(tenant_id, kind) DO UPDATE SET job_id = excluded.job_id, created_at = excluded.created_at",
            params![tenant_id, kind, job_id, Utc::now().to_rfc3339()],
        )
        .map_err(|e| PoolError::Database(e.to_string()))?;
        Ok(())
    }

    fn clear_job(&self, tenant_id: &str, kind: &str) -> Result<(), PoolError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM jobs WHERE tenant_id = ? AND kind = ?",
            params![tenant_id, kind],
        )
        .map_err(|e| PoolError::Database(e.to_string()))?;
        Ok(())
    }

    fn list_jobs(&self) -> Result<Vec<(String, String, String)>, PoolError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT tenant_id, kind, job_id FROM jobs ORDER BY created_at ASC")
            .map_err(|e| PoolError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .map_err(|e| PoolError::Database(e.to_string()))?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.map_err(|e| PoolError::Database(e.to_string()))?);
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteTenantStore {
        SqliteTenantStore::in_memory().unwrap()
    }

    #[test]
    fn test_upsert_tenant_creates_with_defaults() {
        let store = create_test_store();
        let tenant = store.upsert_tenant("chat-1", 100).unwrap();

        assert_eq!(tenant.id, "chat-1");
        assert!(!tenant.active);
        assert_eq!(tenant.daily_cap, 100);
        assert_eq!(tenant.policy, Policy::Sequential);
        assert_eq!(tenant.last_round_robin_account, None);
    }

    #[test]
    fn test_upsert_tenant_is_idempotent() {
        let store = create_test_store();
        store.upsert_tenant("chat-1", 100).unwrap();
        store.set_daily_cap("chat-1", 42).unwrap();

        // A second upsert must not clobber existing settings.
        let tenant = store.upsert_tenant("chat-1", 100).unwrap();
        assert_eq!(tenant.daily_cap, 42);
    }

    #[test]
    fn test_tenant_settings_mutations() {
        let store = create_test_store();
        store.upsert_tenant("chat-1", 100).unwrap();

        store.set_tenant_active("chat-1", true).unwrap();
        store.set_policy("chat-1", Policy::RoundRobin).unwrap();
        store.set_per_account_cap("chat-1", 5).unwrap();
        store.set_last_round_robin("chat-1", Some("555-1")).unwrap();

        let tenant = store.get_tenant("chat-1").unwrap().unwrap();
        assert!(tenant.active);
        assert_eq!(tenant.policy, Policy::RoundRobin);
        assert_eq!(tenant.per_account_cap, 5);
        assert_eq!(tenant.last_round_robin_account.as_deref(), Some("555-1"));
    }

    #[test]
    fn test_mutating_unknown_tenant_fails() {
        let store = create_test_store();
        let result = store.set_tenant_active("nope", true);
        assert!(matches!(result, Err(PoolError::TenantNotFound(_))));
    }

    #[test]
    fn test_upsert_account_refreshes_credential() {
        let store = create_test_store();
        store.upsert_tenant("chat-1", 100).unwrap();

        let account = store.upsert_account("chat-1", "555-1", "cookie-a").unwrap();
        assert_eq!(account.credential, "cookie-a");
        assert!(account.active);
        assert_eq!(account.used_count, 0);

        store.set_account_active("555-1", false).unwrap();
        let account = store.upsert_account("chat-1", "555-1", "cookie-b").unwrap();
        // Re-login refreshes the credential and reactivates the account.
        assert_eq!(account.credential, "cookie-b");
        assert!(account.active);
    }

    #[test]
    fn test_list_accounts_is_ordered_by_creation() {
        let store = create_test_store();
        store.upsert_tenant("chat-1", 100).unwrap();
        store.upsert_account("chat-1", "555-1", "c1").unwrap();
        store.upsert_account("chat-1", "555-2", "c2").unwrap();
        store.upsert_account("chat-1", "555-3", "c3").unwrap();

        let ids: Vec<String> = store
            .list_accounts("chat-1")
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["555-1", "555-2", "555-3"]);
    }

    #[test]
    fn test_increment_and_reset_used() {
        let store = create_test_store();
        store.upsert_tenant("chat-1", 100).unwrap();
        store.upsert_account("chat-1", "555-1", "c1").unwrap();
        store.upsert_account("chat-1", "555-2", "c2").unwrap();

        store.increment_used("555-1").unwrap();
        store.increment_used("555-1").unwrap();
        assert_eq!(store.get_account("555-1").unwrap().unwrap().used_count, 2);

        store.reset_used("chat-1").unwrap();
        assert_eq!(store.get_account("555-1").unwrap().unwrap().used_count, 0);
        assert_eq!(store.get_account("555-2").unwrap().unwrap().used_count, 0);
    }

    #[test]
    fn test_job_records() {
        let store = create_test_store();
        store.record_job("chat-1", "recurring_promotion", "job-1").unwrap();
        store.record_job("chat-1", "scheduled_stop", "job-2").unwrap();
        // Same (tenant, kind) replaces the previous record.
        store.record_job("chat-1", "recurring_promotion", "job-3").unwrap();

        let jobs = store.list_jobs().unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.contains(&(
            "chat-1".to_string(),
            "recurring_promotion".to_string(),
            "job-3".to_string()
        )));

        store.clear_job("chat-1", "recurring_promotion").unwrap();
        assert_eq!(store.list_jobs().unwrap().len(), 1);
    }
}
