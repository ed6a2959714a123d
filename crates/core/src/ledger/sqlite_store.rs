//! SQLite-backed token ledger implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{LedgerError, LedgerStats, Token, TokenLedger, TokenStatus};

/// SQLite-backed token ledger.
///
/// Insertion order is preserved through the rowid, which is what
/// `list_pending` orders by.
pub struct SqliteTokenLedger {
    conn: Mutex<Connection>,
}

impl SqliteTokenLedger {
    /// Create a new ledger, creating the database file and table if needed.
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path).map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory ledger (useful for testing).
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn =
            Connection::open_in_memory().map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LedgerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                value TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(tenant_id, account_id, value)
            );

            CREATE INDEX IF NOT EXISTS idx_tokens_tenant ON tokens(tenant_id);
            CREATE INDEX IF NOT EXISTS idx_tokens_tenant_status ON tokens(tenant_id, status);
            "#,
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_token(row: &rusqlite::Row) -> rusqlite::Result<Token> {
        let tenant_id: String = row.get(0)?;
        let account_id: String = row.get(1)?;
        let value: String = row.get(2)?;
        let status_str: String = row.get(3)?;
        let created_at_str: String = row.get(4)?;
        let updated_at_str: String = row.get(5)?;

        // Timestamps are written by us in RFC 3339; fall back to now on
        // malformed data rather than failing the whole query.
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let status = TokenStatus::parse(&status_str).unwrap_or(TokenStatus::Pending);

        Ok(Token {
            tenant_id,
            account_id,
            value,
            status,
            created_at,
            updated_at,
        })
    }
}

const TOKEN_COLUMNS: &str = "tenant_id, account_id, value, status, created_at, updated_at";

impl TokenLedger for SqliteTokenLedger {
    fn add_candidates(
        &self,
        tenant_id: &str,
        account_id: &str,
        values: &[String],
    ) -> Result<usize, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let now = Utc::now().to_rfc3339();
        let mut inserted = 0;
        for value in values {
            // The UNIQUE constraint makes this a no-op for values already
            // present in any bucket.
            let changed = conn
                .execute(
                    "INSERT OR IGNORE INTO tokens (tenant_id, account_id, value, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
                    params![
                        tenant_id,
                        account_id,
                        value,
                        TokenStatus::Pending.as_str(),
                        now,
                        now,
                    ],
                )
                .map_err(|e| LedgerError::Database(e.to_string()))?;
            inserted += changed;
        }

        Ok(inserted)
    }

    fn transition(
        &self,
        tenant_id: &str,
        account_id: &str,
        value: &str,
        new_status: TokenStatus,
    ) -> Result<bool, LedgerError> {
        let conn = self.conn.lock().unwrap();

        // Only pending tokens move; an unknown or already-terminal value
        // leaves the ledger untouched and reports false.
        let changed = conn
            .execute(
                "UPDATE tokens SET status = ?, updated_at = ? WHERE tenant_id = ? AND account_id = ? AND value = ? AND status = ?",
                params![
                    new_status.as_str(),
                    Utc::now().to_rfc3339(),
                    tenant_id,
                    account_id,
                    value,
                    TokenStatus::Pending.as_str(),
                ],
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(changed > 0)
    }

    fn list_pending(
        &self,
        tenant_id: &str,
        account_id: Option<&str>,
    ) -> Result<Vec<Token>, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let mut tokens = Vec::new();
        match account_id {
            Some(account_id) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {TOKEN_COLUMNS} FROM tokens WHERE tenant_id = ? AND account_id = ? AND status = ? ORDER BY id ASC"
                    ))
                    .map_err(|e| LedgerError::Database(e.to_string()))?;
                let rows = stmt
                    .query_map(
                        params![tenant_id, account_id, TokenStatus::Pending.as_str()],
                        Self::row_to_token,
                    )
                    .map_err(|e| LedgerError::Database(e.to_string()))?;
                for row in rows {
                    tokens.push(row.map_err(|e| LedgerError::Database(e.to_string()))?);
                }
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {TOKEN_COLUMNS} FROM tokens WHERE tenant_id = ? AND status = ? ORDER BY id ASC"
                    ))
                    .map_err(|e| LedgerError::Database(e.to_string()))?;
                let rows = stmt
                    .query_map(
                        params![tenant_id, TokenStatus::Pending.as_str()],
                        Self::row_to_token,
                    )
                    .map_err(|e| LedgerError::Database(e.to_string()))?;
                for row in rows {
                    tokens.push(row.map_err(|e| LedgerError::Database(e.to_string()))?);
                }
            }
        }

        Ok(tokens)
    }

    fn has_pending(&self, tenant_id: &str) -> Result<bool, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tokens WHERE tenant_id = ? AND status = ?",
                params![tenant_id, TokenStatus::Pending.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(count > 0)
    }

    fn stats(
        &self,
        tenant_id: &str,
        account_id: Option<&str>,
    ) -> Result<LedgerStats, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let mut stats = LedgerStats::default();
        let collect = |row: &rusqlite::Row| -> rusqlite::Result<(String, u64)> {
            Ok((row.get(0)?, row.get(1)?))
        };

        let rows: Vec<(String, u64)> = match account_id {
            Some(account_id) => {
                let mut stmt = conn
                    .prepare("SELECT status, COUNT(*) FROM tokens WHERE tenant_id = ? AND account_id = ? GROUP BY status")
                    .map_err(|e| LedgerError::Database(e.to_string()))?;
                let mapped = stmt
                    .query_map(params![tenant_id, account_id], collect)
                    .map_err(|e| LedgerError::Database(e.to_string()))?;
                mapped
                    .collect::<rusqlite::Result<_>>()
                    .map_err(|e| LedgerError::Database(e.to_string()))?
            }
            None => {
                let mut stmt = conn
                    .prepare("SELECT status, COUNT(*) FROM tokens WHERE tenant_id = ? GROUP BY status")
                    .map_err(|e| LedgerError::Database(e.to_string()))?;
                let mapped = stmt
                    .query_map(params![tenant_id], collect)
                    .map_err(|e| LedgerError::Database(e.to_string()))?;
                mapped
                    .collect::<rusqlite::Result<_>>()
                    .map_err(|e| LedgerError::Database(e.to_string()))?
            }
        };

        for (status, count) in rows {
            match TokenStatus::parse(&status) {
                Some(TokenStatus::Pending) => stats.pending = count,
                Some(TokenStatus::Success) => stats.success = count,
                Some(TokenStatus::Failed) => stats.failed = count,
                None => {}
            }
            stats.total += count;
        }

        Ok(stats)
    }

    fn clear(&self, tenant_id: &str) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();

        conn.execute("DELETE FROM tokens WHERE tenant_id = ?", params![tenant_id])
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_ledger() -> SqliteTokenLedger {
        SqliteTokenLedger::in_memory().unwrap()
    }

    fn values(vs: &[&str]) -> Vec<String> {
        vs.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_add_candidates_inserts_pending() {
        let ledger = create_test_ledger();

        let inserted = ledger
            .add_candidates("t1", "a1", &values(&["tok-1", "tok-2"]))
            .unwrap();
        assert_eq!(inserted, 2);

        let pending = ledger.list_pending("t1", None).unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|t| t.status == TokenStatus::Pending));
    }

    #[test]
    fn test_add_candidates_is_idempotent() {
        let ledger = create_test_ledger();

        assert_eq!(
            ledger.add_candidates("t1", "a1", &values(&["tok-1"])).unwrap(),
            1
        );
        assert_eq!(
            ledger.add_candidates("t1", "a1", &values(&["tok-1"])).unwrap(),
            0
        );
        assert_eq!(ledger.stats("t1", None).unwrap().pending, 1);
    }

    #[test]
    fn test_add_candidates_dedups_against_terminal_buckets() {
        let ledger = create_test_ledger();

        ledger.add_candidates("t1", "a1", &values(&["tok-1"])).unwrap();
        ledger
            .transition("t1", "a1", "tok-1", TokenStatus::Success)
            .unwrap();

        // Re-extraction must not resurrect a finished token.
        assert_eq!(
            ledger.add_candidates("t1", "a1", &values(&["tok-1"])).unwrap(),
            0
        );
        assert_eq!(ledger.stats("t1", None).unwrap().pending, 0);
    }

    #[test]
    fn test_transition_pending_to_terminal() {
        let ledger = create_test_ledger();
        ledger.add_candidates("t1", "a1", &values(&["tok-1"])).unwrap();

        assert!(ledger
            .transition("t1", "a1", "tok-1", TokenStatus::Failed)
            .unwrap());
        let stats = ledger.stats("t1", None).unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn test_transition_unknown_value_returns_false() {
        let ledger = create_test_ledger();
        assert!(!ledger
            .transition("t1", "a1", "nope", TokenStatus::Success)
            .unwrap());
    }

    #[test]
    fn test_terminal_status_is_never_reverted() {
        let ledger = create_test_ledger();
        ledger.add_candidates("t1", "a1", &values(&["tok-1"])).unwrap();
        ledger
            .transition("t1", "a1", "tok-1", TokenStatus::Success)
            .unwrap();

        assert!(!ledger
            .transition("t1", "a1", "tok-1", TokenStatus::Failed)
            .unwrap());
        assert_eq!(ledger.stats("t1", None).unwrap().success, 1);
    }

    #[test]
    fn test_list_pending_preserves_insertion_order() {
        let ledger = create_test_ledger();
        ledger
            .add_candidates("t1", "a1", &values(&["first", "second"]))
            .unwrap();
        ledger.add_candidates("t1", "a2", &values(&["third"])).unwrap();
        ledger.add_candidates("t1", "a1", &values(&["fourth"])).unwrap();

        let all: Vec<String> = ledger
            .list_pending("t1", None)
            .unwrap()
            .into_iter()
            .map(|t| t.value)
            .collect();
        assert_eq!(all, vec!["first", "second", "third", "fourth"]);

        let a1: Vec<String> = ledger
            .list_pending("t1", Some("a1"))
            .unwrap()
            .into_iter()
            .map(|t| t.value)
            .collect();
        assert_eq!(a1, vec!["first", "second", "fourth"]);
    }

    #[test]
    fn test_has_pending() {
        let ledger = create_test_ledger();
        assert!(!ledger.has_pending("t1").unwrap());

        ledger.add_candidates("t1", "a1", &values(&["tok-1"])).unwrap();
        assert!(ledger.has_pending("t1").unwrap());

        ledger
            .transition("t1", "a1", "tok-1", TokenStatus::Success)
            .unwrap();
        assert!(!ledger.has_pending("t1").unwrap());
    }

    #[test]
    fn test_stats_counts_buckets() {
        let ledger = create_test_ledger();
        ledger
            .add_candidates("t1", "a1", &values(&["t-1", "t-2", "t-3"]))
            .unwrap();
        ledger.transition("t1", "a1", "t-1", TokenStatus::Success).unwrap();
        ledger.transition("t1", "a1", "t-2", TokenStatus::Failed).unwrap();

        let stats = ledger.stats("t1", None).unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.success, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total, 3);
    }

    #[test]
    fn test_tenants_are_isolated() {
        let ledger = create_test_ledger();
        ledger.add_candidates("t1", "a1", &values(&["tok-1"])).unwrap();
        ledger.add_candidates("t2", "b1", &values(&["tok-1"])).unwrap();

        ledger.clear("t1").unwrap();
        assert_eq!(ledger.stats("t1", None).unwrap().total, 0);
        assert_eq!(ledger.stats("t2", None).unwrap().total, 1);
    }

    #[test]
    fn test_file_based_ledger() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("bumper.db");

        let ledger = SqliteTokenLedger::new(&db_path).unwrap();
        ledger.add_candidates("t1", "a1", &values(&["tok-1"])).unwrap();

        assert!(db_path.exists());
        assert!(ledger.has_pending("t1").unwrap());
    }
}
