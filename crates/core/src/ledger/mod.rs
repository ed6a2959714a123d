//! Token ledger: per-tenant, per-account candidate tracking.
//!
//! Every promotable listing is represented by a [`Token`] that moves
//! exactly once from `Pending` to `Success` or `Failed`. Pending tokens
//! are always handed out in insertion order; the selection policies rely
//! on that.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTokenLedger;
pub use store::TokenLedger;
pub use types::{LedgerError, LedgerStats, Token, TokenStatus};
