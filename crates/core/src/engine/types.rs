use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extraction::ExtractionError;
use crate::ledger::LedgerError;
use crate::pipeline::PipelineError;
use crate::pool::PoolError;

/// The kinds of timer jobs the engine schedules. At most one job of
/// each kind exists per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    RecurringPromotion,
    ScheduledStop,
    DelayedRerun,
    AutoStart,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::RecurringPromotion => "recurring_promotion",
            JobKind::ScheduledStop => "scheduled_stop",
            JobKind::DelayedRerun => "delayed_rerun",
            JobKind::AutoStart => "auto_start",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot start promotion cycle: {0}")]
    SchedulingConflict(String),

    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("invalid stop time: {0}")]
    InvalidStopTime(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("account pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Parameters computed when a promotion cycle starts.
#[derive(Debug, Clone, Serialize)]
pub struct CycleInfo {
    pub per_account_cap: u32,
    /// None for natural-flow tenants, which reschedule themselves
    /// after each success instead of ticking on a fixed interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running_tenants: Vec<String>,
    pub job_count: usize,
}
