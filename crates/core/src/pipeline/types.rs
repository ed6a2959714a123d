//! Promotion pipeline types.

use serde::{Deserialize, Serialize};

/// Identifies which of the six external calls failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    SelectPlan,
    CreateOrder,
    InitiateFlow,
    CreateCheckout,
    Pay,
    Promote,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::SelectPlan => "select_plan",
            PipelineStep::CreateOrder => "create_order",
            PipelineStep::InitiateFlow => "initiate_flow",
            PipelineStep::CreateCheckout => "create_checkout",
            PipelineStep::Pay => "pay",
            PipelineStep::Promote => "promote",
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one promotion attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    /// The token was promoted; ledger and usage counter already updated.
    Success { token: String, account_id: String },
    /// One of the steps failed; the token is marked failed, no retry.
    Failed {
        token: String,
        step: PipelineStep,
        detail: String,
    },
    /// There was nothing to attempt this run.
    NoCandidate { message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Errors from pipeline bookkeeping. Upstream call failures are not errors
/// at this level; they become [`Outcome::Failed`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),
    #[error("pool error: {0}")]
    Pool(#[from] crate::pool::PoolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_display_names() {
        assert_eq!(PipelineStep::SelectPlan.to_string(), "select_plan");
        assert_eq!(PipelineStep::Pay.to_string(), "pay");
    }

    #[test]
    fn test_outcome_serde_is_tagged() {
        let outcome = Outcome::Failed {
            token: "tok-1".to_string(),
            step: PipelineStep::Pay,
            detail: "wallet empty".to_string(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"type\":\"failed\""));
        assert!(json.contains("\"step\":\"pay\""));

        let back: Outcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_is_success() {
        let outcome = Outcome::Success {
            token: "tok-1".to_string(),
            account_id: "a1".to_string(),
        };
        assert!(outcome.is_success());
        assert!(!Outcome::NoCandidate {
            message: "empty".to_string()
        }
        .is_success());
    }
}
