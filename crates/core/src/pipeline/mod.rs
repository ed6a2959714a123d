//! Promotion pipeline: drives the multi-step external transaction for one
//! candidate token.

mod types;

pub use types::{Outcome, PipelineError, PipelineStep};

use std::sync::Arc;

use tracing::{info, warn};

use crate::ledger::{TokenLedger, TokenStatus};
use crate::metrics;
use crate::pool::{Account, AccountPool};
use crate::upstream::{ApiError, PromotionApi};

/// Failure details are truncated to keep notifications readable.
const DETAIL_MAX_CHARS: usize = 150;

/// Runs the six-step promotion transaction for one token and applies the
/// resulting ledger and usage-counter updates.
#[derive(Clone)]
pub struct PromotionPipeline {
    api: Arc<dyn PromotionApi>,
    ledger: Arc<dyn TokenLedger>,
    pool: AccountPool,
}

impl PromotionPipeline {
    pub fn new(api: Arc<dyn PromotionApi>, ledger: Arc<dyn TokenLedger>, pool: AccountPool) -> Self {
        Self { api, ledger, pool }
    }

    /// Attempt to promote `token` through `account`. Any step failure
    /// aborts the remaining steps and marks the token failed; there is no
    /// retry of the same token within a run. On success, both the ledger
    /// transition and the account usage counter are applied before
    /// returning.
    pub async fn promote(
        &self,
        tenant_id: &str,
        account: &Account,
        token: &str,
    ) -> Result<Outcome, PipelineError> {
        match self.run_steps(account, token).await {
            Ok(()) => {
                self.ledger
                    .transition(tenant_id, &account.id, token, TokenStatus::Success)?;
                self.pool.increment_used(&account.id)?;
                metrics::PROMOTION_ATTEMPTS
                    .with_label_values(&["success"])
                    .inc();
                info!(
                    "promoted token {} through account {} for tenant {}",
                    token, account.id, tenant_id
                );
                Ok(Outcome::Success {
                    token: token.to_string(),
                    account_id: account.id.clone(),
                })
            }
            Err((step, err)) => {
                self.ledger
                    .transition(tenant_id, &account.id, token, TokenStatus::Failed)?;
                metrics::PROMOTION_ATTEMPTS
                    .with_label_values(&["failed"])
                    .inc();
                metrics::STEP_FAILURES
                    .with_label_values(&[step.as_str()])
                    .inc();
                let detail: String = err.to_string().chars().take(DETAIL_MAX_CHARS).collect();
                warn!(
                    "promotion of token {} failed at {} for tenant {}: {}",
                    token, step, tenant_id, detail
                );
                Ok(Outcome::Failed {
                    token: token.to_string(),
                    step,
                    detail,
                })
            }
        }
    }

    async fn run_steps(
        &self,
        account: &Account,
        token: &str,
    ) -> Result<(), (PipelineStep, ApiError)> {
        let credential = account.credential.as_str();

        let plan_id = self
            .api
            .select_plan(credential, token)
            .await
            .map_err(|e| (PipelineStep::SelectPlan, e))?;

        let order_id = self
            .api
            .create_order(credential, token, &plan_id)
            .await
            .map_err(|e| (PipelineStep::CreateOrder, e))?;

        self.api
            .initiate_flow(credential, &order_id)
            .await
            .map_err(|e| (PipelineStep::InitiateFlow, e))?;

        let checkout_token = self
            .api
            .create_checkout(credential, &order_id)
            .await
            .map_err(|e| (PipelineStep::CreateCheckout, e))?;

        self.api
            .pay(credential, &order_id, &checkout_token, &account.id)
            .await
            .map_err(|e| (PipelineStep::Pay, e))?;

        self.api
            .promote(credential, &order_id, token)
            .await
            .map_err(|e| (PipelineStep::Promote, e))?;

        Ok(())
    }
}
