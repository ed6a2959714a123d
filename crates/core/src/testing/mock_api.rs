//! Mock promotion API for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::pipeline::PipelineStep;
use crate::upstream::{ApiError, PromotionApi};

/// Mock implementation of the PromotionApi trait.
///
/// Deterministic ids make assertions easy: `select_plan` returns
/// `plan-{token}`, `create_order` returns `order-{token}` and
/// `create_checkout` returns `checkout-{order_id}`. Failures are keyed
/// by token and pipeline step, candidate listings by credential.
///
/// # Example
///
/// ```rust,ignore
/// use bumper_core::testing::MockPromotionApi;
///
/// let api = MockPromotionApi::new();
/// api.fail_token_at("tok-1", PipelineStep::Pay).await;
/// api.set_candidates("cookie", &["tok-1", "tok-2"]).await;
///
/// // Run the pipeline, then inspect what was called.
/// let calls = api.recorded_calls().await;
/// ```
#[derive(Debug, Default)]
pub struct MockPromotionApi {
    /// Recorded (operation, token) pairs in call order.
    calls: Arc<RwLock<Vec<(String, String)>>>,
    /// Step at which a given token's pipeline should fail, with detail.
    failures: Arc<RwLock<HashMap<String, (PipelineStep, String)>>>,
    /// Candidate listings keyed by credential.
    candidates: Arc<RwLock<HashMap<String, Vec<String>>>>,
    /// Credentials whose listing call should fail.
    failing_listings: Arc<RwLock<HashSet<String>>>,
    /// Number of list_candidates calls made.
    list_calls: Arc<RwLock<usize>>,
}

impl MockPromotionApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the pipeline for `token` fail at `step`.
    pub async fn fail_token_at(&self, token: &str, step: PipelineStep) {
        self.fail_token_with(token, step, "mock failure").await;
    }

    /// Make the pipeline for `token` fail at `step` with a specific
    /// error detail.
    pub async fn fail_token_with(&self, token: &str, step: PipelineStep, detail: &str) {
        self.failures
            .write()
            .await
            .insert(token.to_string(), (step, detail.to_string()));
    }

    /// Set the candidate listing returned for a credential.
    pub async fn set_candidates(&self, credential: &str, tokens: &[&str]) {
        self.candidates.write().await.insert(
            credential.to_string(),
            tokens.iter().map(|t| t.to_string()).collect(),
        );
    }

    /// Make list_candidates fail for a credential.
    pub async fn fail_listing_for(&self, credential: &str) {
        self.failing_listings
            .write()
            .await
            .insert(credential.to_string());
    }

    /// All recorded (operation, token) pairs in call order.
    pub async fn recorded_calls(&self) -> Vec<(String, String)> {
        self.calls.read().await.clone()
    }

    pub async fn list_call_count(&self) -> usize {
        *self.list_calls.read().await
    }

    pub async fn clear_recorded(&self) {
        self.calls.write().await.clear();
    }

    fn token_of(order_id: &str) -> String {
        order_id
            .strip_prefix("order-")
            .unwrap_or(order_id)
            .to_string()
    }

    async fn record_and_check(
        &self,
        op: &str,
        token: &str,
        step: PipelineStep,
    ) -> Result<(), ApiError> {
        self.calls
            .write()
            .await
            .push((op.to_string(), token.to_string()));
        let failures = self.failures.read().await;
        if let Some((fail_step, detail)) = failures.get(token) {
            if *fail_step == step {
                return Err(ApiError::Api {
                    status: 400,
                    message: detail.clone(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PromotionApi for MockPromotionApi {
    async fn select_plan(&self, _credential: &str, token: &str) -> Result<String, ApiError> {
        self.record_and_check("select_plan", token, PipelineStep::SelectPlan)
            .await?;
        Ok(format!("plan-{token}"))
    }

    async fn create_order(
        &self,
        _credential: &str,
        token: &str,
        _plan_id: &str,
    ) -> Result<String, ApiError> {
        self.record_and_check("create_order", token, PipelineStep::CreateOrder)
            .await?;
        Ok(format!("order-{token}"))
    }

    async fn initiate_flow(&self, _credential: &str, order_id: &str) -> Result<(), ApiError> {
        let token = Self::token_of(order_id);
        self.record_and_check("initiate_flow", &token, PipelineStep::InitiateFlow)
            .await
    }

    async fn create_checkout(&self, _credential: &str, order_id: &str) -> Result<String, ApiError> {
        let token = Self::token_of(order_id);
        self.record_and_check("create_checkout", &token, PipelineStep::CreateCheckout)
            .await?;
        Ok(format!("checkout-{order_id}"))
    }

    async fn pay(
        &self,
        _credential: &str,
        order_id: &str,
        _checkout_token: &str,
        _account_id: &str,
    ) -> Result<(), ApiError> {
        let token = Self::token_of(order_id);
        self.record_and_check("pay", &token, PipelineStep::Pay).await
    }

    async fn promote(&self, _credential: &str, _order_id: &str, token: &str) -> Result<(), ApiError> {
        self.record_and_check("promote", token, PipelineStep::Promote)
            .await
    }

    async fn list_candidates(&self, credential: &str) -> Result<Vec<String>, ApiError> {
        *self.list_calls.write().await += 1;
        if self.failing_listings.read().await.contains(credential) {
            return Err(ApiError::ConnectionFailed("mock listing failure".to_string()));
        }
        Ok(self
            .candidates
            .read()
            .await
            .get(credential)
            .cloned()
            .unwrap_or_default())
    }
}
