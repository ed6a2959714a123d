//! Upstream promotion API contract.

use async_trait::async_trait;

/// Errors from the external promotion site.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("invalid response: {0}")]
    Parse(String),
}

/// The external site's promotion contract: six transaction calls plus
/// candidate listing. Every call is independently failable and any failure
/// is terminal for the token being processed.
#[async_trait]
pub trait PromotionApi: Send + Sync {
    /// Pick a promotion plan for the listing. Returns the plan id.
    async fn select_plan(&self, credential: &str, token: &str) -> Result<String, ApiError>;

    /// Open a payment order for the chosen plan. Returns the order id.
    async fn create_order(
        &self,
        credential: &str,
        token: &str,
        plan_id: &str,
    ) -> Result<String, ApiError>;

    /// Kick off the payment flow for the order. Response body is ignored.
    async fn initiate_flow(&self, credential: &str, order_id: &str) -> Result<(), ApiError>;

    /// Create a checkout session. Returns the checkout token.
    async fn create_checkout(&self, credential: &str, order_id: &str) -> Result<String, ApiError>;

    /// Settle the checkout from the account's wallet.
    async fn pay(
        &self,
        credential: &str,
        order_id: &str,
        checkout_token: &str,
        account_id: &str,
    ) -> Result<(), ApiError>;

    /// Apply the paid promotion to the listing.
    async fn promote(&self, credential: &str, order_id: &str, token: &str) -> Result<(), ApiError>;

    /// List promotable listing identifiers visible to the account.
    async fn list_candidates(&self, credential: &str) -> Result<Vec<String>, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        assert_eq!(ApiError::Timeout.to_string(), "request timed out");
        let err = ApiError::Api {
            status: 403,
            message: "select_plan: forbidden".to_string(),
        };
        assert_eq!(err.to_string(), "api error (status 403): select_plan: forbidden");
    }
}
