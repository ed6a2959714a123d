//! HTTP implementation of the promotion API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::metrics;

use super::{ApiError, PromotionApi};

/// Client for the external promotion site.
///
/// The account credential is an opaque session cookie, sent verbatim on
/// every request.
pub struct HttpPromotionApi {
    config: UpstreamConfig,
    client: reqwest::Client,
}

impl HttpPromotionApi {
    pub fn new(config: UpstreamConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::ConnectionFailed(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn map_request_error(e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::ConnectionFailed(e.to_string())
        }
    }

    async fn check_status(
        operation: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            metrics::UPSTREAM_REQUESTS
                .with_label_values(&[operation, "success"])
                .inc();
            return Ok(response);
        }

        metrics::UPSTREAM_REQUESTS
            .with_label_values(&[operation, "error"])
            .inc();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Api {
            status: status.as_u16(),
            message: format!(
                "{}: {}",
                operation,
                body.chars().take(200).collect::<String>()
            ),
        })
    }

    async fn get(&self, operation: &str, credential: &str, path: &str)
        -> Result<reqwest::Response, ApiError> {
        let timer = metrics::UPSTREAM_DURATION
            .with_label_values(&[operation])
            .start_timer();
        let response = self
            .client
            .get(self.url(path))
            .header(reqwest::header::COOKIE, credential)
            .send()
            .await
            .map_err(Self::map_request_error);
        timer.observe_duration();
        match response {
            Ok(r) => Self::check_status(operation, r).await,
            Err(e) => {
                metrics::UPSTREAM_REQUESTS
                    .with_label_values(&[operation, "error"])
                    .inc();
                Err(e)
            }
        }
    }

    async fn post(
        &self,
        operation: &str,
        credential: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, ApiError> {
        let timer = metrics::UPSTREAM_DURATION
            .with_label_values(&[operation])
            .start_timer();
        let response = self
            .client
            .post(self.url(path))
            .header(reqwest::header::COOKIE, credential)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_request_error);
        timer.observe_duration();
        match response {
            Ok(r) => Self::check_status(operation, r).await,
            Err(e) => {
                metrics::UPSTREAM_REQUESTS
                    .with_label_values(&[operation, "error"])
                    .inc();
                Err(e)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CostEntry {
    id: String,
    #[serde(default)]
    available: bool,
}

#[derive(Debug, Deserialize)]
struct CostsResponse {
    costs: Vec<CostEntry>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutResponse {
    checkout_token: String,
}

#[derive(Debug, Deserialize)]
struct ListingWidget {
    #[serde(default)]
    widget_type: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
struct ListingsPage {
    #[serde(default)]
    widgets: Vec<ListingWidget>,
    #[serde(default)]
    last_item_identifier: Option<String>,
}

#[async_trait]
impl PromotionApi for HttpPromotionApi {
    async fn select_plan(&self, credential: &str, token: &str) -> Result<String, ApiError> {
        let path = format!("payment/costs/{}", urlencoding::encode(token));
        let response = self.get("select_plan", credential, &path).await?;
        let costs: CostsResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        // Prefer the third listed plan when the site marks it available,
        // otherwise fall back to the first.
        let chosen = match costs.costs.get(2) {
            Some(entry) if entry.available => Some(&entry.id),
            _ => costs.costs.first().map(|entry| &entry.id),
        };

        chosen
            .cloned()
            .ok_or_else(|| ApiError::Parse("no promotion plans offered".to_string()))
    }

    async fn create_order(
        &self,
        credential: &str,
        token: &str,
        plan_id: &str,
    ) -> Result<String, ApiError> {
        let path = format!("payment/start/{}", urlencoding::encode(token));
        let response = self
            .post(
                "create_order",
                credential,
                &path,
                json!({ "cost_ids": [plan_id] }),
            )
            .await?;
        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(order.order_id)
    }

    async fn initiate_flow(&self, credential: &str, order_id: &str) -> Result<(), ApiError> {
        let path = format!("payment/flow/{}", urlencoding::encode(order_id));
        self.get("initiate_flow", credential, &path).await?;
        Ok(())
    }

    async fn create_checkout(&self, credential: &str, order_id: &str) -> Result<String, ApiError> {
        let path = format!("checkout/initiate/{}", urlencoding::encode(order_id));
        let response = self.get("create_checkout", credential, &path).await?;
        let checkout: CheckoutResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(checkout.checkout_token)
    }

    async fn pay(
        &self,
        credential: &str,
        order_id: &str,
        checkout_token: &str,
        account_id: &str,
    ) -> Result<(), ApiError> {
        self.post(
            "pay",
            credential,
            "checkout/pay",
            json!({
                "order_id": order_id,
                "checkout_token": checkout_token,
                "account": account_id,
            }),
        )
        .await?;
        Ok(())
    }

    async fn promote(&self, credential: &str, order_id: &str, token: &str) -> Result<(), ApiError> {
        let path = format!(
            "promote?payment_order_id={}&token={}",
            urlencoding::encode(order_id),
            urlencoding::encode(token)
        );
        self.get("promote", credential, &path).await?;
        Ok(())
    }

    async fn list_candidates(&self, credential: &str) -> Result<Vec<String>, ApiError> {
        let mut tokens = Vec::new();
        let mut cursor: Option<String> = None;

        // Paginated; the cursor is opaque and absent on the last page.
        for _ in 0..self.config.max_pages {
            let path = match &cursor {
                Some(c) => format!("listings?last_item={}", urlencoding::encode(c)),
                None => "listings".to_string(),
            };
            let response = self.get("list_candidates", credential, &path).await?;
            let page: ListingsPage = response
                .json()
                .await
                .map_err(|e| ApiError::Parse(e.to_string()))?;

            for widget in &page.widgets {
                if widget.widget_type == "POST_ROW"
                    && widget.state == "published"
                    && !widget.token.is_empty()
                {
                    tokens.push(widget.token.clone());
                }
            }

            match page.last_item_identifier {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!("listed {} candidate tokens", tokens.len());
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> UpstreamConfig {
        UpstreamConfig {
            base_url: "http://localhost:9999/api".to_string(),
            timeout_secs: 5,
            max_pages: 3,
        }
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let api = HttpPromotionApi::new(UpstreamConfig {
            base_url: "http://host/api/".to_string(),
            ..test_config()
        })
        .unwrap();
        assert_eq!(api.url("listings"), "http://host/api/listings");
    }

    #[test]
    fn test_plan_choice_prefers_third_available() {
        let costs = CostsResponse {
            costs: vec![
                CostEntry { id: "basic".into(), available: true },
                CostEntry { id: "plus".into(), available: true },
                CostEntry { id: "premium".into(), available: true },
            ],
        };
        let chosen = match costs.costs.get(2) {
            Some(entry) if entry.available => Some(&entry.id),
            _ => costs.costs.first().map(|entry| &entry.id),
        };
        assert_eq!(chosen.unwrap(), "premium");
    }

    #[test]
    fn test_listings_page_parses_with_missing_fields() {
        let page: ListingsPage = serde_json::from_str(
            r#"{"widgets": [{"widget_type": "POST_ROW", "state": "published", "token": "abc"}, {"widget_type": "BANNER"}]}"#,
        )
        .unwrap();
        assert_eq!(page.widgets.len(), 2);
        assert_eq!(page.widgets[0].token, "abc");
        assert!(page.last_item_identifier.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_host_maps_to_connection_error() {
        let api = HttpPromotionApi::new(test_config()).unwrap();
        let result = api.list_candidates("cookie").await;
        assert!(matches!(
            result,
            Err(ApiError::ConnectionFailed(_)) | Err(ApiError::Timeout)
        ));
    }
}
