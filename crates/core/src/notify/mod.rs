//! Outbound notifications to the tenant's chat.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::NotifierConfig;

/// Fire-and-forget outbound messages. Delivery failures are logged and
/// never affect orchestration.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, tenant_id: &str, text: &str);
}

/// Posts notifications to a configured webhook.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(config: &NotifierConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url: config.webhook_url.clone(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, tenant_id: &str, text: &str) {
        let body = json!({ "chat_id": tenant_id, "text": text });
        match self.client.post(&self.url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("notified tenant {}", tenant_id);
            }
            Ok(response) => {
                warn!(
                    "notification for tenant {} rejected with status {}",
                    tenant_id,
                    response.status()
                );
            }
            Err(e) => {
                warn!("notification for tenant {} failed: {}", tenant_id, e);
            }
        }
    }
}

/// Logs notifications instead of delivering them. Used when no webhook is
/// configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, tenant_id: &str, text: &str) {
        tracing::info!("notification for tenant {}: {}", tenant_id, text);
    }
}
