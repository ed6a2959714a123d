//! Mock notifier for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::notify::Notifier;

/// Records every notification for test assertions.
#[derive(Debug, Default)]
pub struct MockNotifier {
    /// Recorded (tenant_id, text) pairs in send order.
    messages: Arc<RwLock<Vec<(String, String)>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<(String, String)> {
        self.messages.read().await.clone()
    }

    /// Whether any message for the tenant contains `fragment`.
    pub async fn contains(&self, tenant_id: &str, fragment: &str) -> bool {
        self.messages
            .read()
            .await
            .iter()
            .any(|(t, text)| t == tenant_id && text.contains(fragment))
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, tenant_id: &str, text: &str) {
        self.messages
            .write()
            .await
            .push((tenant_id.to_string(), text.to_string()));
    }
}
