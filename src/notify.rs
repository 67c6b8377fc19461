// Operator message channel. The Slack incoming-webhook is the one binding;
// with no webhook configured, messages still land in the log.

use std::time::Duration;
use tracing::{info, warn};

pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            webhook_url,
        }
    }

    /// Post a message to the operator channel. Delivery failures are logged,
    /// never propagated; a notice is not worth failing a cycle over.
    pub async fn send(&self, message: &str) {
        info!(notice = message, "operator notice");
        let Some(url) = &self.webhook_url else {
            return;
        };
        let payload = serde_json::json!({ "text": message });
        if let Err(e) = self.client.post(url).json(&payload).send().await {
            warn!(error = %e, "slack webhook delivery failed");
        }
    }

    pub async fn canary(&self, device_uid: &str, message: &str) {
        self.send(&format!("canary: {device_uid} {message}")).await;
    }
}
