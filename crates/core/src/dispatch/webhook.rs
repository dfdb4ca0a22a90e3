use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Client;

use super::{AlertChannel, ChannelError};
use crate::config::WebhookChannelConfig;
use crate::models::Alert;

/// POSTs each alert as JSON to a configured endpoint.
pub struct WebhookChannel {
    client: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(config: &WebhookChannelConfig) -> Result<Self, ChannelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        let raised_at_unix = alert
            .raised_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let payload = serde_json::json!({
            "kind": alert.kind.label(),
            "severity": alert.severity.as_str(),
            "message": alert.message,
            "value": alert.value,
            "threshold": alert.threshold,
            "suppressed_since_last": alert.suppressed_since_last,
            "raised_at_unix": raised_at_unix,
        });

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
