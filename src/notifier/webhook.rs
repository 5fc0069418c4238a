use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::notifier::{Notifier, NotifyError, TemplateKind};

/// Posts each notification as JSON to a mail/notification gateway.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        address: &str,
        kind: TemplateKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        let body = json!({
            "to": address,
            "template": kind,
            "payload": payload,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout
                } else {
                    NotifyError::Delivery(e.to_string())
                }
            })?;

        response
            .error_for_status()
            .map(|_| ())
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}
