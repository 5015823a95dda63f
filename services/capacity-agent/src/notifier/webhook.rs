use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};

use super::{NotificationError, Notifier};

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
    source: &'a str,
}

/// Posts notifications as JSON to an operator webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub const SOURCE: &'static str = "capseek-agent";

    /// Create a notifier for `url`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Deliver one notification, reporting the failure.
    pub async fn deliver(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
        let payload = WebhookPayload {
            subject,
            body,
            source: Self::SOURCE,
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected { status, body });
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, subject: &str, body: &str) {
        match self.deliver(subject, body).await {
            Ok(()) => info!(subject, "Notification delivered"),
            Err(e) => error!(subject, error = %e, "Failed to deliver notification"),
        }
    }
}
