//! Alert sinks: where descriptive failure messages are delivered.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Subject line attached to every alert.
pub const ALERT_SUBJECT: &str = "A probewatch alert";

/// Alert delivery errors.
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("alert transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("alert rejected with status {0}")]
    Rejected(u16),
}

/// Accepts one descriptive message per failed probe.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, message: &str) -> Result<(), AlertError>;
}

/// Sink that only writes the alert to the log.
#[derive(Debug, Clone, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send_alert(&self, message: &str) -> Result<(), AlertError> {
        tracing::warn!(subject = ALERT_SUBJECT, "{}", message);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    recipients: &'a [String],
    text: &'a str,
}

/// Sink that POSTs each alert as JSON to a webhook.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
    recipients: Vec<String>,
}

impl WebhookAlertSink {
    pub fn new(url: &str, recipients: Vec<String>, timeout: Duration) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, url, recipients))
    }

    pub fn with_client(client: reqwest::Client, url: &str, recipients: Vec<String>) -> Self {
        Self {
            client,
            url: url.to_string(),
            recipients,
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send_alert(&self, message: &str) -> Result<(), AlertError> {
        let payload = WebhookPayload {
            subject: ALERT_SUBJECT,
            recipients: &self.recipients,
            text: message,
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(AlertError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}
