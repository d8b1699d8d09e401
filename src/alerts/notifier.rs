//! Alert delivery.
//!
//! Every alert is logged. When a webhook URL is configured the alert text is
//! also posted as `{"text": ...}`, the payload Slack incoming webhooks accept.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::alerts::monitor::Alert;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(6);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid webhook URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

#[derive(Debug, Clone)]
pub struct AlertNotifier {
    client: reqwest::Client,
    webhook: Option<Url>,
}

impl AlertNotifier {
    pub fn new(webhook_url: Option<&str>) -> Result<Self, NotifyError> {
        let webhook = webhook_url.map(Url::parse).transpose()?;
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self { client, webhook })
    }

    pub fn has_webhook(&self) -> bool {
        self.webhook.is_some()
    }

    /// Log the alert and post it to the webhook, if any.
    pub async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.notify_at(alert, Utc::now()).await
    }

    pub async fn notify_at(&self, alert: &Alert, at: DateTime<Utc>) -> Result<(), NotifyError> {
        let text = alert.message(at);
        tracing::warn!(kind = %alert.kind(), alert = %text, "Alert raised");

        let Some(url) = &self.webhook else {
            return Ok(());
        };
        self.client
            .post(url.clone())
            .json(&WebhookPayload { text: &text })
            .send()
            .await?
            .error_for_status()?;
        tracing::info!(kind = %alert.kind(), "Alert delivered to webhook");
        Ok(())
    }
}
