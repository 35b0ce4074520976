//! Mail gateway client.
//!
//! POSTs each message as JSON to a configured HTTP endpoint that performs
//! the actual email delivery.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::{Message, Notifier, NotifyError};

/// JSON payload sent to the gateway.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub to: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
}

#[derive(Debug)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        // No-op if a provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn payload<'a>(to: &'a str, message: &'a Message) -> WebhookPayload<'a> {
        WebhookPayload {
            to,
            subject: &message.subject,
            body: &message.body,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, to: &str, message: &Message) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.url)
            .json(&Self::payload(to, message))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(to, "Notification delivered to gateway");
            Ok(())
        } else {
            let status_code = status.as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            warn!(status = status_code, to, "Mail gateway returned error");
            Err(NotifyError::Rejected {
                status: status_code,
                body,
            })
        }
    }
}
