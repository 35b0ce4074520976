//! Outbound notifications (one-time codes, access codes).
//!
//! The engines never send anything themselves. Callers hand a [`Message`]
//! to a [`Notifier`] after the state change is committed, and a failed
//! send never rolls that change back.

#[cfg(feature = "webhook-notify")]
pub mod webhook;

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};

#[cfg(feature = "webhook-notify")]
pub use webhook::WebhookNotifier;

/// Errors from a notification channel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification transport error: {0}")]
    Transport(String),

    #[error("Notification gateway rejected message (status {status}): {body}")]
    Rejected { status: u16, body: String },
}

/// A message addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

impl Message {
    pub fn otp_code(purpose_label: &str, code: &str, expiry_secs: i64) -> Self {
        Self {
            subject: format!("MedInsight verification code ({purpose_label})"),
            body: format!(
                "Your verification code is {code}. It expires in {} minutes. \
                 If you did not request it, ignore this message.",
                expiry_secs / 60
            ),
        }
    }

    pub fn access_code(
        doctor_name: &str,
        patient_name: &str,
        code: &str,
        expires_at: i64,
    ) -> Self {
        Self {
            subject: "MedInsight record access approved".to_string(),
            body: format!(
                "Dear {doctor_name}, your request to access the record of {patient_name} \
                 was approved. Access code: {code}. Valid until unix time {expires_at}."
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, message: &Message) -> Result<(), NotifyError>;
}

/// Development sink: writes messages to the log instead of delivering them.
/// Bodies (which carry codes) only appear at `debug` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, message: &Message) -> Result<(), NotifyError> {
        info!(to, subject = %message.subject, "Notification queued to log sink");
        debug!(to, body = %message.body, "Notification body");
        Ok(())
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Message)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, oldest first.
    pub fn sent(&self) -> Vec<(String, Message)> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn last_to(&self, to: &str) -> Option<Message> {
        self.sent()
            .into_iter()
            .rev()
            .find(|(addr, _)| addr == to)
            .map(|(_, m)| m)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, message: &Message) -> Result<(), NotifyError> {
        if let Ok(mut guard) = self.sent.lock() {
            guard.push((to.to_string(), message.clone()));
        }
        Ok(())
    }
}

/// Always fails; exercises the non-fatal delivery paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _to: &str, _message: &Message) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("mail gateway unreachable".to_string()))
    }
}
