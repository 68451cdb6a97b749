//! Email delivery.
//!
//! Everything upstream renders an [`EmailMessage`]; this crate owns getting
//! it to an inbox. Delivery goes through the Resend HTTP API in production.
//! `MemoryMailer` records messages instead of sending, for use in tests of
//! the engine and the binaries.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use courier_common::types::EmailMessage;

/// Delivery failures. Send failures are never swallowed — they propagate so
/// the enclosing job is marked failed and subject to the queue's retry
/// accounting.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// A sink for rendered emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Mailer backed by the Resend HTTP API.
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
    base_url: String,
}

const RESEND_BASE_URL: &str = "https://api.resend.com";

impl ResendMailer {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            from,
            base_url: RESEND_BASE_URL.to_string(),
        }
    }

    /// Point at a different API host (local stub server in tests).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let body = json!({
            "from": self.from,
            "to": message.to,
            "subject": message.subject,
            "text": message.text,
            "html": message.html,
        });

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected(format!("{status}: {detail}")));
        }

        tracing::debug!(
            to = ?message.to,
            subject = %message.subject,
            "Email delivered"
        );
        Ok(())
    }
}

/// Mailer that records messages in memory instead of delivering them.
pub struct MemoryMailer {
    sent: std::sync::Mutex<Vec<EmailMessage>>,
    fail: bool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A mailer whose every send fails, for exercising error paths.
    pub fn failing() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Default for MemoryMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Rejected("memory mailer set to fail".into()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}
