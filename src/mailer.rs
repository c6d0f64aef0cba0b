use crate::types::{PulseError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Outbound email delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()>;
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
}

/// Delivery through the Resend REST API.
pub struct ResendMailer {
    client: Client,
    api_key: String,
    from: String,
}

impl ResendMailer {
    const ENDPOINT: &'static str = "https://api.resend.com/emails";

    pub fn new(api_key: String, from: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, api_key, from }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let request = SendRequest {
            from: &self.from,
            to: vec![to],
            subject,
            html,
        };
        let response = self
            .client
            .post(Self::ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(%status, to, "email delivery rejected");
            return Err(PulseError::Mail {
                status: status.as_u16(),
                message,
            });
        }
        info!(to, subject, "email delivered");
        Ok(())
    }
}

/// Stand-in used when no delivery credential is configured. Every send
/// fails, which surfaces as a per-target failure rather than a crash.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, to: &str, _subject: &str, _html: &str) -> Result<()> {
        warn!(to, "email delivery not configured");
        Err(PulseError::MissingCredential("RESEND_API_KEY".to_string()))
    }
}

/// Captured message for assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// In-memory mailer. Optionally rejects every send with a canned error.
#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<SentEmail>>,
    reject_with: Option<(u16, String)>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(status: u16, message: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject_with: Some((status, message.to_string())),
        }
    }

    pub async fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        if let Some((status, message)) = &self.reject_with {
            return Err(PulseError::Mail {
                status: *status,
                message: message.clone(),
            });
        }
        self.sent.lock().await.push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        });
        Ok(())
    }
}
