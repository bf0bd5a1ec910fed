//! Outbound email gateways.
//!
//! The mail provider is opaque: production posts to an HTTP relay, test mode
//! only logs the message.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::{BaseEmailGateway, EmailMessage};

/// Logs messages instead of sending them
pub struct ConsoleEmailGateway;

#[async_trait]
impl BaseEmailGateway for ConsoleEmailGateway {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        tracing::info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            "[email test mode]\n{}",
            message.body
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Posts messages as JSON to a mail relay.
pub struct HttpEmailGateway {
    client: reqwest::Client,
    relay_url: String,
}

impl HttpEmailGateway {
    pub fn new(relay_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build email relay client")?;
        Ok(Self { client, relay_url })
    }
}

#[async_trait]
impl BaseEmailGateway for HttpEmailGateway {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let response = self
            .client
            .post(&self.relay_url)
            .json(&RelayRequest {
                from: &message.from,
                to: &message.to,
                subject: &message.subject,
                body: &message.body,
            })
            .send()
            .await
            .context("Email relay request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Email relay returned {}: {}", status, body);
        }

        tracing::info!(to = %message.to, subject = %message.subject, "email sent");
        Ok(())
    }
}
