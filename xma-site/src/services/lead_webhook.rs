//! Lead webhook forwarding

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::leads::LeadRequest;

const USER_AGENT: &str = concat!("xma-site/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Webhook returned {0}")]
    Status(u16),
}

/// Payload posted to the webhook: the lead plus submission metadata
#[derive(Debug, Serialize)]
pub struct LeadPayload<'a> {
    #[serde(flatten)]
    pub lead: &'a LeadRequest,
    /// RFC 3339 submission time
    pub timestamp: String,
    /// Origin of the page the form was submitted from
    pub origin: &'a str,
}

/// Posts leads to a configured webhook (CRM, automation tool)
pub struct LeadWebhookClient {
    http_client: reqwest::Client,
    webhook_url: String,
}

impl LeadWebhookClient {
    pub fn new(webhook_url: String) -> Result<Self, WebhookError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| WebhookError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            webhook_url,
        })
    }

    pub async fn forward(&self, lead: &LeadRequest, origin: &str) -> Result<(), WebhookError> {
        let payload = LeadPayload {
            lead,
            timestamp: xma_common::time::to_rfc3339_millis(xma_common::time::now()),
            origin,
        };

        let response = self
            .http_client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| WebhookError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::Status(status.as_u16()));
        }

        tracing::info!(source = %lead.source, "Lead forwarded to webhook");
        Ok(())
    }
}
