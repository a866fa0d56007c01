//! Stripe Checkout client
//!
//! One form-encoded `POST /v1/checkout/sessions` per checkout. No retries,
//! no webhooks: the browser is redirected to the hosted page using the
//! returned session id.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::checkout::LineItem;

const USER_AGENT: &str = concat!("xma-site/", env!("CARGO_PKG_VERSION"));

/// Stripe client errors
#[derive(Debug, Error)]
pub enum StripeError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Created checkout session
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted checkout page
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Stripe API client
pub struct StripeClient {
    http_client: reqwest::Client,
    secret_key: String,
    api_base: String,
    success_url: String,
    cancel_url: String,
}

impl StripeClient {
    pub fn new(
        secret_key: String,
        api_base: &str,
        success_url: String,
        cancel_url: String,
    ) -> Result<Self, StripeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StripeError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            secret_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            success_url,
            cancel_url,
        })
    }

    /// Form fields for a payment-mode session, Stripe's bracketed array syntax
    pub fn session_form(&self, line_items: &[LineItem]) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];
        for (i, item) in line_items.iter().enumerate() {
            form.push((format!("line_items[{}][price]", i), item.price.clone()));
            form.push((format!("line_items[{}][quantity]", i), item.quantity.to_string()));
        }
        form
    }

    /// Create a hosted checkout session
    pub async fn create_checkout_session(
        &self,
        line_items: &[LineItem],
    ) -> Result<CheckoutSession, StripeError> {
        tracing::debug!(items = line_items.len(), "Creating Stripe checkout session");

        let response = self
            .http_client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&self.session_form(line_items))
            .send()
            .await
            .map_err(|e| StripeError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&error_text)
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or(error_text);
            return Err(StripeError::ApiError(status.as_u16(), message));
        }

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| StripeError::ParseError(e.to_string()))?;

        tracing::info!(session_id = %session.id, "Stripe checkout session created");
        Ok(session)
    }
}
