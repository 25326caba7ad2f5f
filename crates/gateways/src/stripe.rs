//! Stripe Checkout over its REST API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::payment::{CheckoutRequest, CheckoutSession, PaymentGateway, WebhookEvent};
use crate::{GatewayError, Result, webhook};

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Payment gateway backed by Stripe Checkout.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
    webhook_secret: SecretString,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .finish()
    }
}

impl StripeGateway {
    pub fn new(secret_key: SecretString, webhook_secret: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            secret_key,
            webhook_secret,
        }
    }

    /// Points the client at a different API host (stripe-mock, proxies).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

/// Flattens a request into Stripe's bracketed form encoding.
fn form_params(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];

    if let Some(email) = &request.customer_email {
        params.push(("customer_email".to_string(), email.clone()));
    }

    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        params.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        params.push((format!("{prefix}[price_data][currency]"), "usd".to_string()));
        params.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_amount.to_string(),
        ));
        params.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.name.clone(),
        ));
        if !item.description.is_empty() {
            params.push((
                format!("{prefix}[price_data][product_data][description]"),
                item.description.clone(),
            ));
        }
    }

    for (key, value) in &request.metadata {
        params.push((format!("metadata[{key}]"), value.clone()));
    }

    params
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[tracing::instrument(skip(self, request), fields(lines = request.line_items.len()))]
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&form_params(&request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| status.to_string());
            tracing::warn!(%status, %message, "stripe rejected checkout session");
            return Err(GatewayError::Payment(message));
        }

        let session: SessionResponse = response.json().await?;
        let url = session
            .url
            .ok_or_else(|| GatewayError::Payment("session has no url".to_string()))?;

        tracing::info!(session_id = %session.id, "created stripe checkout session");
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    fn construct_event(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent> {
        webhook::construct_event(
            payload,
            signature,
            self.webhook_secret.expose_secret(),
            chrono::Utc::now().timestamp(),
        )
    }
}
