//! Payment gateway trait and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::webhook;
use crate::{GatewayError, Result};

/// One line of a hosted checkout, priced in cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutLineItem {
    pub name: String,
    pub description: String,
    pub unit_amount: i64,
    pub quantity: u32,
}

/// Everything needed to open a hosted checkout page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub line_items: Vec<CheckoutLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutRequest {
    /// Sum of `unit_amount * quantity` over all lines.
    pub fn amount_total(&self) -> i64 {
        self.line_items
            .iter()
            .map(|l| l.unit_amount * i64::from(l.quantity))
            .sum()
    }
}

/// A hosted checkout created by the processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// A paid checkout session, as reported by a webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSession {
    pub id: String,
    pub amount_total: Option<i64>,
    pub payment_intent: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// A verified webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub id: String,
    pub kind: String,
    /// Present only for `checkout.session.completed`.
    pub completed: Option<CompletedSession>,
}

/// Trait for the external payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted checkout page.
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession>;

    /// Verifies a webhook signature and parses the event.
    fn construct_event(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    sessions: Vec<(CheckoutSession, CheckoutRequest)>,
    next_id: u32,
    fail_on_checkout: bool,
}

/// In-memory payment gateway for testing.
///
/// Sessions are recorded instead of sent anywhere. Webhooks go through the
/// same signature verification as the real gateway, so tests sign bodies
/// with [`InMemoryPaymentGateway::sign`].
#[derive(Debug, Clone)]
pub struct InMemoryPaymentGateway {
    webhook_secret: String,
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl Default for InMemoryPaymentGateway {
    fn default() -> Self {
        Self::new("whsec_local")
    }
}

impl InMemoryPaymentGateway {
    /// Creates a gateway that accepts webhooks signed with `webhook_secret`.
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            state: Arc::default(),
        }
    }

    /// Configures the gateway to reject the next checkout requests.
    pub async fn set_fail_on_checkout(&self, fail: bool) {
        self.state.write().await.fail_on_checkout = fail;
    }

    /// Returns every checkout request received so far.
    pub async fn requests(&self) -> Vec<CheckoutRequest> {
        self.state
            .read()
            .await
            .sessions
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    /// Signs a webhook body with the current time.
    pub fn sign(&self, payload: &[u8]) -> Result<String> {
        webhook::sign(payload, &self.webhook_secret, chrono::Utc::now().timestamp())
    }

    /// Builds a `checkout.session.completed` body for a session.
    pub fn completed_event_body(
        session_id: &str,
        amount_total: i64,
        payment_intent: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Vec<u8> {
        serde_json::json!({
            "id": format!("evt_{session_id}"),
            "type": webhook::CHECKOUT_SESSION_COMPLETED,
            "data": {"object": {
                "id": session_id,
                "object": "checkout.session",
                "amount_total": amount_total,
                "payment_intent": payment_intent,
                "metadata": metadata,
            }}
        })
        .to_string()
        .into_bytes()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let mut state = self.state.write().await;

        if state.fail_on_checkout {
            return Err(GatewayError::Payment("Checkout unavailable".to_string()));
        }

        state.next_id += 1;
        let id = format!("cs_test_{:04}", state.next_id);
        let session = CheckoutSession {
            url: format!("https://checkout.local/pay/{id}"),
            id,
        };
        tracing::info!(session_id = %session.id, amount = request.amount_total(), "checkout session recorded");
        state.sessions.push((session.clone(), request));

        Ok(session)
    }

    fn construct_event(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent> {
        webhook::construct_event(
            payload,
            signature,
            &self.webhook_secret,
            chrono::Utc::now().timestamp(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            line_items: vec![
                CheckoutLineItem {
                    name: "Mug".to_string(),
                    description: "Stoneware".to_string(),
                    unit_amount: 1250,
                    quantity: 2,
                },
                CheckoutLineItem {
                    name: "Tea".to_string(),
                    description: String::new(),
                    unit_amount: 500,
                    quantity: 1,
                },
            ],
            success_url: "http://shop/success".to_string(),
            cancel_url: "http://shop/cancel".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn amount_total_sums_lines() {
        assert_eq!(request().amount_total(), 3000);
    }

    #[tokio::test]
    async fn test_sequential_session_ids() {
        let gateway = InMemoryPaymentGateway::default();
        let first = gateway.create_checkout_session(request()).await.unwrap();
        let second = gateway.create_checkout_session(request()).await.unwrap();

        assert_eq!(first.id, "cs_test_0001");
        assert_eq!(second.id, "cs_test_0002");
        assert!(second.url.ends_with("cs_test_0002"));
        assert_eq!(gateway.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_fail_on_checkout() {
        let gateway = InMemoryPaymentGateway::default();
        gateway.set_fail_on_checkout(true).await;

        let result = gateway.create_checkout_session(request()).await;
        assert!(matches!(result, Err(GatewayError::Payment(_))));
        assert!(gateway.requests().await.is_empty());
    }

    #[test]
    fn signed_completed_event_roundtrips() {
        let gateway = InMemoryPaymentGateway::new("whsec_abc");
        let metadata = BTreeMap::from([("cart_id".to_string(), "c-1".to_string())]);
        let body = InMemoryPaymentGateway::completed_event_body("cs_9", 700, "pi_9", &metadata);
        let signature = gateway.sign(&body).unwrap();

        let event = gateway.construct_event(&body, &signature).unwrap();
        let session = event.completed.unwrap();
        assert_eq!(session.payment_intent.as_deref(), Some("pi_9"));
        assert_eq!(session.metadata, metadata);
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let gateway = InMemoryPaymentGateway::new("whsec_abc");
        let other = InMemoryPaymentGateway::new("whsec_xyz");
        let body = InMemoryPaymentGateway::completed_event_body("cs_9", 700, "pi_9", &BTreeMap::new());

        let signature = other.sign(&body).unwrap();
        assert!(matches!(
            gateway.construct_event(&body, &signature),
            Err(GatewayError::InvalidSignature(_))
        ));
    }
}
