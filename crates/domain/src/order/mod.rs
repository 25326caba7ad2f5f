//! Orders and the checkout workflow that creates them.

mod status;
mod workflow;

pub use status::OrderStatus;
pub use workflow::{CheckoutSessionOutput, OrderWorkflow, WebhookOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use store::Document;

use crate::cart::{Cart, CartItem};
use crate::{DomainError, EntityId, Money, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub country: String,
    pub postal_code: String,
}

impl ShippingAddress {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("street", &self.street),
            ("city", &self.city),
            ("country", &self.country),
            ("postal_code", &self.postal_code),
        ] {
            if value.trim().is_empty() {
                return Err(DomainError::Validation(format!("{field} should not be empty")));
            }
        }
        Ok(())
    }
}

/// Purchased line, frozen at order time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: EntityId,
    pub quantity: u32,
    pub price: Money,
}

impl From<&CartItem> for OrderItem {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: EntityId,
    pub user_id: EntityId,
    pub items: Vec<OrderItem>,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub is_paid: bool,
    pub shipping_address: ShippingAddress,
    pub delivered_at: Option<DateTime<Utc>>,
    pub payment_intent_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Order {
    const COLLECTION: &'static str = "orders";
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["checkout_session_id"]];

    fn id(&self) -> EntityId {
        self.id
    }
}

impl Order {
    /// A confirmed order snapshotting the cart's lines and total.
    pub(crate) fn from_cart(
        cart: &Cart,
        payment_method: PaymentMethod,
        shipping_address: ShippingAddress,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            user_id: cart.user_id,
            items: cart.items.iter().map(OrderItem::from).collect(),
            total: cart.total,
            payment_method,
            status: OrderStatus::Confirmed,
            is_paid: false,
            shipping_address,
            delivered_at: None,
            payment_intent_id: None,
            checkout_session_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the order forward. Delivery implies payment.
    pub fn advance(&mut self, next: OrderStatus) -> Result<()> {
        self.status = self.status.transition(next)?;
        if next == OrderStatus::Delivered {
            self.is_paid = true;
            self.delivered_at = Some(Utc::now());
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}
