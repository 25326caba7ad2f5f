//! Checkout: cart validation, atomic order placement, hosted payment
//! sessions and payment webhooks.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use gateways::{CheckoutLineItem, CheckoutRequest, CompletedSession, PaymentGateway, webhook};
use serde::Serialize;
use store::{DocumentQuery, DocumentStore, Repository, StoreError, WriteBatch};

use super::{Order, OrderStatus, PaymentMethod, ShippingAddress};
use crate::cart::{Cart, clear_cart};
use crate::catalog::{Catalog, Product, stock_decrements};
use crate::page::{Page, PageRequest};
use crate::user::{Actor, User};
use crate::{DomainError, EntityId, Money, Result};

const META_CART_ID: &str = "cart_id";
const META_ADDRESS: &str = "address";

/// Hosted payment page for a cart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSessionOutput {
    pub session_url: String,
}

/// What a webhook delivery resulted in.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Not an event this service acts on.
    Ignored,
    /// The session already produced an order.
    Duplicate,
    Created(Order),
}

/// Label for `checkout_failures_total`.
fn failure_reason(error: &DomainError) -> &'static str {
    match error {
        DomainError::EmptyCart => "empty_cart",
        DomainError::PriceChanged { .. } => "price_changed",
        DomainError::InsufficientStock { .. } => "insufficient_stock",
        DomainError::AmountMismatch { .. } => "amount_mismatch",
        DomainError::InvalidSignature => "invalid_signature",
        DomainError::NotFound(_) => "not_found",
        DomainError::Validation(_) => "validation",
        _ => "other",
    }
}

fn record_failure<T>(result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        metrics::counter!("checkout_failures_total", "reason" => failure_reason(e)).increment(1);
    }
    result
}

/// Coordinates carts, catalog stock and orders.
#[derive(Clone)]
pub struct OrderWorkflow<S> {
    store: S,
    orders: Repository<Order, S>,
    carts: Repository<Cart, S>,
    users: Repository<User, S>,
    catalog: Catalog<S>,
    payments: Arc<dyn PaymentGateway>,
    frontend_url: String,
}

impl<S: DocumentStore + Clone> OrderWorkflow<S> {
    pub fn new(
        store: S,
        catalog: Catalog<S>,
        payments: Arc<dyn PaymentGateway>,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            orders: Repository::new(store.clone()),
            carts: Repository::new(store.clone()),
            users: Repository::new(store.clone()),
            store,
            catalog,
            payments,
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Loads a cart and checks every line against live product data.
    pub async fn validate_cart_items(&self, cart_id: EntityId) -> Result<Cart> {
        let cart = self.carts.require(cart_id).await?;
        self.validate_cart(&cart).await?;
        Ok(cart)
    }

    /// Returns the live product for each line, keyed by id.
    async fn validate_cart(&self, cart: &Cart) -> Result<HashMap<EntityId, Product>> {
        if cart.is_empty() {
            return Err(DomainError::EmptyCart);
        }

        let mut products = HashMap::with_capacity(cart.items.len());
        for item in &cart.items {
            let product = self
                .catalog
                .get_uncached(item.product_id)
                .await?
                .ok_or_else(|| DomainError::not_found("Product"))?;

            if product.price != item.price {
                return Err(DomainError::PriceChanged {
                    product: product.name,
                });
            }
            if product.quantity < i64::from(item.quantity) {
                return Err(DomainError::InsufficientStock {
                    product: product.name,
                });
            }
            products.insert(product.id, product);
        }
        Ok(products)
    }

    /// Loads a cart the actor owns. Other users' carts are reported missing.
    async fn owned_cart(&self, cart_id: EntityId, actor: &Actor) -> Result<Cart> {
        let cart = self.carts.require(cart_id).await?;
        if cart.user_id != actor.user_id {
            return Err(DomainError::not_found("Cart"));
        }
        Ok(cart)
    }

    /// Writes the order, decrements stock and empties the cart in one batch.
    async fn place(&self, order: &Order, cart: &Cart) -> Result<()> {
        let lines = cart.items.iter().map(|i| (i.product_id, i.quantity));
        let batch = WriteBatch::new().insert(order)?;
        let batch = stock_decrements(batch, lines);
        let batch = clear_cart(batch, cart.id)?;

        match self.store.commit(batch).await {
            Ok(()) => {}
            Err(StoreError::GuardFailed { id, .. }) => {
                let product = match self.catalog.get_uncached(id).await {
                    Ok(Some(p)) => p.name,
                    _ => id.to_string(),
                };
                return Err(DomainError::InsufficientStock { product });
            }
            Err(e) => return Err(e.into()),
        }

        let touched: Vec<EntityId> = cart.items.iter().map(|i| i.product_id).collect();
        self.catalog.invalidate(&touched).await;

        metrics::counter!("orders_created_total", "payment_method" => order.payment_method.as_str())
            .increment(1);
        tracing::info!(
            order_id = %order.id,
            user_id = %order.user_id,
            total = %order.total,
            payment_method = order.payment_method.as_str(),
            "order placed"
        );
        Ok(())
    }

    /// Places a cash-on-delivery order for the actor's cart.
    #[tracing::instrument(skip(self, address), fields(user_id = %actor.user_id))]
    pub async fn create_cash_order(
        &self,
        cart_id: EntityId,
        address: ShippingAddress,
        actor: &Actor,
    ) -> Result<Order> {
        let start = Instant::now();
        let result = record_failure(self.try_cash_order(cart_id, address, actor).await);
        metrics::histogram!("order_placement_duration_seconds", "payment_method" => "cash")
            .record(start.elapsed().as_secs_f64());
        result
    }

    async fn try_cash_order(
        &self,
        cart_id: EntityId,
        address: ShippingAddress,
        actor: &Actor,
    ) -> Result<Order> {
        address.validate()?;
        let cart = self.owned_cart(cart_id, actor).await?;
        self.validate_cart(&cart).await?;

        let order = Order::from_cart(&cart, PaymentMethod::Cash, address);
        self.place(&order, &cart).await?;
        Ok(order)
    }

    /// Opens a hosted payment page for the actor's cart. Nothing is reserved.
    #[tracing::instrument(skip(self, address), fields(user_id = %actor.user_id))]
    pub async fn create_checkout_session(
        &self,
        cart_id: EntityId,
        address: ShippingAddress,
        actor: &Actor,
    ) -> Result<CheckoutSessionOutput> {
        record_failure(self.try_checkout_session(cart_id, address, actor).await)
    }

    async fn try_checkout_session(
        &self,
        cart_id: EntityId,
        address: ShippingAddress,
        actor: &Actor,
    ) -> Result<CheckoutSessionOutput> {
        address.validate()?;
        let cart = self.owned_cart(cart_id, actor).await?;
        let products = self.validate_cart(&cart).await?;

        let line_items = cart
            .items
            .iter()
            .filter_map(|item| products.get(&item.product_id).map(|p| (item, p)))
            .map(|(item, product)| CheckoutLineItem {
                name: product.name.clone(),
                description: product.description.clone(),
                unit_amount: product.price.cents(),
                quantity: item.quantity,
            })
            .collect();

        let mut metadata = BTreeMap::new();
        metadata.insert(META_CART_ID.to_string(), cart.id.to_string());
        metadata.insert(META_ADDRESS.to_string(), serde_json::to_string(&address)?);

        let customer_email = self.users.get(actor.user_id).await?.map(|u| u.email);
        let session = self
            .payments
            .create_checkout_session(CheckoutRequest {
                line_items,
                success_url: format!("{}/success", self.frontend_url),
                cancel_url: format!("{}/cancel", self.frontend_url),
                customer_email,
                metadata,
            })
            .await?;

        tracing::info!(session_id = %session.id, cart_id = %cart.id, "checkout session created");
        Ok(CheckoutSessionOutput {
            session_url: session.url,
        })
    }

    /// Handles a signed payment webhook. Replays of a completed session are
    /// acknowledged without creating a second order.
    #[tracing::instrument(skip(self, payload, signature))]
    pub async fn webhook_checkout(&self, payload: &[u8], signature: &str) -> Result<WebhookOutcome> {
        let event = match self.payments.construct_event(payload, signature) {
            Ok(event) => event,
            Err(e) => return record_failure(Err(e.into())),
        };
        metrics::counter!("webhook_events_total", "type" => event.kind.clone()).increment(1);

        let Some(session) = event.completed.filter(|_| event.kind == webhook::CHECKOUT_SESSION_COMPLETED)
        else {
            tracing::debug!(event_id = %event.id, kind = %event.kind, "ignoring webhook event");
            return Ok(WebhookOutcome::Ignored);
        };

        let start = Instant::now();
        let result = record_failure(self.card_order(session).await);
        metrics::histogram!("order_placement_duration_seconds", "payment_method" => "card")
            .record(start.elapsed().as_secs_f64());
        result
    }

    async fn card_order(&self, session: CompletedSession) -> Result<WebhookOutcome> {
        let cart_id: EntityId = session
            .metadata
            .get(META_CART_ID)
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| DomainError::Validation("Missing session metadata".to_string()))?;
        let address: ShippingAddress = session
            .metadata
            .get(META_ADDRESS)
            .and_then(|a| serde_json::from_str(a).ok())
            .ok_or_else(|| DomainError::Validation("Missing session metadata".to_string()))?;

        if self.already_ordered(&session).await? {
            tracing::info!(session_id = %session.id, "duplicate checkout completion");
            return Ok(WebhookOutcome::Duplicate);
        }

        let cart = self
            .carts
            .get(cart_id)
            .await?
            .ok_or_else(|| DomainError::Validation("Cart not found".to_string()))?;
        if cart.is_empty() {
            return Err(DomainError::EmptyCart);
        }

        let paid = session.amount_total.map(Money::from_cents);
        if paid != Some(cart.total) {
            tracing::warn!(
                session_id = %session.id,
                expected = %cart.total,
                "payment amount mismatch"
            );
            return Err(DomainError::AmountMismatch {
                expected: cart.total,
                paid: paid.unwrap_or_else(Money::zero),
            });
        }

        let mut order = Order::from_cart(&cart, PaymentMethod::Card, address);
        order.is_paid = true;
        order.payment_intent_id = session.payment_intent.clone();
        order.checkout_session_id = Some(session.id.clone());

        match self.place(&order, &cart).await {
            Ok(()) => Ok(WebhookOutcome::Created(order)),
            // A concurrent delivery of the same session won the insert.
            Err(DomainError::Conflict(_)) => Ok(WebhookOutcome::Duplicate),
            Err(e) => {
                tracing::error!(session_id = %session.id, error = %e, "paid session produced no order");
                Err(e)
            }
        }
    }

    async fn already_ordered(&self, session: &CompletedSession) -> Result<bool> {
        if self
            .orders
            .exists(&DocumentQuery::by("checkout_session_id", session.id.clone()))
            .await?
        {
            return Ok(true);
        }
        match &session.payment_intent {
            Some(intent) => Ok(self
                .orders
                .exists(&DocumentQuery::by("payment_intent_id", intent.clone()))
                .await?),
            None => Ok(false),
        }
    }

    /// Customers see their own orders; admins see all.
    pub async fn list_orders(&self, actor: &Actor, page: PageRequest) -> Result<Page<Order>> {
        let mut query = DocumentQuery::new().sort_by_created(true);
        if !actor.is_admin() {
            query = query.eq("user_id", actor.user_id.to_string());
        }
        let total = self.orders.count(&query).await?;
        let orders = self.orders.find(&page.apply(query)).await?;
        Ok(Page::new(page, total, orders))
    }

    pub async fn get_order(&self, id: EntityId, actor: &Actor) -> Result<Order> {
        match self.orders.get(id).await? {
            Some(order) if actor.can_access(order.user_id) => Ok(order),
            _ => Err(DomainError::not_found("Order")),
        }
    }

    /// Admin status change. Only forward moves are allowed.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, id: EntityId, status: OrderStatus) -> Result<Order> {
        let before = self.orders.require(id).await?;
        let mut after = before.clone();
        after.advance(status)?;

        self.store
            .commit(WriteBatch::new().patch(&before, &after)?)
            .await?;
        tracing::info!(order_id = %id, from = %before.status, to = %after.status, "order status updated");
        Ok(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reasons() {
        assert_eq!(failure_reason(&DomainError::EmptyCart), "empty_cart");
        assert_eq!(
            failure_reason(&DomainError::InsufficientStock {
                product: "x".to_string()
            }),
            "insufficient_stock"
        );
        assert_eq!(failure_reason(&DomainError::InvalidToken), "other");
    }
}
