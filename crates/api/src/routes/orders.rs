//! Order listing, status changes, checkout and the payment webhook.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use domain::{
    CheckoutSessionOutput, DomainError, Order, OrderStatus, PageRequest, ShippingAddress,
    WebhookOutcome,
};
use serde::{Deserialize, Serialize};
use store::DocumentStore;

use crate::error::ApiError;
use crate::extract::{Authenticated, RequireAdmin, RequireCustomer, ValidJson, ValidQuery, parse_id};
use crate::response::Envelope;
use crate::state::AppState;

/// Header carrying the payment processor's webhook signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: &'static str,
}

/// GET /order
#[tracing::instrument(skip(state))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    ValidQuery(page): ValidQuery<PageRequest>,
) -> Result<Envelope<Vec<Order>>, ApiError> {
    Ok(Envelope::page(state.orders.list_orders(&actor, page).await?))
}

/// GET /order/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    Path(id): Path<String>,
) -> Result<Envelope<Order>, ApiError> {
    Ok(Envelope::new(state.orders.get_order(parse_id(&id)?, &actor).await?))
}

/// PATCH /order/{id}/status
#[tracing::instrument(skip(state, _admin))]
pub async fn update_status<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<StatusRequest>,
) -> Result<Envelope<Order>, ApiError> {
    let order = state.orders.update_status(parse_id(&id)?, req.status).await?;
    Ok(Envelope::new(order).message("Order updated successfully"))
}

/// POST /order/{id}/cod
#[tracing::instrument(skip(state, address))]
pub async fn create_cash_order<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequireCustomer(actor): RequireCustomer,
    Path(cart_id): Path<String>,
    ValidJson(address): ValidJson<ShippingAddress>,
) -> Result<Envelope<Order>, ApiError> {
    let order = state
        .orders
        .create_cash_order(parse_id(&cart_id)?, address, &actor)
        .await?;
    Ok(Envelope::created(order)
        .message("Your order has been confirmed and will be shipped soon!"))
}

/// POST /order/checkout-session/{id}
#[tracing::instrument(skip(state, address))]
pub async fn create_checkout_session<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequireCustomer(actor): RequireCustomer,
    Path(cart_id): Path<String>,
    ValidJson(address): ValidJson<ShippingAddress>,
) -> Result<Envelope<CheckoutSessionOutput>, ApiError> {
    let session = state
        .orders
        .create_checkout_session(parse_id(&cart_id)?, address, &actor)
        .await?;
    Ok(Envelope::new(session))
}

/// POST /order/webhook-checkout
///
/// Authenticated by signature rather than bearer token. The body must be
/// the raw bytes the processor signed.
#[tracing::instrument(skip_all)]
pub async fn webhook_checkout<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Envelope<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(DomainError::InvalidSignature)?;

    let outcome = match state.orders.webhook_checkout(&body, signature).await? {
        WebhookOutcome::Ignored => "ignored",
        WebhookOutcome::Duplicate => "duplicate",
        WebhookOutcome::Created(_) => "created",
    };
    Ok(Envelope::new(WebhookAck {
        received: true,
        outcome,
    }))
}
