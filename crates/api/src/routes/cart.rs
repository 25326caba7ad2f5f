//! The caller's cart. Customer-only.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{AddToCart, Cart};
use serde::Deserialize;
use store::DocumentStore;

use crate::error::ApiError;
use crate::extract::{RequireCustomer, ValidJson, parse_id};
use crate::response::Envelope;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: i64,
}

fn cart_envelope(cart: Cart) -> Envelope<Cart> {
    let items = cart.num_items();
    Envelope::new(cart).results(items)
}

/// GET /cart
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequireCustomer(actor): RequireCustomer,
) -> Result<Envelope<Cart>, ApiError> {
    Ok(cart_envelope(state.carts.get_by_user(actor.user_id).await?))
}

/// POST /cart
#[tracing::instrument(skip(state))]
pub async fn add<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequireCustomer(actor): RequireCustomer,
    ValidJson(req): ValidJson<AddToCart>,
) -> Result<Envelope<Cart>, ApiError> {
    let cart = state.carts.add_item(actor.user_id, req).await?;
    Ok(cart_envelope(cart).message("Product added to cart successfully"))
}

/// DELETE /cart
#[tracing::instrument(skip(state))]
pub async fn clear<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequireCustomer(actor): RequireCustomer,
) -> Result<StatusCode, ApiError> {
    state.carts.delete_cart(actor.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /cart/{product_id}
#[tracing::instrument(skip(state))]
pub async fn update_quantity<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequireCustomer(actor): RequireCustomer,
    Path(product_id): Path<String>,
    ValidJson(req): ValidJson<QuantityRequest>,
) -> Result<Envelope<Cart>, ApiError> {
    let cart = state
        .carts
        .update_quantity(actor.user_id, parse_id(&product_id)?, req.quantity)
        .await?;
    Ok(cart_envelope(cart).message("Product quantity updated successfully"))
}

/// DELETE /cart/{product_id}
#[tracing::instrument(skip(state))]
pub async fn remove<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequireCustomer(actor): RequireCustomer,
    Path(product_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .carts
        .remove_item(actor.user_id, parse_id(&product_id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
