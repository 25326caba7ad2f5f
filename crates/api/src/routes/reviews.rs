//! Review endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{CreateReview, PageRequest, Review, UpdateReview};
use store::DocumentStore;

use crate::error::ApiError;
use crate::extract::{Authenticated, RequireCustomer, ValidJson, ValidQuery, parse_id};
use crate::response::Envelope;
use crate::state::AppState;

/// POST /review
#[tracing::instrument(skip(state, req))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequireCustomer(actor): RequireCustomer,
    ValidJson(req): ValidJson<CreateReview>,
) -> Result<Envelope<Review>, ApiError> {
    let review = state.reviews.create(&actor, req).await?;
    Ok(Envelope::created(review).message("Review created successfully"))
}

/// GET /review
#[tracing::instrument(skip(state))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    ValidQuery(page): ValidQuery<PageRequest>,
) -> Result<Envelope<Vec<Review>>, ApiError> {
    Ok(Envelope::page(state.reviews.list(&actor, page).await?))
}

/// GET /review/{id}
#[tracing::instrument(skip(state, _actor))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _actor: Authenticated,
    Path(id): Path<String>,
) -> Result<Envelope<Review>, ApiError> {
    Ok(Envelope::new(state.reviews.get(parse_id(&id)?).await?))
}

/// PATCH /review/{id}
#[tracing::instrument(skip(state, req))]
pub async fn update<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequireCustomer(actor): RequireCustomer,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<UpdateReview>,
) -> Result<Envelope<Review>, ApiError> {
    let review = state.reviews.update(&actor, parse_id(&id)?, req).await?;
    Ok(Envelope::new(review).message("Review updated successfully"))
}

/// DELETE /review/{id}
///
/// Owners may delete their review; admins may delete any.
#[tracing::instrument(skip(state))]
pub async fn delete<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.reviews.delete(&actor, parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
