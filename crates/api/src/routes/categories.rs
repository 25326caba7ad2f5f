//! Category endpoints. Reads are public; writes are admin-only.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{Category, CreateCategory, PageRequest, UpdateCategory};
use store::DocumentStore;

use crate::error::ApiError;
use crate::extract::{RequireAdmin, ValidJson, ValidQuery, parse_id};
use crate::response::Envelope;
use crate::state::AppState;

/// GET /category
#[tracing::instrument(skip(state))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ValidQuery(page): ValidQuery<PageRequest>,
) -> Result<Envelope<Vec<Category>>, ApiError> {
    Ok(Envelope::page(state.categories.list(page).await?))
}

/// GET /category/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Envelope<Category>, ApiError> {
    Ok(Envelope::new(state.categories.get(parse_id(&id)?).await?))
}

/// POST /category
#[tracing::instrument(skip(state, _admin, req))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: RequireAdmin,
    ValidJson(req): ValidJson<CreateCategory>,
) -> Result<Envelope<Category>, ApiError> {
    let category = state.categories.create(req).await?;
    Ok(Envelope::created(category).message("Category created successfully"))
}

/// PATCH /category/{id}
#[tracing::instrument(skip(state, _admin, req))]
pub async fn update<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<UpdateCategory>,
) -> Result<Envelope<Category>, ApiError> {
    let category = state.categories.update(parse_id(&id)?, req).await?;
    Ok(Envelope::new(category).message("Category updated successfully"))
}

/// DELETE /category/{id}
#[tracing::instrument(skip(state, _admin))]
pub async fn delete<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.categories.delete(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
