//! Admin user management.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{CreateUser, PageRequest, UpdateUser, UserView};
use store::DocumentStore;

use crate::error::ApiError;
use crate::extract::{RequireAdmin, ValidJson, ValidQuery, parse_id};
use crate::response::Envelope;
use crate::state::AppState;

/// GET /users
#[tracing::instrument(skip(state, _admin))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: RequireAdmin,
    ValidQuery(page): ValidQuery<PageRequest>,
) -> Result<Envelope<Vec<UserView>>, ApiError> {
    Ok(Envelope::page(state.users.list(page).await?))
}

/// POST /users
#[tracing::instrument(skip(state, _admin, req))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: RequireAdmin,
    ValidJson(req): ValidJson<CreateUser>,
) -> Result<Envelope<UserView>, ApiError> {
    let user = state.users.create(req).await?;
    Ok(Envelope::created(user).message("User created successfully"))
}

/// GET /users/{id}
#[tracing::instrument(skip(state, _admin))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
) -> Result<Envelope<UserView>, ApiError> {
    Ok(Envelope::new(state.users.get(parse_id(&id)?).await?))
}

/// PATCH /users/{id}
#[tracing::instrument(skip(state, _admin, req))]
pub async fn update<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<UpdateUser>,
) -> Result<Envelope<UserView>, ApiError> {
    let user = state.users.update(parse_id(&id)?, req).await?;
    Ok(Envelope::new(user).message("User updated successfully"))
}

/// DELETE /users/{id}
#[tracing::instrument(skip(state, _admin))]
pub async fn delete<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.users.delete(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
