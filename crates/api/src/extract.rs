//! Request extractors: bearer-token identity with role guards, and JSON,
//! query and path extractors whose rejections use the API error body.

use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use domain::{Actor, EntityId, Role};
use serde::de::DeserializeOwned;
use store::DocumentStore;

use crate::error::ApiError;
use crate::state::AppState;

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))
}

fn actor_from<S: DocumentStore + Clone + 'static>(
    parts: &Parts,
    state: &Arc<AppState<S>>,
) -> Result<Actor, ApiError> {
    let token = bearer_token(parts)?;
    let claims = state
        .auth
        .authenticate(token)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;
    Ok(Actor::new(claims.sub, claims.role))
}

/// Any authenticated caller.
#[derive(Debug)]
pub struct Authenticated(pub Actor);

/// An authenticated admin.
#[derive(Debug)]
pub struct RequireAdmin(pub Actor);

/// An authenticated customer.
#[derive(Debug)]
pub struct RequireCustomer(pub Actor);

impl<S> FromRequestParts<Arc<AppState<S>>> for Authenticated
where
    S: DocumentStore + Clone + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        actor_from(parts, state).map(Self)
    }
}

impl<S> FromRequestParts<Arc<AppState<S>>> for RequireAdmin
where
    S: DocumentStore + Clone + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let actor = actor_from(parts, state)?;
        if actor.role != Role::Admin {
            return Err(ApiError::Forbidden(
                "You do not have permission to perform this action".to_string(),
            ));
        }
        Ok(Self(actor))
    }
}

impl<S> FromRequestParts<Arc<AppState<S>>> for RequireCustomer
where
    S: DocumentStore + Clone + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let actor = actor_from(parts, state)?;
        if actor.role != Role::Customer {
            return Err(ApiError::Forbidden(
                "You do not have permission to perform this action".to_string(),
            ));
        }
        Ok(Self(actor))
    }
}

/// JSON body; malformed input is a 400 with the API error body.
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

/// Query string; malformed input is a 400 with the API error body.
#[derive(Debug)]
pub struct ValidQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

/// Parses a path segment as an entity id.
pub fn parse_id(raw: &str) -> Result<EntityId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid id: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id("not-a-uuid").is_err());
        let id = EntityId::new();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }
}
