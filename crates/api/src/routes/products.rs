//! Product endpoints. Reads are public and go through the product cache;
//! writes are admin-only.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{
    CreateProduct, EntityId, PageRequest, ProductFilter, ProductSort, ProductView, UpdateProduct,
};
use serde::Deserialize;
use store::DocumentStore;

use crate::error::ApiError;
use crate::extract::{RequireAdmin, ValidJson, ValidQuery, parse_id};
use crate::response::Envelope;
use crate::state::AppState;

/// Query string for product listing. Prices are in cents.
#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub category: Option<EntityId>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub keyword: Option<String>,
    #[serde(default)]
    pub sort: ProductSort,
}

impl ProductListQuery {
    fn split(self) -> (ProductFilter, PageRequest) {
        (
            ProductFilter {
                category: self.category,
                min_price: self.min_price,
                max_price: self.max_price,
                keyword: self.keyword,
                sort: self.sort,
            },
            PageRequest {
                page: self.page,
                limit: self.limit,
            },
        )
    }
}

/// GET /product
#[tracing::instrument(skip(state))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ValidQuery(query): ValidQuery<ProductListQuery>,
) -> Result<Envelope<Vec<ProductView>>, ApiError> {
    let (filter, page) = query.split();
    Ok(Envelope::page(state.catalog.list(&filter, page).await?))
}

/// GET /product/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Envelope<ProductView>, ApiError> {
    let product = state.catalog.get(parse_id(&id)?).await?;
    Ok(Envelope::new(product.view()))
}

/// POST /product
#[tracing::instrument(skip(state, _admin, req))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: RequireAdmin,
    ValidJson(req): ValidJson<CreateProduct>,
) -> Result<Envelope<ProductView>, ApiError> {
    let product = state.catalog.create(req).await?;
    Ok(Envelope::created(product.view()).message("Product created successfully"))
}

/// PATCH /product/{id}
#[tracing::instrument(skip(state, _admin, req))]
pub async fn update<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<UpdateProduct>,
) -> Result<Envelope<ProductView>, ApiError> {
    let product = state.catalog.update(parse_id(&id)?, req).await?;
    Ok(Envelope::new(product.view()).message("Product updated successfully"))
}

/// DELETE /product/{id}
#[tracing::instrument(skip(state, _admin))]
pub async fn delete<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
