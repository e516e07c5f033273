//! Catalog endpoints.
//!
//! Browsing is public; product management (including restock and
//! activation) is admin-only.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::ProductId;
use domain::{NewProduct, Product};
use store::StorefrontStore;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::Identity;
use crate::routes::require_admin;

fn is_staff(headers: &HeaderMap) -> bool {
    Identity::try_from_headers(headers).is_some_and(|identity| identity.0.is_staff())
}

/// GET /products — list the catalog.
///
/// Anonymous and customer callers see active products only; staff see
/// the full catalog including deactivated rows.
#[tracing::instrument(skip(state, headers))]
pub async fn list<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = state
        .checkout
        .store()
        .list_products(!is_staff(&headers))
        .await?;
    Ok(Json(products))
}

/// GET /products/{id} — load one product.
#[tracing::instrument(skip(state, headers))]
pub async fn get<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, ApiError> {
    let id = ProductId::from_uuid(id);
    let product = state.checkout.store().product(id).await?;
    if !product.is_active && !is_staff(&headers) {
        return Err(ApiError::NotFound(format!("Product not found: {id}")));
    }
    Ok(Json(product))
}

/// POST /products — add a product to the catalog (admin).
#[tracing::instrument(skip(state, identity, input))]
pub async fn create<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(input): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    require_admin(&identity.0)?;
    input.validate()?;
    let product = state.checkout.store().create_product(input).await?;
    tracing::info!(product_id = %product.id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /products/{id} — replace a product's fields (admin).
#[tracing::instrument(skip(state, identity, input))]
pub async fn update<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(input): Json<NewProduct>,
) -> Result<Json<Product>, ApiError> {
    require_admin(&identity.0)?;
    input.validate()?;
    let product = state
        .checkout
        .store()
        .update_product(ProductId::from_uuid(id), input)
        .await?;
    Ok(Json(product))
}
