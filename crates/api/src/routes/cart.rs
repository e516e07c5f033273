//! Shopping cart endpoints.
//!
//! Carts are keyed by the caller's identity (user or anonymous session)
//! and created lazily on first access. Quantity changes are checked
//! against live stock; the authoritative check still happens at checkout.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{CartOwner, ProductId};
use domain::{CartLine, CartSnapshot, Money};
use serde::{Deserialize, Serialize};
use store::StorefrontStore;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::Identity;

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: u32,
}

/// A cart as presented to the client: lines plus the running subtotal.
#[derive(Serialize)]
pub struct CartView {
    pub cart_id: Uuid,
    pub items: Vec<CartLine>,
    pub subtotal: Money,
}

impl From<CartSnapshot> for CartView {
    fn from(snapshot: CartSnapshot) -> Self {
        let subtotal = snapshot.subtotal();
        Self {
            cart_id: snapshot.cart_id.as_uuid(),
            items: snapshot.lines,
            subtotal,
        }
    }
}

fn owner_of(identity: &Identity) -> Result<CartOwner, ApiError> {
    identity.0.cart_owner().ok_or_else(|| {
        ApiError::Unauthenticated("Request carries no user or session identity".to_string())
    })
}

/// GET /cart — the caller's cart, created on first access.
#[tracing::instrument(skip(state, identity))]
pub async fn get<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<CartView>, ApiError> {
    let store = state.checkout.store();
    let cart = store.ensure_cart(&owner_of(&identity)?).await?;
    let snapshot = store.cart_snapshot(cart.id).await?;
    Ok(Json(snapshot.into()))
}

/// POST /cart/items — add units of a product, accumulating onto an
/// existing line.
#[tracing::instrument(skip(state, identity, req))]
pub async fn add_item<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartView>, ApiError> {
    let store = state.checkout.store();
    let cart = store.ensure_cart(&owner_of(&identity)?).await?;
    let snapshot = store
        .add_cart_item(cart.id, ProductId::from_uuid(req.product_id), req.quantity)
        .await?;
    Ok(Json(snapshot.into()))
}

/// PUT /cart/items/{product_id} — set a line's quantity exactly.
#[tracing::instrument(skip(state, identity, req))]
pub async fn set_item<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(product_id): Path<Uuid>,
    Json(req): Json<SetQuantityRequest>,
) -> Result<Json<CartView>, ApiError> {
    let store = state.checkout.store();
    let cart = store.ensure_cart(&owner_of(&identity)?).await?;
    let snapshot = store
        .set_cart_item(cart.id, ProductId::from_uuid(product_id), req.quantity)
        .await?;
    Ok(Json(snapshot.into()))
}

/// DELETE /cart/items/{product_id} — remove a line.
#[tracing::instrument(skip(state, identity))]
pub async fn remove_item<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(product_id): Path<Uuid>,
) -> Result<Json<CartView>, ApiError> {
    let store = state.checkout.store();
    let cart = store.ensure_cart(&owner_of(&identity)?).await?;
    let snapshot = store
        .remove_cart_item(cart.id, ProductId::from_uuid(product_id))
        .await?;
    Ok(Json(snapshot.into()))
}

/// DELETE /cart — remove every line, keeping the cart.
#[tracing::instrument(skip(state, identity))]
pub async fn clear<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<CartView>, ApiError> {
    let store = state.checkout.store();
    let cart = store.ensure_cart(&owner_of(&identity)?).await?;
    store.clear_cart(cart.id).await?;
    let snapshot = store.cart_snapshot(cart.id).await?;
    Ok(Json(snapshot.into()))
}
