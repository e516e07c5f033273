//! Order placement and fulfillment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{CartOwner, OrderId};
use domain::{Order, OrderStatus};
use serde::Deserialize;
use store::StorefrontStore;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::Identity;
use crate::routes::require_staff;

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    /// Optional promo code; case-insensitive.
    #[serde(default)]
    pub promo_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /orders — settle the caller's cart into an order.
///
/// Checkout requires an authenticated user; anonymous sessions can build
/// carts but not place orders.
#[tracing::instrument(skip(state, identity, req))]
pub async fn place<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let caller = identity.into_caller();
    let user_id = caller
        .user
        .ok_or_else(|| ApiError::Unauthenticated("Checkout requires a user account".to_string()))?;

    let cart = state
        .checkout
        .store()
        .ensure_cart(&CartOwner::User(user_id))
        .await?;
    let order = state
        .checkout
        .place_order(&caller, cart.id, req.promo_code.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders — the caller's own orders, newest first.
#[tracing::instrument(skip(state, identity))]
pub async fn list<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let user_id = identity.0.user.ok_or_else(|| {
        ApiError::Unauthenticated("Order history requires a user account".to_string())
    })?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let orders = state
        .checkout
        .store()
        .orders_for_user(user_id, status)
        .await?;
    Ok(Json(orders))
}

/// GET /orders/queue — orders awaiting fulfillment, oldest first
/// (picker/admin).
#[tracing::instrument(skip(state, identity))]
pub async fn queue<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<Vec<Order>>, ApiError> {
    require_staff(&identity.0)?;
    let orders = state.checkout.store().fulfillment_queue().await?;
    Ok(Json(orders))
}

/// GET /orders/{id} — one order; visible to its owner and to staff.
#[tracing::instrument(skip(state, identity))]
pub async fn get<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, ApiError> {
    let id = OrderId::from_uuid(id);
    let order = state.checkout.store().order(id).await?;
    if !identity.0.is_staff() && identity.0.user != Some(order.user_id) {
        // Hide other customers' orders entirely.
        return Err(ApiError::NotFound(format!("Order not found: {id}")));
    }
    Ok(Json(order))
}

/// PUT /orders/{id}/status — move an order through its lifecycle.
///
/// The allowed edges depend on the caller's role; a forbidden transition
/// is reported, never silently ignored.
#[tracing::instrument(skip(state, identity, req))]
pub async fn update_status<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let caller = identity.into_caller();
    let order = state
        .checkout
        .update_order_status(
            &caller,
            OrderId::from_uuid(id),
            &req.status,
            req.note.as_deref(),
        )
        .await?;
    Ok(Json(order))
}
