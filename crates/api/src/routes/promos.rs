//! Promo code validation and administration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::PromoQuote;
use common::PromoCodeId;
use domain::{Money, PromoCode, PromoCodeInput};
use rust_decimal::Decimal;
use serde::Deserialize;
use store::StorefrontStore;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::Identity;
use crate::routes::require_admin;

#[derive(Deserialize)]
pub struct ValidatePromoRequest {
    pub code: String,
    pub subtotal: Decimal,
}

/// POST /promo-codes/validate — quote a promo code against a subtotal.
///
/// A read-only probe for the cart preview: it reports the discount the
/// code would grant, or the rejection reason, without redeeming anything.
#[tracing::instrument(skip(state, _identity, req))]
pub async fn validate<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _identity: Identity,
    Json(req): Json<ValidatePromoRequest>,
) -> Result<Json<PromoQuote>, ApiError> {
    let quote = state
        .checkout
        .validate_promo(&req.code, Money::new(req.subtotal))
        .await?;
    Ok(Json(quote))
}

/// GET /promo-codes — all promo codes, newest first (admin).
#[tracing::instrument(skip(state, identity))]
pub async fn list<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<Vec<PromoCode>>, ApiError> {
    require_admin(&identity.0)?;
    let promos = state.checkout.store().list_promos().await?;
    Ok(Json(promos))
}

/// POST /promo-codes — create a promo code (admin).
///
/// An omitted code gets a generated eight-character one.
#[tracing::instrument(skip(state, identity, input))]
pub async fn create<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(input): Json<PromoCodeInput>,
) -> Result<(StatusCode, Json<PromoCode>), ApiError> {
    require_admin(&identity.0)?;
    input.validate()?;
    let promo = state.checkout.store().create_promo(input).await?;
    tracing::info!(promo_id = %promo.id, code = %promo.code, "promo code created");
    Ok((StatusCode::CREATED, Json(promo)))
}

/// PUT /promo-codes/{id} — replace a promo code's fields (admin).
///
/// `used_count` is preserved; an omitted code keeps the existing one.
#[tracing::instrument(skip(state, identity, input))]
pub async fn update<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(input): Json<PromoCodeInput>,
) -> Result<Json<PromoCode>, ApiError> {
    require_admin(&identity.0)?;
    input.validate()?;
    let promo = state
        .checkout
        .store()
        .update_promo(PromoCodeId::from_uuid(id), input)
        .await?;
    Ok(Json(promo))
}

/// DELETE /promo-codes/{id} — delete a promo code (admin).
///
/// Orders that redeemed it keep their frozen discount.
#[tracing::instrument(skip(state, identity))]
pub async fn delete<S: StorefrontStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_admin(&identity.0)?;
    state
        .checkout
        .store()
        .delete_promo(PromoCodeId::from_uuid(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
