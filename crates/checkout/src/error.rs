//! Checkout error types.

use common::ProductId;
use domain::{ForbiddenTransition, InvalidStatusValue, PromoRejection, SettlementPlanError};
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by checkout operations.
///
/// Every variant is distinguishable so the presentation layer can render
/// an actionable message, and none of them leave partial effects behind.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The caller carries no authenticated user identity.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// The cart holds no lines.
    #[error("Cart is empty")]
    CartEmpty,

    /// A line wants more units than the product currently has.
    #[error("Insufficient stock for {name}")]
    InsufficientStock {
        product_id: ProductId,
        name: String,
        requested: u32,
        available: u32,
    },

    /// The promo code was rejected; the inner value carries the reason.
    #[error(transparent)]
    Promo(#[from] PromoRejection),

    /// The caller's role may not make this status transition.
    #[error(transparent)]
    Forbidden(#[from] ForbiddenTransition),

    /// The submitted status is not one of the known states.
    #[error(transparent)]
    InvalidStatus(#[from] InvalidStatusValue),

    /// Both settlement attempts lost their race without a more precise
    /// shortage to report.
    #[error("Checkout conflicted with another order; please try again")]
    SettlementConflict,

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SettlementPlanError> for CheckoutError {
    fn from(e: SettlementPlanError) -> Self {
        match e {
            SettlementPlanError::CartEmpty => CheckoutError::CartEmpty,
            SettlementPlanError::InsufficientStock {
                product_id,
                name,
                requested,
                available,
            } => CheckoutError::InsufficientStock {
                product_id,
                name,
                requested,
                available,
            },
            SettlementPlanError::Promo(rejection) => CheckoutError::Promo(rejection),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
