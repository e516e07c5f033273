//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::{ProductValidationError, PromoRejection, PromoValidationError};
use store::StoreError;

/// API-level error type that maps to HTTP responses.
///
/// Every named checkout failure keeps its own message so the client can
/// render something actionable rather than a generic error page.
#[derive(Debug)]
pub enum ApiError {
    /// The request carries no usable caller identity.
    Unauthenticated(String),
    /// The caller's role does not grant access to this endpoint.
    Forbidden(String),
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout operation failure.
    Checkout(CheckoutError),
    /// Store operation failure outside a checkout.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    let status = match &err {
        CheckoutError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        CheckoutError::CartEmpty | CheckoutError::InsufficientStock { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CheckoutError::Promo(PromoRejection::NotFound) => StatusCode::NOT_FOUND,
        CheckoutError::Promo(_) | CheckoutError::InvalidStatus(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CheckoutError::Forbidden(_) | CheckoutError::SettlementConflict => StatusCode::CONFLICT,
        CheckoutError::Store(store_err) => return store_error_to_response_ref(store_err, &err),
    };
    (status, err.to_string())
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    let message = err.to_string();
    (store_status(&err, &message), message)
}

fn store_error_to_response_ref(err: &StoreError, outer: &CheckoutError) -> (StatusCode, String) {
    let message = outer.to_string();
    (store_status(err, &message), message)
}

fn store_status(err: &StoreError, message: &str) -> StatusCode {
    match err {
        StoreError::ProductNotFound(_)
        | StoreError::CartNotFound(_)
        | StoreError::CartItemNotFound { .. }
        | StoreError::OrderNotFound(_)
        | StoreError::PromoNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::DuplicateCode(_)
        | StoreError::StockConflict { .. }
        | StoreError::PromoUsageConflict { .. }
        | StoreError::StatusConflict { .. }
        | StoreError::Busy(_) => StatusCode::CONFLICT,
        StoreError::InvalidQuantity | StoreError::InsufficientStock { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        StoreError::Corrupt(_) | StoreError::Database(_) | StoreError::Migration(_) => {
            tracing::error!(error = %message, "storage failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<ProductValidationError> for ApiError {
    fn from(err: ProductValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<PromoValidationError> for ApiError {
    fn from(err: PromoValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
