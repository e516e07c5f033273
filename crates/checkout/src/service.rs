//! Checkout service: order placement, promo validation, and status flow.

use chrono::Utc;
use common::{Caller, CartId, OrderId, UserId};
use domain::{Money, Order, OrderStatus, PromoRejection, authorize_transition, plan_settlement};
use serde::Serialize;
use store::{StoreError, StorefrontStore};

use crate::error::{CheckoutError, Result};

/// Outcome of a read-only promo code probe.
#[derive(Debug, Clone, Serialize)]
pub struct PromoQuote {
    /// Whether the code would apply at this subtotal.
    pub valid: bool,

    /// Normalized code text.
    pub code: String,

    /// Discount the code would grant.
    pub discount: Money,

    /// Total after the discount.
    pub total: Money,

    /// Rejection reason when `valid` is false.
    pub reason: Option<String>,
}

/// Service for placing orders and moving them through fulfillment.
///
/// Wraps a storefront store with the checkout policy: planning against a
/// cart snapshot, a single bounded retry when the settlement loses a
/// stock or usage race, and role-gated status transitions.
pub struct CheckoutService<S: StorefrontStore> {
    store: S,
}

impl<S: StorefrontStore> CheckoutService<S> {
    /// Creates a new checkout service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order from the given cart.
    ///
    /// Reads a cart snapshot, plans the settlement, and commits it in one
    /// atomic unit. A commit that loses a stock or usage race is retried
    /// once against fresh state; a second loss surfaces the precise
    /// shortage instead of a bare conflict.
    #[tracing::instrument(skip(self, caller), fields(cart_id = %cart_id))]
    pub async fn place_order(
        &self,
        caller: &Caller,
        cart_id: CartId,
        promo_code: Option<&str>,
    ) -> Result<Order> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let start = std::time::Instant::now();
        let user_id = caller.user.ok_or(CheckoutError::AuthenticationRequired)?;

        let result = match self
            .attempt_settlement(user_id, cart_id, promo_code, false)
            .await
        {
            Err(CheckoutError::Store(err)) if err.is_retryable_conflict() => {
                metrics::counter!("checkout_retries").increment(1);
                tracing::info!(%cart_id, "settlement lost a race, retrying once");
                self.attempt_settlement(user_id, cart_id, promo_code, true)
                    .await
            }
            other => other,
        };

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        match &result {
            Ok(order) => {
                metrics::counter!("checkout_completed").increment(1);
                tracing::info!(order_id = %order.id, total = %order.total, "order placed");
            }
            Err(err) => {
                metrics::counter!("checkout_failed").increment(1);
                tracing::debug!(error = %err, "checkout rejected");
            }
        }
        result
    }

    /// One full plan-and-commit pass over fresh state.
    ///
    /// With `final_attempt` set, a commit conflict is resolved into the
    /// precise caller-facing error instead of a retryable one.
    async fn attempt_settlement(
        &self,
        user_id: UserId,
        cart_id: CartId,
        promo_code: Option<&str>,
        final_attempt: bool,
    ) -> Result<Order> {
        let now = Utc::now();

        // Emptiness, stock precheck, and subtotal come first; the promo
        // code is looked up and evaluated only against a viable cart.
        let snapshot = self.store.cart_snapshot(cart_id).await?;
        let mut draft = plan_settlement(OrderId::new(), user_id, &snapshot, None, now)?;
        if let Some(code) = promo_code {
            let promo = self
                .store
                .promo_by_code(code)
                .await?
                .ok_or(PromoRejection::NotFound)?;
            draft.apply_promo(&promo, now)?;
        }

        match self.store.commit_settlement(&draft).await {
            Ok(order) => Ok(order),
            Err(err) if !final_attempt && err.is_retryable_conflict() => {
                Err(CheckoutError::Store(err))
            }
            Err(StoreError::StockConflict { product_id }) => {
                let requested = draft
                    .items
                    .iter()
                    .find(|item| item.product_id == product_id)
                    .map(|item| item.quantity)
                    .unwrap_or(0);
                let product = self.store.product(product_id).await?;
                Err(CheckoutError::InsufficientStock {
                    product_id,
                    name: product.name,
                    requested,
                    available: product.stock,
                })
            }
            Err(StoreError::PromoUsageConflict { .. }) => {
                Err(CheckoutError::Promo(PromoRejection::Exhausted))
            }
            Err(StoreError::Busy(_)) => Err(CheckoutError::SettlementConflict),
            Err(err) => Err(CheckoutError::Store(err)),
        }
    }

    /// Evaluates a promo code against a subtotal without redeeming it.
    ///
    /// Never touches `used_count`. A known-but-rejected code comes back
    /// as an invalid quote carrying the reason; an unknown code fails
    /// with the not-found rejection.
    #[tracing::instrument(skip(self))]
    pub async fn validate_promo(&self, code: &str, subtotal: Money) -> Result<PromoQuote> {
        let promo = self
            .store
            .promo_by_code(code)
            .await?
            .ok_or(PromoRejection::NotFound)?;

        Ok(match promo.evaluate(subtotal, Utc::now()) {
            Ok(discount) => PromoQuote {
                valid: true,
                code: promo.code,
                discount,
                total: subtotal - discount,
                reason: None,
            },
            Err(rejection) => PromoQuote {
                valid: false,
                code: promo.code,
                discount: Money::zero(),
                total: subtotal,
                reason: Some(rejection.to_string()),
            },
        })
    }

    /// Moves an order to a new status on behalf of the caller.
    ///
    /// Parses the submitted status, checks the caller's role against the
    /// transition table, and applies the change as a compare-and-swap so
    /// a concurrent transition cannot be silently overwritten.
    #[tracing::instrument(skip(self, caller), fields(order_id = %order_id, role = %caller.role))]
    pub async fn update_order_status(
        &self,
        caller: &Caller,
        order_id: OrderId,
        new_status: &str,
        note: Option<&str>,
    ) -> Result<Order> {
        let to: OrderStatus = new_status.parse()?;
        let order = self.store.order(order_id).await?;
        authorize_transition(caller.role, order.status, to)?;

        let updated = self
            .store
            .transition_order_status(order_id, order.status, to, note)
            .await?;
        metrics::counter!("order_status_transitions").increment(1);
        tracing::info!(from = %order.status, to = %updated.status, "order status updated");
        Ok(updated)
    }
}
