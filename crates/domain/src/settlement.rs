//! Settlement planning: turning a cart snapshot into a committable draft.
//!
//! Planning is pure and side-effect free. It walks the checkout checks in
//! their contractual order (empty cart, stock, promo, totals) and produces a
//! [`SettlementDraft`] that a store commits in one transaction. The draft's
//! stock figures come from the snapshot, so the store must re-guard stock
//! and promo usage at commit time; the plan only fails fast on what is
//! already visibly impossible.

use chrono::{DateTime, Utc};
use common::{CartId, OrderId, ProductId, PromoCodeId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::CartSnapshot;
use crate::money::Money;
use crate::promo::{PromoCode, PromoRejection};

/// One frozen order line ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    /// Unit price frozen from the snapshot.
    pub price: Money,
}

/// A promo redemption bound into a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoUse {
    pub id: PromoCodeId,
    pub code: String,
    pub discount: Money,
}

/// Everything a settlement commits atomically: the order row, its items,
/// the stock decrements, the optional usage increment, and the cart clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementDraft {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub cart_id: CartId,
    pub items: Vec<DraftItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    pub promo: Option<PromoUse>,
}

impl SettlementDraft {
    /// Binds a promo code into the draft, replacing any previous one.
    ///
    /// Evaluates the code against the draft's subtotal; a rejection
    /// leaves the draft unchanged.
    pub fn apply_promo(
        &mut self,
        promo: &PromoCode,
        now: DateTime<Utc>,
    ) -> Result<(), PromoRejection> {
        let discount = promo.evaluate(self.subtotal, now)?;
        self.discount = discount;
        // The evaluator caps the discount at the subtotal, so this never
        // goes negative.
        self.total = self.subtotal - discount;
        self.promo = Some(PromoUse {
            id: promo.id,
            code: promo.code.clone(),
            discount,
        });
        Ok(())
    }
}

/// Why a settlement cannot even be attempted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettlementPlanError {
    /// The cart holds no lines.
    #[error("Cart is empty")]
    CartEmpty,

    /// A line wants more units than the snapshot shows in stock.
    #[error("Insufficient stock for {name}")]
    InsufficientStock {
        product_id: ProductId,
        name: String,
        requested: u32,
        available: u32,
    },

    /// The supplied promo code was rejected.
    #[error(transparent)]
    Promo(#[from] PromoRejection),
}

/// Plans a settlement from a cart snapshot.
///
/// Checks run in contract order and the first failure wins: an empty cart
/// beats an invalid promo code, and a stock shortfall beats it too. A
/// rejected promo code aborts the whole plan rather than degrading to an
/// undiscounted order.
pub fn plan_settlement(
    order_id: OrderId,
    user_id: UserId,
    snapshot: &CartSnapshot,
    promo: Option<&PromoCode>,
    now: DateTime<Utc>,
) -> Result<SettlementDraft, SettlementPlanError> {
    if snapshot.is_empty() {
        return Err(SettlementPlanError::CartEmpty);
    }

    for line in &snapshot.lines {
        if line.quantity > line.available_stock {
            return Err(SettlementPlanError::InsufficientStock {
                product_id: line.product_id,
                name: line.name.clone(),
                requested: line.quantity,
                available: line.available_stock,
            });
        }
    }

    let subtotal = snapshot.subtotal();

    let items = snapshot
        .lines
        .iter()
        .map(|line| DraftItem {
            product_id: line.product_id,
            name: line.name.clone(),
            quantity: line.quantity,
            price: line.unit_price,
        })
        .collect();

    let mut draft = SettlementDraft {
        order_id,
        user_id,
        cart_id: snapshot.cart_id,
        items,
        subtotal,
        discount: Money::zero(),
        total: subtotal,
        promo: None,
    };
    if let Some(promo) = promo {
        draft.apply_promo(promo, now)?;
    }
    Ok(draft)
}
