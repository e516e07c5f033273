//! Cart snapshots.
//!
//! A cart stores only product references and quantities; prices and stock
//! levels are joined in from the catalog at read time. The snapshot taken at
//! checkout is the sole input to settlement planning, so every decision in a
//! single `PlaceOrder` call sees one consistent view of the cart.

use chrono::{DateTime, Utc};
use common::{CartId, CartOwner, ProductId};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// A cart record. Owned by exactly one user or one anonymous session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner: CartOwner,
    pub created_at: DateTime<Utc>,
}

/// One cart line joined with the product's current price and stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// The product this line refers to.
    pub product_id: ProductId,

    /// Product name at snapshot time.
    pub name: String,

    /// Unit price at snapshot time.
    pub unit_price: Money,

    /// Units in stock at snapshot time.
    pub available_stock: u32,

    /// Units requested.
    pub quantity: u32,
}

impl CartLine {
    /// Returns the line total (unit price times quantity).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// A point-in-time view of a cart's lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub cart_id: CartId,
    pub lines: Vec<CartLine>,
}

impl CartSnapshot {
    /// Returns true if the cart holds no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the sum of all line totals.
    pub fn subtotal(&self) -> Money {
        self.lines
            .iter()
            .fold(Money::zero(), |acc, line| acc + line.line_total())
    }
}
