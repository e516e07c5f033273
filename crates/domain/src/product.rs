//! Catalog products.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

/// A product in the catalog.
///
/// `stock` is the number of units currently available for sale. It is only
/// ever decremented inside a settlement transaction, so a loaded `Product`
/// is a point-in-time snapshot that may already be stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Unique product identifier.
    pub id: ProductId,

    /// Display name.
    pub name: String,

    /// Optional long-form description.
    pub description: Option<String>,

    /// Current unit price.
    pub price: Money,

    /// Units available for sale.
    pub stock: u32,

    /// Whether the product is visible in the catalog.
    pub is_active: bool,

    /// When the product was created.
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Returns true if the product has at least `quantity` units in stock.
    pub fn can_supply(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }
}

/// Upper bound on a product's stock, matching the `INTEGER` column it is
/// stored in.
pub const MAX_STOCK: u32 = i32::MAX as u32;

/// Fields accepted when creating or replacing a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Money,
    pub stock: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewProduct {
    /// Validates the fields before they reach a store.
    pub fn validate(&self) -> Result<(), ProductValidationError> {
        if self.name.trim().is_empty() {
            return Err(ProductValidationError::EmptyName);
        }
        if self.price.is_negative() {
            return Err(ProductValidationError::NegativePrice);
        }
        if self.stock > MAX_STOCK {
            return Err(ProductValidationError::StockTooLarge);
        }
        Ok(())
    }
}

/// Validation failures for product input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProductValidationError {
    /// Name must contain at least one non-whitespace character.
    #[error("Product name must not be empty")]
    EmptyName,

    /// Price must be zero or positive.
    #[error("Product price must not be negative")]
    NegativePrice,

    /// Stock must fit the storage column.
    #[error("Stock cannot exceed {}", MAX_STOCK)]
    StockTooLarge,
}
