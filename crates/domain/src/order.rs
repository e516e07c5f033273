//! Orders and their lifecycle states.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, PromoCodeId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

/// The state of an order in its fulfillment lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Processing ──► Completed
///    │             │
///    └─────────────┴──► Cancelled
/// ```
///
/// Who may drive which edge is decided in [`crate::status`], not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Placed, awaiting fulfillment.
    #[default]
    Pending,

    /// A picker is assembling the order.
    Processing,

    /// Fulfilled (terminal state).
    Completed,

    /// Abandoned before fulfillment (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if this is a terminal state in the normal lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = InvalidStatusValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(InvalidStatusValue(other.to_string())),
        }
    }
}

/// A status string that names no known state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid order status: {0}")]
pub struct InvalidStatusValue(pub String);

/// One line of an order.
///
/// `price` is a snapshot of the product's unit price at settlement time and
/// is never re-derived from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The product this line refers to.
    pub product_id: ProductId,

    /// Product name, joined in at load time for presentation.
    pub name: String,

    /// Units ordered.
    pub quantity: u32,

    /// Frozen unit price.
    pub price: Money,
}

impl OrderItem {
    /// Returns the line total (frozen price times quantity).
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// A settled order.
///
/// Immutable after creation except for `status` and `note`. `total` and
/// `discount` are frozen at settlement; `total = Σ line totals − discount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    pub id: OrderId,

    /// The customer who placed the order.
    pub user_id: UserId,

    /// Current lifecycle state.
    pub status: OrderStatus,

    /// Amount charged, after discount.
    pub total: Money,

    /// Frozen discount amount, zero when no promo code was used.
    pub discount: Money,

    /// The promo code redeemed, if any. Survives as `None` if the code is
    /// later deleted.
    pub promo_code_id: Option<PromoCodeId>,

    /// The redeemed code's text, joined in at load time.
    pub promo_code: Option<String>,

    /// Free-form picker/admin annotation.
    pub note: Option<String>,

    /// Order lines with frozen prices.
    pub items: Vec<OrderItem>,

    /// When the order was placed.
    pub created_at: DateTime<Utc>,

    /// Last status or note change.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the pre-discount sum of all line totals.
    pub fn subtotal(&self) -> Money {
        self.items
            .iter()
            .fold(Money::zero(), |acc, item| acc + item.line_total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_display_matches_stored_form() {
        assert_eq!(OrderStatus::Pending.to_string(), "pending");
        assert_eq!(OrderStatus::Processing.to_string(), "processing");
        assert_eq!(OrderStatus::Completed.to_string(), "completed");
        assert_eq!(OrderStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_from_str_round_trips() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_from_str_rejects_unknown_value() {
        let err = "shipped".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err, InvalidStatusValue("shipped".to_string()));
    }

    #[test]
    fn test_serde_uses_lowercase() {
        let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    #[test]
    fn test_order_subtotal() {
        let order = Order {
            id: OrderId::new(),
            user_id: UserId::new(),
            status: OrderStatus::Pending,
            total: Money::from_cents(2500),
            discount: Money::from_cents(500),
            promo_code_id: None,
            promo_code: None,
            note: None,
            items: vec![
                OrderItem {
                    product_id: ProductId::new(),
                    name: "Widget".to_string(),
                    quantity: 2,
                    price: Money::from_cents(1000),
                },
                OrderItem {
                    product_id: ProductId::new(),
                    name: "Gadget".to_string(),
                    quantity: 1,
                    price: Money::from_cents(1000),
                },
            ],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(order.subtotal(), Money::from_cents(3000));
        assert_eq!(order.subtotal() - order.discount, order.total);
    }
}
