use common::{CartId, OrderId, ProductId, PromoCodeId};
use thiserror::Error;

/// Errors that can occur when interacting with a storefront store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No product with the given id exists.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// No cart with the given id exists.
    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    /// The cart holds no line for the given product.
    #[error("Cart {cart_id} has no line for product {product_id}")]
    CartItemNotFound {
        cart_id: CartId,
        product_id: ProductId,
    },

    /// No order with the given id exists.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// No promo code with the given id exists.
    #[error("Promo code not found: {0}")]
    PromoNotFound(PromoCodeId),

    /// A promo code with the same code text already exists.
    #[error("Promo code already exists: {0}")]
    DuplicateCode(String),

    /// A cart line quantity must be at least one.
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    /// A cart mutation asked for more units than are in stock.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The guarded stock decrement found too little stock at commit time.
    /// Another settlement won the race; nothing was persisted.
    #[error("Stock conflict for product {product_id}")]
    StockConflict { product_id: ProductId },

    /// The guarded usage increment found the promo code exhausted or
    /// disabled at commit time. Nothing was persisted.
    #[error("Usage conflict for promo code {promo_id}")]
    PromoUsageConflict { promo_id: PromoCodeId },

    /// A compare-and-swap status update found the order in a different
    /// state than expected.
    #[error("Order {order_id} changed concurrently")]
    StatusConflict { order_id: OrderId },

    /// The database reported contention it could not resolve in time
    /// (lock timeout, serialization failure, deadlock).
    #[error("Storage busy: {0}")]
    Busy(String),

    /// A stored value could not be mapped back into a domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true for conflicts worth retrying once at the checkout
    /// level: the guarded updates and database contention signals.
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::StockConflict { .. }
                | StoreError::PromoUsageConflict { .. }
                | StoreError::Busy(_)
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
