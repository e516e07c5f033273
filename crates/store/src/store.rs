use async_trait::async_trait;
use common::{CartId, CartOwner, OrderId, ProductId, PromoCodeId, UserId};
use domain::{
    Cart, CartSnapshot, NewProduct, Order, OrderStatus, Product, PromoCode, PromoCodeInput,
    SettlementDraft,
};

use crate::Result;

/// Core trait for storefront persistence backends.
///
/// Implementations must be thread-safe (Send + Sync); many checkouts run
/// concurrently against the same rows. The settlement and status methods
/// carry the concurrency contract: they either commit every effect or none,
/// and they fail with a typed conflict instead of corrupting a counter.
#[async_trait]
pub trait StorefrontStore: Send + Sync {
    // Catalog ----------------------------------------------------------

    /// Adds a product to the catalog.
    async fn create_product(&self, input: NewProduct) -> Result<Product>;

    /// Replaces a product's fields, including restock and activation.
    async fn update_product(&self, id: ProductId, input: NewProduct) -> Result<Product>;

    /// Loads one product.
    async fn product(&self, id: ProductId) -> Result<Product>;

    /// Lists products, optionally restricted to active ones, sorted by
    /// name.
    async fn list_products(&self, only_active: bool) -> Result<Vec<Product>>;

    // Carts ------------------------------------------------------------

    /// Returns the owner's cart, creating an empty one on first access.
    async fn ensure_cart(&self, owner: &CartOwner) -> Result<Cart>;

    /// Reads the cart's lines joined with live product price and stock.
    ///
    /// An empty cart yields an empty snapshot, not an error; whether
    /// emptiness is acceptable is the caller's decision.
    async fn cart_snapshot(&self, cart_id: CartId) -> Result<CartSnapshot>;

    /// Adds `quantity` units of a product to the cart, accumulating onto
    /// an existing line. Fails with `InsufficientStock` if the resulting
    /// line would exceed the product's current stock.
    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot>;

    /// Sets a line's quantity exactly. Fails with `CartItemNotFound` if
    /// the line does not exist, `InsufficientStock` if stock cannot cover
    /// it.
    async fn set_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot>;

    /// Removes a line from the cart.
    async fn remove_cart_item(&self, cart_id: CartId, product_id: ProductId)
    -> Result<CartSnapshot>;

    /// Deletes all lines, keeping the cart entity.
    async fn clear_cart(&self, cart_id: CartId) -> Result<()>;

    // Promo codes ------------------------------------------------------

    /// Creates a promo code. An omitted code gets a generated one; a
    /// duplicate code fails with `DuplicateCode`.
    async fn create_promo(&self, input: PromoCodeInput) -> Result<PromoCode>;

    /// Replaces a promo code's fields, preserving `used_count`. An
    /// omitted code keeps the existing one.
    async fn update_promo(&self, id: PromoCodeId, input: PromoCodeInput) -> Result<PromoCode>;

    /// Deletes a promo code. Orders that redeemed it keep their frozen
    /// discount; their reference goes weak.
    async fn delete_promo(&self, id: PromoCodeId) -> Result<()>;

    /// Loads one promo code by id.
    async fn promo(&self, id: PromoCodeId) -> Result<PromoCode>;

    /// Looks up a promo code by its normalized code text.
    async fn promo_by_code(&self, code: &str) -> Result<Option<PromoCode>>;

    /// Lists all promo codes, newest first.
    async fn list_promos(&self) -> Result<Vec<PromoCode>>;

    // Orders -----------------------------------------------------------

    /// Commits a settlement draft in one atomic unit: insert the order
    /// and its items, decrement stock per line under a stock guard,
    /// increment the promo code's usage under a usage guard, and clear
    /// the cart's lines. Any guard failure rolls back every effect and
    /// surfaces as `StockConflict`, `PromoUsageConflict`, or `Busy`.
    async fn commit_settlement(&self, draft: &SettlementDraft) -> Result<Order>;

    /// Loads one order with its items and promo reference.
    async fn order(&self, id: OrderId) -> Result<Order>;

    /// Lists a customer's orders, newest first, optionally filtered by
    /// status.
    async fn orders_for_user(
        &self,
        user_id: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>>;

    /// Lists orders awaiting fulfillment (pending or processing), oldest
    /// first.
    async fn fulfillment_queue(&self) -> Result<Vec<Order>>;

    /// Moves an order from `from` to `to` as a single compare-and-swap,
    /// optionally attaching a note. Fails with `StatusConflict` if the
    /// order is no longer in `from`.
    async fn transition_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        note: Option<&str>,
    ) -> Result<Order>;
}
