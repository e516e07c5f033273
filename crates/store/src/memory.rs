use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, CartOwner, OrderId, ProductId, PromoCodeId, UserId};
use domain::{
    Cart, CartLine, CartSnapshot, NewProduct, Order, OrderItem, OrderStatus, Product, PromoCode,
    PromoCodeInput, SettlementDraft, generate_code, normalize_code,
};
use tokio::sync::RwLock;

use crate::{Result, StoreError, store::StorefrontStore};

#[derive(Default)]
struct State {
    products: HashMap<ProductId, Product>,
    carts: HashMap<CartId, Cart>,
    owners: HashMap<CartOwner, CartId>,
    // Lines keep insertion order per cart.
    cart_items: HashMap<CartId, Vec<(ProductId, u32)>>,
    promos: HashMap<PromoCodeId, PromoCode>,
    orders: HashMap<OrderId, Order>,
}

impl State {
    fn snapshot_of(&self, cart_id: CartId) -> Result<CartSnapshot> {
        if !self.carts.contains_key(&cart_id) {
            return Err(StoreError::CartNotFound(cart_id));
        }
        let lines = self
            .cart_items
            .get(&cart_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|&(product_id, quantity)| {
                let product = self
                    .products
                    .get(&product_id)
                    .ok_or_else(|| StoreError::Corrupt(format!("cart line references missing product {product_id}")))?;
                Ok(CartLine {
                    product_id,
                    name: product.name.clone(),
                    unit_price: product.price,
                    available_stock: product.stock,
                    quantity,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CartSnapshot { cart_id, lines })
    }

    fn code_taken(&self, code: &str, except: Option<PromoCodeId>) -> bool {
        self.promos
            .values()
            .any(|p| p.code == code && Some(p.id) != except)
    }

    // Re-resolves the promo code text so deleted codes read back as None,
    // the same way the SQL backend's LEFT JOIN behaves.
    fn joined(&self, order: &Order) -> Order {
        let mut order = order.clone();
        order.promo_code = order
            .promo_code_id
            .and_then(|id| self.promos.get(&id))
            .map(|p| p.code.clone());
        order
    }
}

/// In-memory storefront store.
///
/// Backs tests and single-process demo runs with the same interface and
/// conflict semantics as the PostgreSQL implementation. All settlement
/// guards are checked and applied under one write lock, so a commit is
/// atomic with respect to every other operation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of persisted orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl StorefrontStore for InMemoryStore {
    async fn create_product(&self, input: NewProduct) -> Result<Product> {
        let product = Product {
            id: ProductId::new(),
            name: input.name,
            description: input.description,
            price: input.price,
            stock: input.stock,
            is_active: input.is_active,
            created_at: Utc::now(),
        };
        let mut state = self.state.write().await;
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: ProductId, input: NewProduct) -> Result<Product> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductNotFound(id))?;
        product.name = input.name;
        product.description = input.description;
        product.price = input.price;
        product.stock = input.stock;
        product.is_active = input.is_active;
        Ok(product.clone())
    }

    async fn product(&self, id: ProductId) -> Result<Product> {
        let state = self.state.read().await;
        state
            .products
            .get(&id)
            .cloned()
            .ok_or(StoreError::ProductNotFound(id))
    }

    async fn list_products(&self, only_active: bool) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<_> = state
            .products
            .values()
            .filter(|p| !only_active || p.is_active)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn ensure_cart(&self, owner: &CartOwner) -> Result<Cart> {
        let mut state = self.state.write().await;
        if let Some(id) = state.owners.get(owner)
            && let Some(cart) = state.carts.get(id)
        {
            return Ok(cart.clone());
        }
        let cart = Cart {
            id: CartId::new(),
            owner: owner.clone(),
            created_at: Utc::now(),
        };
        state.owners.insert(owner.clone(), cart.id);
        state.carts.insert(cart.id, cart.clone());
        state.cart_items.insert(cart.id, Vec::new());
        Ok(cart)
    }

    async fn cart_snapshot(&self, cart_id: CartId) -> Result<CartSnapshot> {
        self.state.read().await.snapshot_of(cart_id)
    }

    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot> {
        if quantity == 0 {
            return Err(StoreError::InvalidQuantity);
        }
        let mut state = self.state.write().await;
        if !state.carts.contains_key(&cart_id) {
            return Err(StoreError::CartNotFound(cart_id));
        }
        let stock = state
            .products
            .get(&product_id)
            .ok_or(StoreError::ProductNotFound(product_id))?
            .stock;

        let lines = state.cart_items.entry(cart_id).or_default();
        // An accumulated quantity that overflows can never be in stock.
        let new_quantity = match lines.iter().find(|(id, _)| *id == product_id) {
            Some(&(_, existing)) => {
                existing
                    .checked_add(quantity)
                    .ok_or(StoreError::InsufficientStock {
                        product_id,
                        requested: u32::MAX,
                        available: stock,
                    })?
            }
            None => quantity,
        };
        if new_quantity > stock {
            return Err(StoreError::InsufficientStock {
                product_id,
                requested: new_quantity,
                available: stock,
            });
        }
        match lines.iter_mut().find(|(id, _)| *id == product_id) {
            Some(line) => line.1 = new_quantity,
            None => lines.push((product_id, quantity)),
        }
        state.snapshot_of(cart_id)
    }

    async fn set_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot> {
        if quantity == 0 {
            return Err(StoreError::InvalidQuantity);
        }
        let mut state = self.state.write().await;
        if !state.carts.contains_key(&cart_id) {
            return Err(StoreError::CartNotFound(cart_id));
        }
        let stock = state
            .products
            .get(&product_id)
            .ok_or(StoreError::ProductNotFound(product_id))?
            .stock;
        if quantity > stock {
            return Err(StoreError::InsufficientStock {
                product_id,
                requested: quantity,
                available: stock,
            });
        }
        let lines = state.cart_items.entry(cart_id).or_default();
        match lines.iter_mut().find(|(id, _)| *id == product_id) {
            Some(line) => line.1 = quantity,
            None => {
                return Err(StoreError::CartItemNotFound {
                    cart_id,
                    product_id,
                });
            }
        }
        state.snapshot_of(cart_id)
    }

    async fn remove_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<CartSnapshot> {
        let mut state = self.state.write().await;
        if !state.carts.contains_key(&cart_id) {
            return Err(StoreError::CartNotFound(cart_id));
        }
        let lines = state.cart_items.entry(cart_id).or_default();
        let before = lines.len();
        lines.retain(|(id, _)| *id != product_id);
        if lines.len() == before {
            return Err(StoreError::CartItemNotFound {
                cart_id,
                product_id,
            });
        }
        state.snapshot_of(cart_id)
    }

    async fn clear_cart(&self, cart_id: CartId) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.carts.contains_key(&cart_id) {
            return Err(StoreError::CartNotFound(cart_id));
        }
        state.cart_items.entry(cart_id).or_default().clear();
        Ok(())
    }

    async fn create_promo(&self, input: PromoCodeInput) -> Result<PromoCode> {
        let mut state = self.state.write().await;
        let code = match input.code {
            Some(code) => {
                let code = normalize_code(&code);
                if state.code_taken(&code, None) {
                    return Err(StoreError::DuplicateCode(code));
                }
                code
            }
            None => loop {
                let candidate = generate_code();
                if !state.code_taken(&candidate, None) {
                    break candidate;
                }
            },
        };
        let promo = PromoCode {
            id: PromoCodeId::new(),
            code,
            kind: input.kind,
            value: input.value,
            min_purchase: input.min_purchase,
            usage_limit: input.usage_limit,
            used_count: 0,
            expires_at: input.expires_at,
            is_active: input.is_active,
            created_at: Utc::now(),
        };
        state.promos.insert(promo.id, promo.clone());
        Ok(promo)
    }

    async fn update_promo(&self, id: PromoCodeId, input: PromoCodeInput) -> Result<PromoCode> {
        let mut state = self.state.write().await;
        if !state.promos.contains_key(&id) {
            return Err(StoreError::PromoNotFound(id));
        }
        let code = match input.code {
            Some(code) => {
                let code = normalize_code(&code);
                if state.code_taken(&code, Some(id)) {
                    return Err(StoreError::DuplicateCode(code));
                }
                Some(code)
            }
            None => None,
        };
        let promo = state
            .promos
            .get_mut(&id)
            .ok_or(StoreError::PromoNotFound(id))?;
        if let Some(code) = code {
            promo.code = code;
        }
        promo.kind = input.kind;
        promo.value = input.value;
        promo.min_purchase = input.min_purchase;
        promo.usage_limit = input.usage_limit;
        promo.expires_at = input.expires_at;
        promo.is_active = input.is_active;
        Ok(promo.clone())
    }

    async fn delete_promo(&self, id: PromoCodeId) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .promos
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::PromoNotFound(id))
    }

    async fn promo(&self, id: PromoCodeId) -> Result<PromoCode> {
        let state = self.state.read().await;
        state
            .promos
            .get(&id)
            .cloned()
            .ok_or(StoreError::PromoNotFound(id))
    }

    async fn promo_by_code(&self, code: &str) -> Result<Option<PromoCode>> {
        let normalized = normalize_code(code);
        let state = self.state.read().await;
        Ok(state
            .promos
            .values()
            .find(|p| p.code == normalized)
            .cloned())
    }

    async fn list_promos(&self) -> Result<Vec<PromoCode>> {
        let state = self.state.read().await;
        let mut promos: Vec<_> = state.promos.values().cloned().collect();
        promos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(promos)
    }

    async fn commit_settlement(&self, draft: &SettlementDraft) -> Result<Order> {
        let mut state = self.state.write().await;

        if !state.carts.contains_key(&draft.cart_id) {
            return Err(StoreError::CartNotFound(draft.cart_id));
        }

        // Validate every guard before touching anything, so a failed
        // commit leaves no partial effects.
        for item in &draft.items {
            let product = state
                .products
                .get(&item.product_id)
                .ok_or(StoreError::ProductNotFound(item.product_id))?;
            if product.stock < item.quantity {
                return Err(StoreError::StockConflict {
                    product_id: item.product_id,
                });
            }
        }
        if let Some(promo_use) = &draft.promo {
            let promo = state
                .promos
                .get(&promo_use.id)
                .ok_or(StoreError::PromoUsageConflict { promo_id: promo_use.id })?;
            if !promo.is_active || promo.is_exhausted() {
                return Err(StoreError::PromoUsageConflict { promo_id: promo_use.id });
            }
        }

        for item in &draft.items {
            if let Some(product) = state.products.get_mut(&item.product_id) {
                product.stock -= item.quantity;
            }
        }
        if let Some(promo_use) = &draft.promo
            && let Some(promo) = state.promos.get_mut(&promo_use.id)
        {
            promo.used_count += 1;
        }
        state.cart_items.entry(draft.cart_id).or_default().clear();

        let now = Utc::now();
        let order = Order {
            id: draft.order_id,
            user_id: draft.user_id,
            status: OrderStatus::Pending,
            total: draft.total,
            discount: draft.discount,
            promo_code_id: draft.promo.as_ref().map(|p| p.id),
            promo_code: draft.promo.as_ref().map(|p| p.code.clone()),
            note: None,
            items: draft
                .items
                .iter()
                .map(|item| OrderItem {
                    product_id: item.product_id,
                    name: item.name.clone(),
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn order(&self, id: OrderId) -> Result<Order> {
        let state = self.state.read().await;
        state
            .orders
            .get(&id)
            .map(|order| state.joined(order))
            .ok_or(StoreError::OrderNotFound(id))
    }

    async fn orders_for_user(
        &self,
        user_id: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id && status.is_none_or(|s| o.status == s))
            .map(|o| state.joined(o))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn fulfillment_queue(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| matches!(o.status, OrderStatus::Pending | OrderStatus::Processing))
            .map(|o| state.joined(o))
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn transition_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        note: Option<&str>,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(StoreError::OrderNotFound(id))?;
        if order.status != from {
            return Err(StoreError::StatusConflict { order_id: id });
        }
        order.status = to;
        if let Some(note) = note {
            order.note = Some(note.to_string());
        }
        order.updated_at = Utc::now();
        let order = order.clone();
        Ok(state.joined(&order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{DiscountKind, Money, plan_settlement};
    use rust_decimal::Decimal;

    fn widget(stock: u32) -> NewProduct {
        NewProduct {
            name: "Widget".to_string(),
            description: None,
            price: Money::from_cents(1000),
            stock,
            is_active: true,
        }
    }

    fn percent_off(code: &str, value: i64, usage_limit: Option<u32>) -> PromoCodeInput {
        PromoCodeInput {
            code: Some(code.to_string()),
            kind: DiscountKind::Percentage,
            value: Decimal::from(value),
            min_purchase: None,
            usage_limit,
            expires_at: None,
            is_active: true,
        }
    }

    async fn user_cart(store: &InMemoryStore) -> Cart {
        store
            .ensure_cart(&CartOwner::User(UserId::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn update_product_restocks_and_deactivates() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(2)).await.unwrap();

        let updated = store
            .update_product(
                product.id,
                NewProduct {
                    stock: 50,
                    is_active: false,
                    ..widget(2)
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.id, product.id);
        assert_eq!(updated.stock, 50);
        assert!(!updated.is_active);
        assert_eq!(updated.created_at, product.created_at);

        let err = store
            .update_product(ProductId::new(), widget(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn ensure_cart_is_lazy_and_idempotent() {
        let store = InMemoryStore::new();
        let owner = CartOwner::User(UserId::new());

        let first = store.ensure_cart(&owner).await.unwrap();
        let second = store.ensure_cart(&owner).await.unwrap();
        assert_eq!(first.id, second.id);

        let other = store
            .ensure_cart(&CartOwner::Session("sess-1".into()))
            .await
            .unwrap();
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn add_item_accumulates_quantity() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(10)).await.unwrap();
        let cart = user_cart(&store).await;

        store.add_cart_item(cart.id, product.id, 2).await.unwrap();
        let snapshot = store.add_cart_item(cart.id, product.id, 3).await.unwrap();

        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.lines[0].quantity, 5);
        assert_eq!(snapshot.subtotal(), Money::from_cents(5000));
    }

    #[tokio::test]
    async fn add_item_rejects_insufficient_stock() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(4)).await.unwrap();
        let cart = user_cart(&store).await;

        store.add_cart_item(cart.id, product.id, 3).await.unwrap();
        let err = store.add_cart_item(cart.id, product.id, 2).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock {
                requested: 5,
                available: 4,
                ..
            }
        ));

        // The failed add left the line untouched.
        let snapshot = store.cart_snapshot(cart.id).await.unwrap();
        assert_eq!(snapshot.lines[0].quantity, 3);
    }

    #[tokio::test]
    async fn add_item_rejects_quantity_overflow() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(10)).await.unwrap();
        let cart = user_cart(&store).await;

        store.add_cart_item(cart.id, product.id, 1).await.unwrap();
        let err = store
            .add_cart_item(cart.id, product.id, u32::MAX)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock { available: 10, .. }
        ));

        let snapshot = store.cart_snapshot(cart.id).await.unwrap();
        assert_eq!(snapshot.lines[0].quantity, 1);
    }

    #[tokio::test]
    async fn add_item_rejects_zero_quantity() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(4)).await.unwrap();
        let cart = user_cart(&store).await;

        let err = store.add_cart_item(cart.id, product.id, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuantity));
    }

    #[tokio::test]
    async fn set_item_replaces_quantity() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(10)).await.unwrap();
        let cart = user_cart(&store).await;

        store.add_cart_item(cart.id, product.id, 2).await.unwrap();
        let snapshot = store.set_cart_item(cart.id, product.id, 7).await.unwrap();
        assert_eq!(snapshot.lines[0].quantity, 7);

        let err = store.set_cart_item(cart.id, product.id, 11).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { .. }));
    }

    #[tokio::test]
    async fn set_item_requires_existing_line() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(10)).await.unwrap();
        let cart = user_cart(&store).await;

        let err = store.set_cart_item(cart.id, product.id, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::CartItemNotFound { .. }));
    }

    #[tokio::test]
    async fn remove_item_and_clear_cart() {
        let store = InMemoryStore::new();
        let a = store.create_product(widget(10)).await.unwrap();
        let b = store
            .create_product(NewProduct {
                name: "Gadget".to_string(),
                ..widget(10)
            })
            .await
            .unwrap();
        let cart = user_cart(&store).await;

        store.add_cart_item(cart.id, a.id, 1).await.unwrap();
        store.add_cart_item(cart.id, b.id, 2).await.unwrap();

        let snapshot = store.remove_cart_item(cart.id, a.id).await.unwrap();
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.lines[0].product_id, b.id);

        store.clear_cart(cart.id).await.unwrap();
        let snapshot = store.cart_snapshot(cart.id).await.unwrap();
        assert!(snapshot.is_empty());

        let err = store.remove_cart_item(cart.id, a.id).await.unwrap_err();
        assert!(matches!(err, StoreError::CartItemNotFound { .. }));
    }

    #[tokio::test]
    async fn create_promo_generates_code_when_omitted() {
        let store = InMemoryStore::new();
        let mut input = percent_off("IGNORED", 10, None);
        input.code = None;

        let promo = store.create_promo(input).await.unwrap();
        assert_eq!(promo.code.len(), 8);
        assert_eq!(promo.code, promo.code.to_uppercase());
        assert_eq!(promo.used_count, 0);
    }

    #[tokio::test]
    async fn create_promo_rejects_duplicate_code_case_insensitively() {
        let store = InMemoryStore::new();
        store.create_promo(percent_off("SAVE10", 10, None)).await.unwrap();

        let err = store
            .create_promo(percent_off("save10", 20, None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCode(code) if code == "SAVE10"));
    }

    #[tokio::test]
    async fn update_promo_preserves_used_count() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(10)).await.unwrap();
        let cart = user_cart(&store).await;
        let promo = store.create_promo(percent_off("SAVE10", 10, Some(5))).await.unwrap();

        store.add_cart_item(cart.id, product.id, 1).await.unwrap();
        let snapshot = store.cart_snapshot(cart.id).await.unwrap();
        let draft = plan_settlement(
            OrderId::new(),
            UserId::new(),
            &snapshot,
            Some(&promo),
            Utc::now(),
        )
        .unwrap();
        store.commit_settlement(&draft).await.unwrap();

        let updated = store
            .update_promo(promo.id, percent_off("SAVE15", 15, Some(5)))
            .await
            .unwrap();

        assert_eq!(updated.code, "SAVE15");
        assert_eq!(updated.value, Decimal::from(15));
        assert_eq!(updated.used_count, 1);
    }

    #[tokio::test]
    async fn deleted_promo_reads_back_as_weak_reference() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(10)).await.unwrap();
        let cart = user_cart(&store).await;
        let promo = store.create_promo(percent_off("SAVE10", 10, None)).await.unwrap();
        let user_id = UserId::new();

        store.add_cart_item(cart.id, product.id, 1).await.unwrap();
        let snapshot = store.cart_snapshot(cart.id).await.unwrap();
        let draft = plan_settlement(OrderId::new(), user_id, &snapshot, Some(&promo), Utc::now())
            .unwrap();
        let order = store.commit_settlement(&draft).await.unwrap();
        assert_eq!(order.promo_code.as_deref(), Some("SAVE10"));

        store.delete_promo(promo.id).await.unwrap();

        let reloaded = store.order(order.id).await.unwrap();
        assert_eq!(reloaded.promo_code_id, Some(promo.id));
        assert_eq!(reloaded.promo_code, None);
        assert_eq!(reloaded.discount, Money::from_cents(100));
    }

    #[tokio::test]
    async fn commit_settlement_persists_everything() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(10)).await.unwrap();
        let cart = user_cart(&store).await;
        let promo = store.create_promo(percent_off("SAVE10", 10, Some(3))).await.unwrap();
        let user_id = UserId::new();

        store.add_cart_item(cart.id, product.id, 4).await.unwrap();
        let snapshot = store.cart_snapshot(cart.id).await.unwrap();
        let draft = plan_settlement(OrderId::new(), user_id, &snapshot, Some(&promo), Utc::now())
            .unwrap();

        let order = store.commit_settlement(&draft).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, Money::from_cents(3600));
        assert_eq!(order.discount, Money::from_cents(400));
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].price, Money::from_cents(1000));

        assert_eq!(store.product(product.id).await.unwrap().stock, 6);
        assert_eq!(store.promo(promo.id).await.unwrap().used_count, 1);
        assert!(store.cart_snapshot(cart.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn renaming_a_product_leaves_order_lines_frozen() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(10)).await.unwrap();
        let cart = user_cart(&store).await;
        let user_id = UserId::new();

        store.add_cart_item(cart.id, product.id, 1).await.unwrap();
        let snapshot = store.cart_snapshot(cart.id).await.unwrap();
        let draft =
            plan_settlement(OrderId::new(), user_id, &snapshot, None, Utc::now()).unwrap();
        let order = store.commit_settlement(&draft).await.unwrap();

        store
            .update_product(
                product.id,
                NewProduct {
                    name: "Widget Mk II".to_string(),
                    ..widget(10)
                },
            )
            .await
            .unwrap();

        let reloaded = store.order(order.id).await.unwrap();
        assert_eq!(reloaded.items[0].name, "Widget");
    }

    #[tokio::test]
    async fn stock_conflict_rolls_back_every_effect() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(5)).await.unwrap();
        let cart = user_cart(&store).await;
        let promo = store.create_promo(percent_off("SAVE10", 10, Some(3))).await.unwrap();
        let user_id = UserId::new();

        store.add_cart_item(cart.id, product.id, 5).await.unwrap();
        let snapshot = store.cart_snapshot(cart.id).await.unwrap();
        let draft = plan_settlement(OrderId::new(), user_id, &snapshot, Some(&promo), Utc::now())
            .unwrap();

        // Another checkout drains the stock between snapshot and commit.
        let rival_cart = user_cart(&store).await;
        store.add_cart_item(rival_cart.id, product.id, 5).await.unwrap();
        let rival_snapshot = store.cart_snapshot(rival_cart.id).await.unwrap();
        let rival_draft = plan_settlement(
            OrderId::new(),
            UserId::new(),
            &rival_snapshot,
            None,
            Utc::now(),
        )
        .unwrap();
        store.commit_settlement(&rival_draft).await.unwrap();

        let err = store.commit_settlement(&draft).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::StockConflict { product_id } if product_id == product.id
        ));

        // The losing checkout changed nothing.
        assert_eq!(store.product(product.id).await.unwrap().stock, 0);
        assert_eq!(store.promo(promo.id).await.unwrap().used_count, 0);
        assert_eq!(store.cart_snapshot(cart.id).await.unwrap().lines.len(), 1);
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn promo_conflict_rolls_back_every_effect() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(10)).await.unwrap();
        let promo = store.create_promo(percent_off("LAST1", 10, Some(1))).await.unwrap();

        // First redemption takes the last use.
        let winner_cart = user_cart(&store).await;
        store.add_cart_item(winner_cart.id, product.id, 1).await.unwrap();
        let winner_snapshot = store.cart_snapshot(winner_cart.id).await.unwrap();
        let winner_draft = plan_settlement(
            OrderId::new(),
            UserId::new(),
            &winner_snapshot,
            Some(&promo),
            Utc::now(),
        )
        .unwrap();
        store.commit_settlement(&winner_draft).await.unwrap();

        // The second draft was planned against the stale promo row.
        let cart = user_cart(&store).await;
        store.add_cart_item(cart.id, product.id, 1).await.unwrap();
        let snapshot = store.cart_snapshot(cart.id).await.unwrap();
        let draft = plan_settlement(
            OrderId::new(),
            UserId::new(),
            &snapshot,
            Some(&promo),
            Utc::now(),
        )
        .unwrap();

        let err = store.commit_settlement(&draft).await.unwrap_err();
        assert!(matches!(err, StoreError::PromoUsageConflict { .. }));

        assert_eq!(store.promo(promo.id).await.unwrap().used_count, 1);
        assert_eq!(store.product(product.id).await.unwrap().stock, 9);
        assert_eq!(store.cart_snapshot(cart.id).await.unwrap().lines.len(), 1);
    }

    #[tokio::test]
    async fn transition_is_a_compare_and_swap() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(10)).await.unwrap();
        let cart = user_cart(&store).await;
        let user_id = UserId::new();

        store.add_cart_item(cart.id, product.id, 1).await.unwrap();
        let snapshot = store.cart_snapshot(cart.id).await.unwrap();
        let draft =
            plan_settlement(OrderId::new(), user_id, &snapshot, None, Utc::now()).unwrap();
        let order = store.commit_settlement(&draft).await.unwrap();

        let updated = store
            .transition_order_status(
                order.id,
                OrderStatus::Pending,
                OrderStatus::Processing,
                Some("picking"),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Processing);
        assert_eq!(updated.note.as_deref(), Some("picking"));

        // A stale expectation loses.
        let err = store
            .transition_order_status(order.id, OrderStatus::Pending, OrderStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StatusConflict { .. }));

        let err = store
            .transition_order_status(
                OrderId::new(),
                OrderStatus::Pending,
                OrderStatus::Processing,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn orders_for_user_filters_and_sorts_newest_first() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(100)).await.unwrap();
        let user_id = UserId::new();
        let cart = store
            .ensure_cart(&CartOwner::User(user_id))
            .await
            .unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            store.add_cart_item(cart.id, product.id, 1).await.unwrap();
            let snapshot = store.cart_snapshot(cart.id).await.unwrap();
            let draft =
                plan_settlement(OrderId::new(), user_id, &snapshot, None, Utc::now()).unwrap();
            ids.push(store.commit_settlement(&draft).await.unwrap().id);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        store
            .transition_order_status(ids[0], OrderStatus::Pending, OrderStatus::Completed, None)
            .await
            .unwrap();

        let all = store.orders_for_user(user_id, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, ids[2]);
        assert_eq!(all[2].id, ids[0]);

        let pending = store
            .orders_for_user(user_id, Some(OrderStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);

        let other = store.orders_for_user(UserId::new(), None).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn fulfillment_queue_is_oldest_first_and_skips_terminal_orders() {
        let store = InMemoryStore::new();
        let product = store.create_product(widget(100)).await.unwrap();
        let user_id = UserId::new();
        let cart = store
            .ensure_cart(&CartOwner::User(user_id))
            .await
            .unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            store.add_cart_item(cart.id, product.id, 1).await.unwrap();
            let snapshot = store.cart_snapshot(cart.id).await.unwrap();
            let draft =
                plan_settlement(OrderId::new(), user_id, &snapshot, None, Utc::now()).unwrap();
            ids.push(store.commit_settlement(&draft).await.unwrap().id);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        store
            .transition_order_status(ids[1], OrderStatus::Pending, OrderStatus::Cancelled, None)
            .await
            .unwrap();
        store
            .transition_order_status(ids[2], OrderStatus::Pending, OrderStatus::Processing, None)
            .await
            .unwrap();

        let queue = store.fulfillment_queue().await.unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].id, ids[0]);
        assert_eq!(queue[1].id, ids[2]);
    }
}
