use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, CartOwner, OrderId, ProductId, PromoCodeId, SessionId, UserId};
use domain::{
    Cart, CartLine, CartSnapshot, DiscountKind, Money, NewProduct, Order, OrderItem, OrderStatus,
    Product, PromoCode, PromoCodeInput, SettlementDraft, generate_code, normalize_code,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{Result, StoreError, store::StorefrontStore};

const ORDER_COLUMNS: &str = "o.id, o.user_id, o.status, o.total, o.discount, o.promo_code_id, \
     pc.code AS promo_code, o.note, o.created_at, o.updated_at";

/// PostgreSQL-backed storefront store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL storefront store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn to_u32(value: i32, column: &str) -> Result<u32> {
        u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
    }

    /// Maps lock timeouts, serialization failures, and deadlocks to
    /// `StoreError::Busy` so callers can retry them.
    fn map_lock_error(e: sqlx::Error) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = e
            && let Some(code) = db_err.code()
            && matches!(code.as_ref(), "55P03" | "40001" | "40P01")
        {
            tracing::warn!(sqlstate = %code, "settlement hit lock contention");
            return StoreError::Busy(db_err.message().to_string());
        }
        StoreError::Database(e)
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: Money::new(row.try_get("price")?),
            stock: Self::to_u32(row.try_get("stock")?, "stock")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_cart(row: PgRow) -> Result<Cart> {
        let user_id: Option<Uuid> = row.try_get("user_id")?;
        let session_id: Option<String> = row.try_get("session_id")?;
        let owner = match (user_id, session_id) {
            (Some(user), None) => CartOwner::User(UserId::from_uuid(user)),
            (None, Some(session)) => CartOwner::Session(SessionId::new(session)),
            _ => {
                return Err(StoreError::Corrupt(
                    "cart owner must be exactly one of user or session".to_string(),
                ));
            }
        };
        Ok(Cart {
            id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
            owner,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_cart_line(row: PgRow) -> Result<CartLine> {
        Ok(CartLine {
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            name: row.try_get("name")?,
            unit_price: Money::new(row.try_get("price")?),
            available_stock: Self::to_u32(row.try_get("stock")?, "stock")?,
            quantity: Self::to_u32(row.try_get("quantity")?, "quantity")?,
        })
    }

    fn row_to_promo(row: PgRow) -> Result<PromoCode> {
        let kind: String = row.try_get("kind")?;
        Ok(PromoCode {
            id: PromoCodeId::from_uuid(row.try_get::<Uuid, _>("id")?),
            code: row.try_get("code")?,
            kind: kind
                .parse::<DiscountKind>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            value: row.try_get("value")?,
            min_purchase: row
                .try_get::<Option<Decimal>, _>("min_purchase")?
                .map(Money::new),
            usage_limit: match row.try_get::<Option<i32>, _>("usage_limit")? {
                Some(limit) => Some(Self::to_u32(limit, "usage_limit")?),
                None => None,
            },
            used_count: Self::to_u32(row.try_get("used_count")?, "used_count")?,
            expires_at: row.try_get("expires_at")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order_header(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            status: status
                .parse::<OrderStatus>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            total: Money::new(row.try_get("total")?),
            discount: Money::new(row.try_get("discount")?),
            promo_code_id: row
                .try_get::<Option<Uuid>, _>("promo_code_id")?
                .map(PromoCodeId::from_uuid),
            promo_code: row.try_get("promo_code")?,
            note: row.try_get("note")?,
            items: Vec::new(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            name: row.try_get("name")?,
            quantity: Self::to_u32(row.try_get("quantity")?, "quantity")?,
            price: Money::new(row.try_get("price")?),
        })
    }

    async fn attach_items(&self, orders: &mut [Order]) -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
        // Names were snapshotted at settlement, so no join back to
        // products: a later rename must not rewrite order history.
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, name, quantity, price
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY name ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let order_id: Uuid = row.try_get("order_id")?;
            by_order
                .entry(order_id)
                .or_default()
                .push(Self::row_to_order_item(&row)?);
        }
        for order in orders.iter_mut() {
            order.items = by_order.remove(&order.id.as_uuid()).unwrap_or_default();
        }
        Ok(())
    }
}

#[async_trait]
impl StorefrontStore for PostgresStore {
    async fn create_product(&self, input: NewProduct) -> Result<Product> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, stock, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, description, price, stock, is_active, created_at
            "#,
        )
        .bind(ProductId::new().as_uuid())
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price.amount())
        .bind(input.stock as i32)
        .bind(input.is_active)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_product(row)
    }

    async fn update_product(&self, id: ProductId, input: NewProduct) -> Result<Product> {
        let row = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, description = $3, price = $4, stock = $5, is_active = $6
            WHERE id = $1
            RETURNING id, name, description, price, stock, is_active, created_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price.amount())
        .bind(input.stock as i32)
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::ProductNotFound(id))?;

        Self::row_to_product(row)
    }

    async fn product(&self, id: ProductId) -> Result<Product> {
        let row = sqlx::query(
            "SELECT id, name, description, price, stock, is_active, created_at \
             FROM products WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::ProductNotFound(id))?;

        Self::row_to_product(row)
    }

    async fn list_products(&self, only_active: bool) -> Result<Vec<Product>> {
        let sql = if only_active {
            "SELECT id, name, description, price, stock, is_active, created_at \
             FROM products WHERE is_active = TRUE ORDER BY name ASC"
        } else {
            "SELECT id, name, description, price, stock, is_active, created_at \
             FROM products ORDER BY name ASC"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn ensure_cart(&self, owner: &CartOwner) -> Result<Cart> {
        let row = match owner {
            CartOwner::User(user_id) => {
                sqlx::query(
                    r#"
                    INSERT INTO carts (id, user_id)
                    VALUES ($1, $2)
                    ON CONFLICT (user_id) WHERE user_id IS NOT NULL DO NOTHING
                    "#,
                )
                .bind(CartId::new().as_uuid())
                .bind(user_id.as_uuid())
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    "SELECT id, user_id, session_id, created_at FROM carts WHERE user_id = $1",
                )
                .bind(user_id.as_uuid())
                .fetch_one(&self.pool)
                .await?
            }
            CartOwner::Session(session_id) => {
                sqlx::query(
                    r#"
                    INSERT INTO carts (id, session_id)
                    VALUES ($1, $2)
                    ON CONFLICT (session_id) WHERE session_id IS NOT NULL DO NOTHING
                    "#,
                )
                .bind(CartId::new().as_uuid())
                .bind(session_id.as_str())
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    "SELECT id, user_id, session_id, created_at FROM carts WHERE session_id = $1",
                )
                .bind(session_id.as_str())
                .fetch_one(&self.pool)
                .await?
            }
        };
        Self::row_to_cart(row)
    }

    async fn cart_snapshot(&self, cart_id: CartId) -> Result<CartSnapshot> {
        sqlx::query("SELECT id FROM carts WHERE id = $1")
            .bind(cart_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::CartNotFound(cart_id))?;

        let rows = sqlx::query(
            r#"
            SELECT ci.product_id, p.name, p.price, p.stock, ci.quantity
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.created_at ASC, ci.id ASC
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let lines = rows
            .into_iter()
            .map(Self::row_to_cart_line)
            .collect::<Result<Vec<_>>>()?;
        Ok(CartSnapshot { cart_id, lines })
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
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM carts WHERE id = $1")
            .bind(cart_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::CartNotFound(cart_id))?;

        let stock: i32 = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::ProductNotFound(product_id))?;
        let stock = Self::to_u32(stock, "stock")?;

        let existing: Option<i32> = sqlx::query_scalar(
            "SELECT quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2",
        )
        .bind(cart_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        // An accumulated quantity that overflows can never be in stock.
        let new_quantity = match existing {
            Some(existing) => Self::to_u32(existing, "quantity")?
                .checked_add(quantity)
                .ok_or(StoreError::InsufficientStock {
                    product_id,
                    requested: u32::MAX,
                    available: stock,
                })?,
            None => quantity,
        };
        if new_quantity > stock {
            return Err(StoreError::InsufficientStock {
                product_id,
                requested: new_quantity,
                available: stock,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ON CONSTRAINT cart_items_unique_product
            DO UPDATE SET quantity = EXCLUDED.quantity
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(cart_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(new_quantity as i32)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.cart_snapshot(cart_id).await
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
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM carts WHERE id = $1")
            .bind(cart_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::CartNotFound(cart_id))?;

        let stock: i32 = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::ProductNotFound(product_id))?;
        let stock = Self::to_u32(stock, "stock")?;
        if quantity > stock {
            return Err(StoreError::InsufficientStock {
                product_id,
                requested: quantity,
                available: stock,
            });
        }

        let updated =
            sqlx::query("UPDATE cart_items SET quantity = $3 WHERE cart_id = $1 AND product_id = $2")
                .bind(cart_id.as_uuid())
                .bind(product_id.as_uuid())
                .bind(quantity as i32)
                .execute(&mut *tx)
                .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::CartItemNotFound {
                cart_id,
                product_id,
            });
        }

        tx.commit().await?;
        self.cart_snapshot(cart_id).await
    }

    async fn remove_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<CartSnapshot> {
        sqlx::query("SELECT id FROM carts WHERE id = $1")
            .bind(cart_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::CartNotFound(cart_id))?;

        let deleted =
            sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
                .bind(cart_id.as_uuid())
                .bind(product_id.as_uuid())
                .execute(&self.pool)
                .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::CartItemNotFound {
                cart_id,
                product_id,
            });
        }

        self.cart_snapshot(cart_id).await
    }

    async fn clear_cart(&self, cart_id: CartId) -> Result<()> {
        sqlx::query("SELECT id FROM carts WHERE id = $1")
            .bind(cart_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::CartNotFound(cart_id))?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_promo(&self, input: PromoCodeInput) -> Result<PromoCode> {
        let explicit = input.code.is_some();
        let mut code = match &input.code {
            Some(code) => normalize_code(code),
            None => generate_code(),
        };

        // Generated codes retry on collision; explicit codes surface it.
        loop {
            let inserted = sqlx::query(
                r#"
                INSERT INTO promo_codes (id, code, kind, value, min_purchase, usage_limit, expires_at, is_active)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id, code, kind, value, min_purchase, usage_limit, used_count, expires_at, is_active, created_at
                "#,
            )
            .bind(PromoCodeId::new().as_uuid())
            .bind(&code)
            .bind(input.kind.as_str())
            .bind(input.value)
            .bind(input.min_purchase.map(|m| m.amount()))
            .bind(input.usage_limit.map(|limit| limit as i32))
            .bind(input.expires_at)
            .bind(input.is_active)
            .fetch_one(&self.pool)
            .await;

            match inserted {
                Ok(row) => return Self::row_to_promo(row),
                Err(sqlx::Error::Database(db_err))
                    if db_err.constraint() == Some("promo_codes_unique_code") =>
                {
                    if explicit {
                        return Err(StoreError::DuplicateCode(code));
                    }
                    code = generate_code();
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn update_promo(&self, id: PromoCodeId, input: PromoCodeInput) -> Result<PromoCode> {
        let code = input.code.as_deref().map(normalize_code);
        let row = sqlx::query(
            r#"
            UPDATE promo_codes
            SET code = COALESCE($2, code),
                kind = $3,
                value = $4,
                min_purchase = $5,
                usage_limit = $6,
                expires_at = $7,
                is_active = $8,
                updated_at = now()
            WHERE id = $1
            RETURNING id, code, kind, value, min_purchase, usage_limit, used_count, expires_at, is_active, created_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(&code)
        .bind(input.kind.as_str())
        .bind(input.value)
        .bind(input.min_purchase.map(|m| m.amount()))
        .bind(input.usage_limit.map(|limit| limit as i32))
        .bind(input.expires_at)
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("promo_codes_unique_code")
            {
                return StoreError::DuplicateCode(code.clone().unwrap_or_default());
            }
            StoreError::Database(e)
        })?
        .ok_or(StoreError::PromoNotFound(id))?;

        Self::row_to_promo(row)
    }

    async fn delete_promo(&self, id: PromoCodeId) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM promo_codes WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::PromoNotFound(id));
        }
        Ok(())
    }

    async fn promo(&self, id: PromoCodeId) -> Result<PromoCode> {
        let row = sqlx::query(
            "SELECT id, code, kind, value, min_purchase, usage_limit, used_count, expires_at, is_active, created_at \
             FROM promo_codes WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::PromoNotFound(id))?;

        Self::row_to_promo(row)
    }

    async fn promo_by_code(&self, code: &str) -> Result<Option<PromoCode>> {
        let row = sqlx::query(
            "SELECT id, code, kind, value, min_purchase, usage_limit, used_count, expires_at, is_active, created_at \
             FROM promo_codes WHERE code = $1",
        )
        .bind(normalize_code(code))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_promo).transpose()
    }

    async fn list_promos(&self) -> Result<Vec<PromoCode>> {
        let rows = sqlx::query(
            "SELECT id, code, kind, value, min_purchase, usage_limit, used_count, expires_at, is_active, created_at \
             FROM promo_codes ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_promo).collect()
    }

    async fn commit_settlement(&self, draft: &SettlementDraft) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        // Bound the wait on contended stock and promo rows.
        sqlx::query("SET LOCAL lock_timeout = '2s'")
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, total, discount, promo_code_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(draft.order_id.as_uuid())
        .bind(draft.user_id.as_uuid())
        .bind(OrderStatus::Pending.as_str())
        .bind(draft.total.amount())
        .bind(draft.discount.amount())
        .bind(draft.promo.as_ref().map(|p| p.id.as_uuid()))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Self::map_lock_error)?;

        for item in &draft.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, name, quantity, price)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(draft.order_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(&item.name)
            .bind(item.quantity as i32)
            .bind(item.price.amount())
            .execute(&mut *tx)
            .await
            .map_err(Self::map_lock_error)?;

            // Guarded decrement: zero rows means another settlement won
            // the remaining stock, and the transaction rolls back.
            let updated = sqlx::query(
                "UPDATE products SET stock = stock - $2, updated_at = now() \
                 WHERE id = $1 AND stock >= $2",
            )
            .bind(item.product_id.as_uuid())
            .bind(item.quantity as i32)
            .execute(&mut *tx)
            .await
            .map_err(Self::map_lock_error)?;
            if updated.rows_affected() == 0 {
                tracing::debug!(product_id = %item.product_id, "stock guard rejected settlement");
                return Err(StoreError::StockConflict {
                    product_id: item.product_id,
                });
            }
        }

        if let Some(promo_use) = &draft.promo {
            // Guarded increment: the WHERE clause enforces the usage
            // limit no matter how many settlements race.
            let updated = sqlx::query(
                "UPDATE promo_codes SET used_count = used_count + 1, updated_at = now() \
                 WHERE id = $1 AND is_active = TRUE \
                 AND (usage_limit IS NULL OR used_count < usage_limit)",
            )
            .bind(promo_use.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(Self::map_lock_error)?;
            if updated.rows_affected() == 0 {
                tracing::debug!(promo_id = %promo_use.id, "usage guard rejected settlement");
                return Err(StoreError::PromoUsageConflict {
                    promo_id: promo_use.id,
                });
            }
        }

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(draft.cart_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await.map_err(Self::map_lock_error)?;

        self.order(draft.order_id).await
    }

    async fn order(&self, id: OrderId) -> Result<Order> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o \
             LEFT JOIN promo_codes pc ON pc.id = o.promo_code_id \
             WHERE o.id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::OrderNotFound(id))?;

        let mut order = Self::row_to_order_header(row)?;
        self.attach_items(std::slice::from_mut(&mut order)).await?;
        Ok(order)
    }

    async fn orders_for_user(
        &self,
        user_id: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders o \
                     LEFT JOIN promo_codes pc ON pc.id = o.promo_code_id \
                     WHERE o.user_id = $1 AND o.status = $2 \
                     ORDER BY o.created_at DESC"
                ))
                .bind(user_id.as_uuid())
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders o \
                     LEFT JOIN promo_codes pc ON pc.id = o.promo_code_id \
                     WHERE o.user_id = $1 \
                     ORDER BY o.created_at DESC"
                ))
                .bind(user_id.as_uuid())
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut orders = rows
            .into_iter()
            .map(Self::row_to_order_header)
            .collect::<Result<Vec<_>>>()?;
        self.attach_items(&mut orders).await?;
        Ok(orders)
    }

    async fn fulfillment_queue(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o \
             LEFT JOIN promo_codes pc ON pc.id = o.promo_code_id \
             WHERE o.status IN ('pending', 'processing') \
             ORDER BY o.created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut orders = rows
            .into_iter()
            .map(Self::row_to_order_header)
            .collect::<Result<Vec<_>>>()?;
        self.attach_items(&mut orders).await?;
        Ok(orders)
    }

    async fn transition_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        note: Option<&str>,
    ) -> Result<Order> {
        // Single-shot compare-and-swap on the status column.
        let updated = sqlx::query(
            "UPDATE orders SET status = $3, note = COALESCE($4, note), updated_at = now() \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(note)
        .execute(&self.pool)
        .await
        .map_err(Self::map_lock_error)?;

        if updated.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&self.pool)
                .await?;
            return Err(if exists {
                StoreError::StatusConflict { order_id: id }
            } else {
                StoreError::OrderNotFound(id)
            });
        }

        self.order(id).await
    }
}
