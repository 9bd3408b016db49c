//! # Order Repository
//!
//! Orders and order items. Inserts and status updates are connection-level
//! functions so the checkout and status services can run them inside their
//! own transaction.
//!
//! ## Snapshot Columns
//! ```text
//! order_items.price_at_purchase_cents    ← variant price at checkout
//! order_items.product_name_snapshot      ← product name at checkout
//! order_items.variant_options_snapshot   ← variant options at checkout
//! orders.shipping_address_snapshot       ← resolved address at checkout
//! ```
//! Nothing in this module writes those columns after insert.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::catalog::parse_json;
use crate::error::{DbError, DbResult};
use souq_core::{
    FulfillmentStatus, Order, OrderItem, OrderItemStatus, OrderTotals, PaymentMethod,
    PaymentStatus,
};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    store_id: String,
    user_id: String,
    subtotal_cents: i64,
    discount_cents: i64,
    delivery_fee_cents: i64,
    grand_total_cents: i64,
    currency: String,
    shipping_address_snapshot: String,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    fulfillment_status: FulfillmentStatus,
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DbError;

    fn try_from(row: OrderRow) -> DbResult<Self> {
        let shipping_address_snapshot = parse_json("order", &row.id, &row.shipping_address_snapshot)?;
        Ok(Order {
            id: row.id,
            store_id: row.store_id,
            user_id: row.user_id,
            subtotal_cents: row.subtotal_cents,
            discount_cents: row.discount_cents,
            delivery_fee_cents: row.delivery_fee_cents,
            grand_total_cents: row.grand_total_cents,
            currency: row.currency,
            shipping_address_snapshot,
            payment_method: row.payment_method,
            payment_status: row.payment_status,
            fulfillment_status: row.fulfillment_status,
            note: row.note,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: String,
    order_id: String,
    variant_id: Option<String>,
    product_id: String,
    quantity: i64,
    price_at_purchase_cents: i64,
    product_name_snapshot: String,
    variant_options_snapshot: String,
    status: OrderItemStatus,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = DbError;

    fn try_from(row: OrderItemRow) -> DbResult<Self> {
        let variant_options_snapshot =
            parse_json("order_item", &row.id, &row.variant_options_snapshot)?;
        Ok(OrderItem {
            id: row.id,
            order_id: row.order_id,
            variant_id: row.variant_id,
            product_id: row.product_id,
            quantity: row.quantity,
            price_at_purchase_cents: row.price_at_purchase_cents,
            product_name_snapshot: row.product_name_snapshot,
            variant_options_snapshot,
            status: row.status,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
        })
    }
}

const ORDER_COLUMNS: &str = r#"
    id, store_id, user_id,
    subtotal_cents, discount_cents, delivery_fee_cents, grand_total_cents,
    currency, shipping_address_snapshot,
    payment_method, payment_status, fulfillment_status,
    note, created_at, updated_at
"#;

const ORDER_ITEM_COLUMNS: &str = r#"
    id, order_id, variant_id, product_id, quantity, price_at_purchase_cents,
    product_name_snapshot, variant_options_snapshot, status, cancellation_reason, created_at
"#;

// =============================================================================
// Repository
// =============================================================================

/// Read access to placed orders.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, id).await
    }

    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_items(&mut conn, order_id).await
    }

    /// Newest first.
    pub async fn list_for_user(&self, user_id: &str) -> DbResult<Vec<Order>> {
        self.list_where("user_id", user_id).await
    }

    /// Newest first.
    pub async fn list_for_store(&self, store_id: &str) -> DbResult<Vec<Order>> {
        self.list_where("store_id", store_id).await
    }

    async fn list_where(&self, column: &'static str, value: &str) -> DbResult<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE {column} = ?1 ORDER BY id DESC");
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Connection-level operations
// =============================================================================

pub(crate) async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    debug!(
        id = %order.id,
        store_id = %order.store_id,
        grand_total_cents = order.grand_total_cents,
        "Inserting order"
    );

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, store_id, user_id,
            subtotal_cents, discount_cents, delivery_fee_cents, grand_total_cents,
            currency, shipping_address_snapshot,
            payment_method, payment_status, fulfillment_status,
            note, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
    )
    .bind(&order.id)
    .bind(&order.store_id)
    .bind(&order.user_id)
    .bind(order.subtotal_cents)
    .bind(order.discount_cents)
    .bind(order.delivery_fee_cents)
    .bind(order.grand_total_cents)
    .bind(&order.currency)
    .bind(order.shipping_address_snapshot.to_string())
    .bind(order.payment_method)
    .bind(order.payment_status)
    .bind(order.fulfillment_status)
    .bind(&order.note)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn insert_item(conn: &mut SqliteConnection, item: &OrderItem) -> DbResult<()> {
    debug!(
        id = %item.id,
        order_id = %item.order_id,
        quantity = item.quantity,
        price_at_purchase_cents = item.price_at_purchase_cents,
        "Inserting order item"
    );

    sqlx::query(
        r#"
        INSERT INTO order_items (
            id, order_id, variant_id, product_id, quantity, price_at_purchase_cents,
            product_name_snapshot, variant_options_snapshot, status, cancellation_reason, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&item.id)
    .bind(&item.order_id)
    .bind(&item.variant_id)
    .bind(&item.product_id)
    .bind(item.quantity)
    .bind(item.price_at_purchase_cents)
    .bind(&item.product_name_snapshot)
    .bind(item.variant_options_snapshot.to_string())
    .bind(item.status)
    .bind(&item.cancellation_reason)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn fetch_order(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1");
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(Order::try_from).transpose()
}

pub(crate) async fn fetch_items(
    conn: &mut SqliteConnection,
    order_id: &str,
) -> DbResult<Vec<OrderItem>> {
    let sql = format!("SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = ?1 ORDER BY id");
    let rows = sqlx::query_as::<_, OrderItemRow>(&sql)
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.into_iter().map(OrderItem::try_from).collect()
}

/// Writes the new payment status only if the row still holds `from`.
/// Returns false when another writer got there first.
pub(crate) async fn update_payment_status(
    conn: &mut SqliteConnection,
    id: &str,
    from: PaymentStatus,
    to: PaymentStatus,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    debug!(id, %from, %to, "Updating payment status");
    let result = sqlx::query(
        "UPDATE orders SET payment_status = ?1, updated_at = ?2 WHERE id = ?3 AND payment_status = ?4",
    )
    .bind(to)
    .bind(now)
    .bind(id)
    .bind(from)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Fulfillment counterpart of [`update_payment_status`].
pub(crate) async fn update_fulfillment_status(
    conn: &mut SqliteConnection,
    id: &str,
    from: FulfillmentStatus,
    to: FulfillmentStatus,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    debug!(id, %from, %to, "Updating fulfillment status");
    let result = sqlx::query(
        "UPDATE orders SET fulfillment_status = ?1, updated_at = ?2 WHERE id = ?3 AND fulfillment_status = ?4",
    )
    .bind(to)
    .bind(now)
    .bind(id)
    .bind(from)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Writes recomputed money columns. Item rows are not touched.
pub(crate) async fn update_totals(
    conn: &mut SqliteConnection,
    id: &str,
    totals: &OrderTotals,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    debug!(
        id,
        subtotal = %totals.subtotal,
        discount = %totals.discounts_total,
        grand_total = %totals.grand_total,
        "Updating order totals"
    );
    let result = sqlx::query(
        r#"
        UPDATE orders
        SET subtotal_cents = ?1, discount_cents = ?2, delivery_fee_cents = ?3,
            grand_total_cents = ?4, updated_at = ?5
        WHERE id = ?6
        "#,
    )
    .bind(totals.subtotal.cents())
    .bind(totals.discounts_total.cents())
    .bind(totals.delivery_fee.cents())
    .bind(totals.grand_total.cents())
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use serde_json::json;
    use souq_core::{CartLine, CatalogVariant, Money, NewOrder, OrderTotals, PricingResult};

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db.catalog().create_store("Store").await.unwrap();
        let address = json!({"city": "Riyadh", "street": "Olaya"});
        let now = Utc::now();

        let totals = OrderTotals::from_pricing(
            PricingResult::subtotal_only(Money::from_cents(9_000)),
            Money::from_cents(1_000),
        )
        .unwrap();
        let order = Order::place(
            NewOrder {
                store_id: &store.id,
                user_id: "u1",
                currency: "SAR",
                shipping_address: &address,
                payment_method: PaymentMethod::Wallet,
                note: Some("gate 3"),
            },
            &totals,
            now,
        );
        let line = CartLine {
            cart_item_id: "ci".to_string(),
            quantity: 3,
            variant: CatalogVariant {
                variant_id: "gone".to_string(),
                product_id: "p1".to_string(),
                store_id: store.id.clone(),
                category_id: None,
                product_name: "Kahwa".to_string(),
                options: json!({"roast": "light"}),
                price_cents: 3_000,
            },
        };
        let mut item = OrderItem::snapshot(&order.id, &line, now);
        // The variant was never stored; the snapshot survives without it.
        item.variant_id = None;

        let mut tx = db.pool().begin().await.unwrap();
        insert_order(&mut tx, &order).await.unwrap();
        insert_item(&mut tx, &item).await.unwrap();
        tx.commit().await.unwrap();

        let stored = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.grand_total(), Money::from_cents(10_000));
        assert_eq!(stored.payment_method, PaymentMethod::Wallet);
        assert_eq!(stored.payment_status, PaymentStatus::PendingPayment);
        assert_eq!(stored.shipping_address_snapshot, address);

        let items = db.orders().items(&order.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_name_snapshot, "Kahwa");
        assert_eq!(items[0].variant_options_snapshot, json!({"roast": "light"}));
        assert_eq!(items[0].status, OrderItemStatus::Active);

        assert_eq!(db.orders().list_for_user("u1").await.unwrap().len(), 1);
        assert_eq!(db.orders().list_for_store(&store.id).await.unwrap().len(), 1);
        assert_eq!(db.orders().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_status_update_is_compare_and_set() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db.catalog().create_store("Store").await.unwrap();
        let totals = OrderTotals::from_pricing(
            PricingResult::subtotal_only(Money::from_cents(100)),
            Money::zero(),
        )
        .unwrap();
        let order = Order::place(
            NewOrder {
                store_id: &store.id,
                user_id: "u1",
                currency: "SAR",
                shipping_address: &json!({"city": "Abha"}),
                payment_method: PaymentMethod::Cod,
                note: None,
            },
            &totals,
            Utc::now(),
        );

        let mut conn = db.pool().acquire().await.unwrap();
        insert_order(&mut conn, &order).await.unwrap();

        let now = Utc::now();
        assert!(
            update_payment_status(&mut conn, &order.id, PaymentStatus::PendingPayment, PaymentStatus::Paid, now)
                .await
                .unwrap()
        );
        assert!(
            !update_payment_status(&mut conn, &order.id, PaymentStatus::PendingPayment, PaymentStatus::Cancelled, now)
                .await
                .unwrap()
        );
        let stored = fetch_order(&mut conn, &order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_update_totals_rewrites_money_columns() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db.catalog().create_store("Store").await.unwrap();
        let created = Utc::now();
        let totals = OrderTotals::from_pricing(
            PricingResult::subtotal_only(Money::from_cents(2_000)),
            Money::from_cents(500),
        )
        .unwrap();
        let order = Order::place(
            NewOrder {
                store_id: &store.id,
                user_id: "u1",
                currency: "SAR",
                shipping_address: &json!({"city": "Taif"}),
                payment_method: PaymentMethod::Cod,
                note: None,
            },
            &totals,
            created,
        );

        let mut conn = db.pool().acquire().await.unwrap();
        insert_order(&mut conn, &order).await.unwrap();

        let bigger = OrderTotals::from_pricing(
            PricingResult::subtotal_only(Money::from_cents(5_000)),
            Money::from_cents(500),
        )
        .unwrap();
        let later = created + chrono::Duration::seconds(5);
        assert!(update_totals(&mut conn, &order.id, &bigger, later).await.unwrap());
        assert!(!update_totals(&mut conn, "missing", &bigger, later).await.unwrap());

        let stored = fetch_order(&mut conn, &order.id).await.unwrap().unwrap();
        assert_eq!(stored.subtotal(), Money::from_cents(5_000));
        assert_eq!(stored.grand_total(), Money::from_cents(5_500));
        assert_eq!(stored.delivery_fee(), Money::from_cents(500));
        assert!(stored.discount().is_zero());
        assert!(stored.updated_at > stored.created_at);
    }
}
