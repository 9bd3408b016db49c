//! # Cart Repository
//!
//! One row per `(user, variant)`; adding the same variant again bumps the
//! quantity.
//!
//! ```text
//! add_item(u, v, 2) ──► INSERT (u, v, 2)
//! add_item(u, v, 3) ──► UPDATE quantity = 5
//! set_quantity(u, v, 0) ──► DELETE
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::catalog::{find_variant, CatalogVariantRow, CATALOG_VARIANT_COLUMNS};
use crate::error::{DbError, DbResult};
use souq_core::validation::validate_quantity;
use souq_core::{new_id, CartItem, CartLine, CatalogVariant};

/// Joined cart row: the cart item plus its live variant.
#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    cart_item_id: String,
    quantity: i64,
    #[sqlx(flatten)]
    variant: CatalogVariantRow,
}

/// Repository for cart database operations.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Adds `quantity` of a variant, creating the row or incrementing it.
    ///
    /// ## Errors
    /// - `Validation` when `quantity` or the resulting total leaves 1..=999
    /// - `NotFound` when the variant doesn't exist
    pub async fn add_item(&self, user_id: &str, variant_id: &str, quantity: i64) -> DbResult<CartItem> {
        validate_quantity(quantity)?;

        let mut tx = self.pool.begin().await?;

        if find_variant(&mut tx, variant_id).await?.is_none() {
            return Err(DbError::not_found("ProductVariant", variant_id));
        }

        let existing = find_item(&mut tx, user_id, variant_id).await?;
        let item = match existing {
            Some(mut item) => {
                let total = item.quantity + quantity;
                validate_quantity(total)?;
                debug!(id = %item.id, user_id, variant_id, quantity = total, "Incrementing cart item");

                sqlx::query("UPDATE cart_items SET quantity = ?1 WHERE id = ?2")
                    .bind(total)
                    .bind(&item.id)
                    .execute(&mut *tx)
                    .await?;
                item.quantity = total;
                item
            }
            None => {
                let item = CartItem {
                    id: new_id(),
                    user_id: user_id.to_string(),
                    variant_id: variant_id.to_string(),
                    quantity,
                    added_at: Utc::now(),
                };
                debug!(id = %item.id, user_id, variant_id, quantity, "Adding cart item");

                sqlx::query(
                    r#"
                    INSERT INTO cart_items (id, user_id, variant_id, quantity, added_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                )
                .bind(&item.id)
                .bind(&item.user_id)
                .bind(&item.variant_id)
                .bind(item.quantity)
                .bind(item.added_at)
                .execute(&mut *tx)
                .await?;
                item
            }
        };

        tx.commit().await?;
        Ok(item)
    }

    /// Sets the quantity of a variant already in the cart. Zero removes it.
    pub async fn set_quantity(&self, user_id: &str, variant_id: &str, quantity: i64) -> DbResult<()> {
        if quantity == 0 {
            return self.remove_item(user_id, variant_id).await;
        }
        validate_quantity(quantity)?;
        debug!(user_id, variant_id, quantity, "Setting cart quantity");

        let result =
            sqlx::query("UPDATE cart_items SET quantity = ?1 WHERE user_id = ?2 AND variant_id = ?3")
                .bind(quantity)
                .bind(user_id)
                .bind(variant_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CartItem", variant_id));
        }
        Ok(())
    }

    /// Removing a variant that isn't in the cart is not an error.
    pub async fn remove_item(&self, user_id: &str, variant_id: &str) -> DbResult<()> {
        debug!(user_id, variant_id, "Removing cart item");
        sqlx::query("DELETE FROM cart_items WHERE user_id = ?1 AND variant_id = ?2")
            .bind(user_id)
            .bind(variant_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn items_for_user(&self, user_id: &str) -> DbResult<Vec<CartItem>> {
        let items = sqlx::query_as::<_, CartItem>(
            r#"
            SELECT id, user_id, variant_id, quantity, added_at
            FROM cart_items
            WHERE user_id = ?1
            ORDER BY added_at, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Cart rows joined with live variant prices.
    pub async fn lines_for_user(&self, user_id: &str) -> DbResult<Vec<CartLine>> {
        let mut conn = self.pool.acquire().await?;
        load_lines(&mut conn, user_id).await
    }

    /// Returns the number of rows removed.
    pub async fn clear(&self, user_id: &str) -> DbResult<u64> {
        debug!(user_id, "Clearing cart");
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

async fn find_item(
    conn: &mut SqliteConnection,
    user_id: &str,
    variant_id: &str,
) -> DbResult<Option<CartItem>> {
    let item = sqlx::query_as::<_, CartItem>(
        r#"
        SELECT id, user_id, variant_id, quantity, added_at
        FROM cart_items
        WHERE user_id = ?1 AND variant_id = ?2
        "#,
    )
    .bind(user_id)
    .bind(variant_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(item)
}

/// Reads the user's cart with live prices, oldest row first.
pub(crate) async fn load_lines(conn: &mut SqliteConnection, user_id: &str) -> DbResult<Vec<CartLine>> {
    let sql = format!(
        r#"
        SELECT c.id AS cart_item_id, c.quantity AS quantity, {CATALOG_VARIANT_COLUMNS}
        FROM cart_items c
        JOIN product_variants v ON v.id = c.variant_id
        JOIN products p ON p.id = v.product_id
        WHERE c.user_id = ?1
        ORDER BY c.added_at, c.id
        "#
    );
    let rows = sqlx::query_as::<_, CartLineRow>(&sql)
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter()
        .map(|row| -> DbResult<CartLine> {
            Ok(CartLine {
                cart_item_id: row.cart_item_id,
                quantity: row.quantity,
                variant: CatalogVariant::try_from(row.variant)?,
            })
        })
        .collect()
}

/// Deletes exactly the given cart rows of `user_id`, returning how many went.
pub(crate) async fn delete_lines(
    conn: &mut SqliteConnection,
    user_id: &str,
    cart_item_ids: &[&str],
) -> DbResult<u64> {
    if cart_item_ids.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; cart_item_ids.len()].join(", ");
    let sql = format!("DELETE FROM cart_items WHERE user_id = ? AND id IN ({placeholders})");

    let mut query = sqlx::query(&sql).bind(user_id);
    for id in cart_item_ids {
        query = query.bind(*id);
    }
    let result = query.execute(&mut *conn).await?;

    debug!(user_id, deleted = result.rows_affected(), "Deleted cart rows");
    Ok(result.rows_affected())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use serde_json::json;
    use souq_core::MAX_ITEM_QUANTITY;

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db.catalog().create_store("Store").await.unwrap();
        let product = db.catalog().create_product(&store.id, None, "Honey").await.unwrap();
        let variant = db
            .catalog()
            .create_variant(&product.id, None, 3_500, json!({"size": "500g"}))
            .await
            .unwrap();
        (db, variant.id)
    }

    #[tokio::test]
    async fn test_add_increments_existing_row() {
        let (db, variant_id) = setup().await;
        let carts = db.carts();

        let first = carts.add_item("u1", &variant_id, 2).await.unwrap();
        let second = carts.add_item("u1", &variant_id, 3).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, 5);
        assert_eq!(carts.items_for_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_quantity_bounds() {
        let (db, variant_id) = setup().await;
        let carts = db.carts();

        assert!(matches!(
            carts.add_item("u1", &variant_id, 0).await,
            Err(DbError::Validation(_))
        ));
        carts.add_item("u1", &variant_id, MAX_ITEM_QUANTITY).await.unwrap();
        assert!(matches!(
            carts.add_item("u1", &variant_id, 1).await,
            Err(DbError::Validation(_))
        ));
        assert!(matches!(
            carts.add_item("u1", "missing", 1).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_set_quantity_zero_removes() {
        let (db, variant_id) = setup().await;
        let carts = db.carts();

        carts.add_item("u1", &variant_id, 1).await.unwrap();
        carts.set_quantity("u1", &variant_id, 7).await.unwrap();
        assert_eq!(carts.items_for_user("u1").await.unwrap()[0].quantity, 7);

        carts.set_quantity("u1", &variant_id, 0).await.unwrap();
        assert!(carts.items_for_user("u1").await.unwrap().is_empty());

        assert!(matches!(
            carts.set_quantity("u1", &variant_id, 2).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_lines_carry_live_price() {
        let (db, variant_id) = setup().await;
        db.carts().add_item("u1", &variant_id, 2).await.unwrap();
        db.carts().add_item("u2", &variant_id, 1).await.unwrap();

        db.catalog().set_variant_price(&variant_id, 4_000).await.unwrap();

        let lines = db.carts().lines_for_user("u1").await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(lines[0].variant.price_cents, 4_000);
        assert_eq!(lines[0].variant.options, json!({"size": "500g"}));

        assert_eq!(db.carts().clear("u1").await.unwrap(), 1);
        assert_eq!(db.carts().items_for_user("u2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_lines_only_touches_own_rows() {
        let (db, variant_id) = setup().await;
        let mine = db.carts().add_item("u1", &variant_id, 1).await.unwrap();
        let theirs = db.carts().add_item("u2", &variant_id, 1).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let deleted = delete_lines(&mut conn, "u1", &[mine.id.as_str(), theirs.id.as_str()])
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(delete_lines(&mut conn, "u1", &[]).await.unwrap(), 0);
    }
}
