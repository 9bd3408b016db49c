//! # Catalog Repository
//!
//! Stores, categories, products and their priced variants.
//!
//! Variants are read through the joined [`CatalogVariant`] view: everything
//! the cart builder and the order snapshot need in one row.

use chrono::Utc;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use souq_core::validation::validate_price_cents;
use souq_core::{new_id, CatalogVariant, Category, Product, ProductVariant, Store};

pub(crate) const CATALOG_VARIANT_COLUMNS: &str = r#"
    v.id AS variant_id,
    p.id AS product_id,
    p.store_id AS store_id,
    p.category_id AS category_id,
    p.name AS product_name,
    v.options AS options,
    v.price_cents AS price_cents
"#;

/// Raw joined variant row. `options` is JSON text.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CatalogVariantRow {
    pub variant_id: String,
    pub product_id: String,
    pub store_id: String,
    pub category_id: Option<String>,
    pub product_name: String,
    pub options: String,
    pub price_cents: i64,
}

impl TryFrom<CatalogVariantRow> for CatalogVariant {
    type Error = DbError;

    fn try_from(row: CatalogVariantRow) -> DbResult<Self> {
        let options = parse_json("product_variant", &row.variant_id, &row.options)?;
        Ok(CatalogVariant {
            variant_id: row.variant_id,
            product_id: row.product_id,
            store_id: row.store_id,
            category_id: row.category_id,
            product_name: row.product_name,
            options,
            price_cents: row.price_cents,
        })
    }
}

/// Parses a JSON column, naming the row on failure.
pub(crate) fn parse_json(entity: &'static str, id: &str, text: &str) -> DbResult<Value> {
    serde_json::from_str(text).map_err(|e| DbError::corrupt(entity, id, e))
}

/// Repository for catalog database operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    pub async fn create_store(&self, name: &str) -> DbResult<Store> {
        let store = Store {
            id: new_id(),
            name: name.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        debug!(id = %store.id, name = %store.name, "Creating store");

        sqlx::query("INSERT INTO stores (id, name, is_active, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&store.id)
            .bind(&store.name)
            .bind(store.is_active)
            .bind(store.created_at)
            .execute(&self.pool)
            .await?;

        Ok(store)
    }

    pub async fn get_store(&self, id: &str) -> DbResult<Option<Store>> {
        let store = sqlx::query_as::<_, Store>(
            "SELECT id, name, is_active, created_at FROM stores WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(store)
    }

    pub async fn create_category(&self, name: &str) -> DbResult<Category> {
        let category = Category {
            id: new_id(),
            name: name.to_string(),
        };
        debug!(id = %category.id, name = %category.name, "Creating category");

        sqlx::query("INSERT INTO categories (id, name) VALUES (?1, ?2)")
            .bind(&category.id)
            .bind(&category.name)
            .execute(&self.pool)
            .await?;

        Ok(category)
    }

    pub async fn create_product(
        &self,
        store_id: &str,
        category_id: Option<&str>,
        name: &str,
    ) -> DbResult<Product> {
        let product = Product {
            id: new_id(),
            store_id: store_id.to_string(),
            category_id: category_id.map(str::to_string),
            name: name.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        debug!(id = %product.id, store_id, name, "Creating product");

        sqlx::query(
            r#"
            INSERT INTO products (id, store_id, category_id, name, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&product.id)
        .bind(&product.store_id)
        .bind(&product.category_id)
        .bind(&product.name)
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    /// Adds a variant. `price_cents` must not be negative.
    pub async fn create_variant(
        &self,
        product_id: &str,
        sku: Option<&str>,
        price_cents: i64,
        options: Value,
    ) -> DbResult<ProductVariant> {
        validate_price_cents(price_cents)?;

        let variant = ProductVariant {
            id: new_id(),
            product_id: product_id.to_string(),
            sku: sku.map(str::to_string),
            price_cents,
            options,
            created_at: Utc::now(),
        };
        debug!(id = %variant.id, product_id, price_cents, "Creating variant");

        sqlx::query(
            r#"
            INSERT INTO product_variants (id, product_id, sku, price_cents, options, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.product_id)
        .bind(&variant.sku)
        .bind(variant.price_cents)
        .bind(variant.options.to_string())
        .bind(variant.created_at)
        .execute(&self.pool)
        .await?;

        Ok(variant)
    }

    /// Changes a variant's live price. Placed orders keep their snapshot.
    pub async fn set_variant_price(&self, variant_id: &str, price_cents: i64) -> DbResult<()> {
        validate_price_cents(price_cents)?;
        debug!(variant_id, price_cents, "Updating variant price");

        let result = sqlx::query("UPDATE product_variants SET price_cents = ?1 WHERE id = ?2")
            .bind(price_cents)
            .bind(variant_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("ProductVariant", variant_id));
        }
        Ok(())
    }

    /// Removes a variant. Order lines keep their snapshot with `variant_id`
    /// set to NULL; cart rows go with it.
    pub async fn delete_variant(&self, variant_id: &str) -> DbResult<()> {
        debug!(variant_id, "Deleting variant");
        sqlx::query("DELETE FROM product_variants WHERE id = ?1")
            .bind(variant_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_variant(&self, variant_id: &str) -> DbResult<Option<CatalogVariant>> {
        let mut conn = self.pool.acquire().await?;
        find_variant(&mut conn, variant_id).await
    }
}

/// Joined variant lookup on an existing connection.
pub(crate) async fn find_variant(
    conn: &mut SqliteConnection,
    variant_id: &str,
) -> DbResult<Option<CatalogVariant>> {
    let sql = format!(
        "SELECT {CATALOG_VARIANT_COLUMNS} FROM product_variants v \
         JOIN products p ON p.id = v.product_id WHERE v.id = ?1"
    );
    let row = sqlx::query_as::<_, CatalogVariantRow>(&sql)
        .bind(variant_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(CatalogVariant::try_from).transpose()
}

// =============================================================================
// Unit Tests
// =============================================================================
