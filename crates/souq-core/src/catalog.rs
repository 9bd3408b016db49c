//! # Catalog Types
//!
//! Stores, products and variants as the pricing core sees them.
//!
//! ```text
//! Store 1───* Product 1───* ProductVariant
//!               │                 │
//!          Category?         price_cents (live price)
//! ```
//!
//! The catalog itself is managed elsewhere; checkout only reads it through
//! [`CatalogVariant`], a variant joined with its product.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::money::Money;

/// A vendor. Every order belongs to exactly one store.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Store {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub store_id: String,
    pub category_id: Option<String>,
    pub name: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A sellable variant (size, colour...) of a product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductVariant {
    pub id: String,
    pub product_id: String,
    pub sku: Option<String>,
    /// Live price in minor units. Never trusted from the client.
    pub price_cents: i64,
    /// Free-form option map, e.g. `{"size": "L"}`.
    #[ts(type = "Record<string, unknown>")]
    pub options: Value,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl ProductVariant {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// Read model: a variant joined with its product and store.
///
/// This is what the cart item builder consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CatalogVariant {
    pub variant_id: String,
    pub product_id: String,
    pub store_id: String,
    pub category_id: Option<String>,
    pub product_name: String,
    #[ts(type = "Record<string, unknown>")]
    pub options: Value,
    pub price_cents: i64,
}

impl CatalogVariant {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}
