//! # Cart Module
//!
//! Cart rows, and the builder that turns them into pricing line items.
//!
//! ## Cart → Line Items
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  cart_items (user, variant, qty)                                        │
//! │        │  JOIN product_variants / products  (live price, store)         │
//! │        ▼                                                                │
//! │  CartLine { quantity, CatalogVariant }                                  │
//! │        │  build_line_items()  ← THIS MODULE                             │
//! │        ▼                                                                │
//! │  LineItem { store_id, unit_price = variant price, qty }                 │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  PricingCart ──► pricing::price_cart()                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `unit_price` always comes from the variant, never from the request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::catalog::CatalogVariant;
use crate::error::CoreResult;
use crate::money::Money;

// =============================================================================
// Cart rows
// =============================================================================

/// One (user, variant) row in a customer's cart.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CartItem {
    pub id: String,
    pub user_id: String,
    pub variant_id: String,
    pub quantity: i64,
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

/// A cart row joined with the variant's current catalog data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub cart_item_id: String,
    pub quantity: i64,
    pub variant: CatalogVariant,
}

impl CartLine {
    pub fn store_id(&self) -> &str {
        &self.variant.store_id
    }

    pub fn to_line_item(&self) -> LineItem {
        LineItem::from_variant(&self.variant, self.quantity)
    }
}

// =============================================================================
// Line items
// =============================================================================

/// A priced line as the engine sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItem {
    pub product_id: String,
    pub variant_id: String,
    pub store_id: String,
    /// Category ids of the product; empty when uncategorised.
    pub category_ids: Vec<String>,
    pub name: String,
    pub qty: i64,
    pub unit_price: Money,
}

impl LineItem {
    /// Builds a line from a catalog variant, copying its current price.
    pub fn from_variant(variant: &CatalogVariant, qty: i64) -> Self {
        LineItem {
            product_id: variant.product_id.clone(),
            variant_id: variant.variant_id.clone(),
            store_id: variant.store_id.clone(),
            category_ids: variant.category_id.iter().cloned().collect(),
            name: variant.product_name.clone(),
            qty,
            unit_price: variant.price(),
        }
    }

    /// unit_price × qty
    #[inline]
    pub fn line_total(&self) -> CoreResult<Money> {
        self.unit_price.multiply_quantity(self.qty)
    }
}

/// Builds engine line items from `(variant, quantity)` pairs.
///
/// ```rust
/// use serde_json::json;
/// use souq_core::cart::build_line_items;
/// use souq_core::catalog::CatalogVariant;
///
/// let variant = CatalogVariant {
///     variant_id: "v1".into(),
///     product_id: "p1".into(),
///     store_id: "s1".into(),
///     category_id: None,
///     product_name: "Kabsa spice".into(),
///     options: json!({}),
///     price_cents: 6000,
/// };
/// let items = build_line_items([(&variant, 3)]);
/// assert_eq!(items[0].unit_price.cents(), 6000);
/// assert!(items[0].category_ids.is_empty());
/// ```
pub fn build_line_items<'a, I>(pairs: I) -> Vec<LineItem>
where
    I: IntoIterator<Item = (&'a CatalogVariant, i64)>,
{
    pairs
        .into_iter()
        .map(|(variant, qty)| LineItem::from_variant(variant, qty))
        .collect()
}

// =============================================================================
// Pricing cart
// =============================================================================

/// Input to the pricing engine.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricingCart {
    /// Needed for per-user coupon limits; `None` for anonymous previews.
    pub user_id: Option<String>,
    pub items: Vec<LineItem>,
    pub coupon_code: Option<String>,
    pub currency: String,
}

impl PricingCart {
    pub fn new(items: Vec<LineItem>, currency: impl Into<String>) -> Self {
        PricingCart {
            user_id: None,
            items,
            coupon_code: None,
            currency: currency.into(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_coupon(mut self, code: Option<String>) -> Self {
        self.coupon_code = code;
        self
    }

    /// Σ line totals. Exact in minor units, or `MoneyOutOfRange`.
    pub fn subtotal(&self) -> CoreResult<Money> {
        Money::try_sum(self.items.iter().map(LineItem::line_total))
    }
}
