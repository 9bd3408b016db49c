//! # souq-core: Pure Pricing & Order Logic
//!
//! Money, carts, the promotion engine, order totals and order status
//! machines, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Souq Architecture                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   Storefront / staff dashboard (REST, outside this workspace)   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ CheckoutRequest                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   souq-db: services (checkout, pricing, orders), repositories   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ PricingCart + RuleSet                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ souq-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌──────────┐ ┌──────────┐ ┌────────┐ ┌────────┐  │   │
//! │  │   │  money  │ │   cart   │ │ pricing  │ │ totals │ │ order  │  │   │
//! │  │   │ Money   │ │ LineItem │ │price_cart│ │ grand  │ │ status │  │   │
//! │  │   │ Percent │ │ builder  │ │ RuleSet  │ │ total  │ │machines│  │   │
//! │  │   └─────────┘ └──────────┘ └──────────┘ └────────┘ └────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - `Money` (i64 minor units) and `Percentage` (basis points)
//! - [`catalog`] - Store / product / variant records
//! - [`cart`] - Cart rows and the line item builder
//! - [`promotion`] - Promotions, coupons, offers, `RuleSet`
//! - [`pricing`] - The pricing engine
//! - [`totals`] - Order total compositor
//! - [`order`] - Orders, order items, status machines
//! - [`address`] - Saved addresses and shipping snapshots
//! - [`checkout`] - Checkout request / response DTOs
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use souq_core::{price_cart, LineItem, Money, PricingCart, RuleSet};
//!
//! let item = LineItem {
//!     product_id: "p".into(), variant_id: "v".into(), store_id: "s".into(),
//!     category_ids: vec![], name: "Arabic coffee".into(), qty: 3,
//!     unit_price: Money::from_cents(6000),
//! };
//! let result = price_cart(&PricingCart::new(vec![item], "SAR"), &RuleSet::default(), Utc::now())?;
//! assert_eq!(result.grand_total.to_string(), "180.00");
//! # Ok::<(), souq_core::CoreError>(())
//! ```

pub mod address;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod error;
pub mod money;
pub mod order;
pub mod pricing;
pub mod promotion;
pub mod totals;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use address::UserAddress;
pub use cart::{build_line_items, CartItem, CartLine, LineItem, PricingCart};
pub use catalog::{CatalogVariant, Category, Product, ProductVariant, Store};
pub use checkout::{CheckoutRequest, PlacedOrder, ShippingSource, StoreQuote};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, Percentage};
pub use order::{
    FulfillmentStatus, NewOrder, Order, OrderItem, OrderItemStatus, PaymentMethod, PaymentStatus,
    StatusChange, StatusPolicy,
};
pub use pricing::{price_cart, AppliedRule, PricingResult, RuleMeta, RuleType, SkipReason};
pub use promotion::{
    Coupon, CouponRedemption, CouponUsage, Offer, OfferStrategy, OfferType, Promotion,
    PromotionCandidate, PromotionType, RuleSet, ScopeTarget,
};
pub use totals::{compute_order_totals, OrderTotals};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single variant in a cart.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum variant price in minor units (1,000,000,000.00).
///
/// At 999 per line this leaves room for ~92,000 lines before an `i64`
/// subtotal could overflow.
pub const MAX_PRICE_CENTS: i64 = 100_000_000_000;

/// Maximum length of the customer note on a checkout, in characters.
pub const MAX_NOTE_LENGTH: usize = 500;

/// Marketplace currency when configuration does not say otherwise.
pub const DEFAULT_CURRENCY: &str = "SAR";

/// Generates a new entity id.
///
/// UUID v7 is time ordered, so sorting by id follows creation order. The
/// engine's `(priority, id)` tie-break relies on that.
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
