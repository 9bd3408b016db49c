//! # Orders
//!
//! Order records and their two independent status machines.
//!
//! ## Status Machines
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PAYMENT                                                                │
//! │                                                                         │
//! │  PENDING_PAYMENT ──► PAID ──► REFUNDED                                  │
//! │        │                         ▲                                      │
//! │        ├──► CANCELLED            │                                      │
//! │        └─────────────────────────┘                                      │
//! │                                                                         │
//! │  FULFILLMENT                                                            │
//! │                                                                         │
//! │  PENDING ──► ACCEPTED ──► PREPARING ──► SHIPPED ──► DELIVERED           │
//! │     │           │                                                       │
//! │     └───────────┴──► REJECTED                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The axes move independently. Combinations such as REFUNDED + SHIPPED are
//! only refused when the [`StatusPolicy`] is `Strict`.
//!
//! ## Snapshot Pattern
//! `price_at_purchase_cents`, `product_name_snapshot` and
//! `variant_options_snapshot` are copied at checkout and never recomputed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::cart::{CartLine, LineItem};
use crate::catalog::CatalogVariant;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::new_id;
use crate::totals::OrderTotals;

// =============================================================================
// Payment Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    PendingPayment,
    Paid,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::PendingPayment => "PENDING_PAYMENT",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (PendingPayment, Paid | Cancelled | Refunded) | (Paid, Refunded)
        )
    }

    /// Validates and returns `next`.
    pub fn transition(self, next: PaymentStatus) -> CoreResult<PaymentStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                axis: "payment",
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Cancelled | PaymentStatus::Refunded)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Fulfillment Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentStatus {
    #[default]
    Pending,
    Accepted,
    Preparing,
    Shipped,
    Delivered,
    Rejected,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "PENDING",
            FulfillmentStatus::Accepted => "ACCEPTED",
            FulfillmentStatus::Preparing => "PREPARING",
            FulfillmentStatus::Shipped => "SHIPPED",
            FulfillmentStatus::Delivered => "DELIVERED",
            FulfillmentStatus::Rejected => "REJECTED",
        }
    }

    pub fn can_transition_to(&self, next: FulfillmentStatus) -> bool {
        use FulfillmentStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted | Rejected)
                | (Accepted, Preparing | Rejected)
                | (Preparing, Shipped)
                | (Shipped, Delivered)
        )
    }

    pub fn transition(self, next: FulfillmentStatus) -> CoreResult<FulfillmentStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                axis: "fulfillment",
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FulfillmentStatus::Delivered | FulfillmentStatus::Rejected
        )
    }

    /// Accepted, being prepared, or on the road.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            FulfillmentStatus::Accepted | FulfillmentStatus::Preparing | FulfillmentStatus::Shipped
        )
    }
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Status Policy
// =============================================================================

/// Cross-axis guard applied after each per-axis transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPolicy {
    /// Any pair of individually valid statuses is accepted.
    #[default]
    Permissive,
    /// Money returned or never taken cannot coexist with goods in motion.
    Strict,
}

impl StatusPolicy {
    pub fn check(&self, payment: PaymentStatus, fulfillment: FulfillmentStatus) -> CoreResult<()> {
        if *self == StatusPolicy::Permissive {
            return Ok(());
        }

        if payment.is_terminal() && fulfillment.is_in_progress() {
            return Err(CoreError::IncoherentStatus {
                payment: payment.to_string(),
                fulfillment: fulfillment.to_string(),
            });
        }

        Ok(())
    }
}

impl fmt::Display for StatusPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusPolicy::Permissive => write!(f, "permissive"),
            StatusPolicy::Strict => write!(f, "strict"),
        }
    }
}

impl FromStr for StatusPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "permissive" => Ok(StatusPolicy::Permissive),
            "strict" => Ok(StatusPolicy::Strict),
            other => Err(CoreError::UnknownStatusPolicy(other.to_string())),
        }
    }
}

/// A status change, as delivered to event hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "axis", rename_all = "snake_case")]
pub enum StatusChange {
    Payment {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    Fulfillment {
        from: FulfillmentStatus,
        to: FulfillmentStatus,
    },
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Cash on delivery.
    #[default]
    Cod,
    Card,
    Wallet,
}

// =============================================================================
// Order
// =============================================================================

/// One store's share of a checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub store_id: String,
    pub user_id: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub delivery_fee_cents: i64,
    pub grand_total_cents: i64,
    pub currency: String,
    /// Address as it was at checkout.
    #[ts(type = "Record<string, unknown>")]
    pub shipping_address_snapshot: Value,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to open an order besides its totals.
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub store_id: &'a str,
    pub user_id: &'a str,
    pub currency: &'a str,
    pub shipping_address: &'a Value,
    pub payment_method: PaymentMethod,
    pub note: Option<&'a str>,
}

impl Order {
    /// Opens a new order in `PENDING_PAYMENT` / `PENDING`.
    pub fn place(new: NewOrder<'_>, totals: &OrderTotals, now: DateTime<Utc>) -> Self {
        Order {
            id: new_id(),
            store_id: new.store_id.to_string(),
            user_id: new.user_id.to_string(),
            subtotal_cents: totals.subtotal.cents(),
            discount_cents: totals.discounts_total.cents(),
            delivery_fee_cents: totals.delivery_fee.cents(),
            grand_total_cents: totals.grand_total.cents(),
            currency: new.currency.to_string(),
            shipping_address_snapshot: new.shipping_address.clone(),
            payment_method: new.payment_method,
            payment_status: PaymentStatus::default(),
            fulfillment_status: FulfillmentStatus::default(),
            note: new.note.map(str::to_string),
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    #[inline]
    pub fn delivery_fee(&self) -> Money {
        Money::from_cents(self.delivery_fee_cents)
    }

    #[inline]
    pub fn grand_total(&self) -> Money {
        Money::from_cents(self.grand_total_cents)
    }
}

// =============================================================================
// Order Item
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderItemStatus {
    #[default]
    Active,
    Cancelled,
}

/// A frozen order line.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    /// `None` once the variant is deleted from the catalog.
    pub variant_id: Option<String>,
    pub product_id: String,
    pub quantity: i64,
    pub price_at_purchase_cents: i64,
    pub product_name_snapshot: String,
    #[ts(type = "Record<string, unknown>")]
    pub variant_options_snapshot: Value,
    pub status: OrderItemStatus,
    pub cancellation_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Freezes a cart line into an order line at the variant's current price.
    pub fn snapshot(order_id: &str, line: &CartLine, now: DateTime<Utc>) -> Self {
        OrderItem::from_variant(order_id, &line.variant, line.quantity, now)
    }

    /// Freezes `quantity` of a catalog variant at its current price.
    pub fn from_variant(
        order_id: &str,
        variant: &CatalogVariant,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Self {
        OrderItem {
            id: new_id(),
            order_id: order_id.to_string(),
            variant_id: Some(variant.variant_id.clone()),
            product_id: variant.product_id.clone(),
            quantity,
            price_at_purchase_cents: variant.price_cents,
            product_name_snapshot: variant.product_name.clone(),
            variant_options_snapshot: variant.options.clone(),
            status: OrderItemStatus::Active,
            cancellation_reason: None,
            created_at: now,
        }
    }

    #[inline]
    pub fn price_at_purchase(&self) -> Money {
        Money::from_cents(self.price_at_purchase_cents)
    }

    #[inline]
    pub fn line_total(&self) -> CoreResult<Money> {
        self.price_at_purchase().multiply_quantity(self.quantity)
    }

    /// Rebuilds an engine line from the snapshot, for staff re-quotes.
    pub fn to_line_item(&self, store_id: &str) -> LineItem {
        LineItem {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone().unwrap_or_default(),
            store_id: store_id.to_string(),
            category_ids: Vec::new(),
            name: self.product_name_snapshot.clone(),
            qty: self.quantity,
            unit_price: self.price_at_purchase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PricingResult;
    use serde_json::json;

    #[test]
    fn test_payment_transitions() {
        use PaymentStatus::*;
        assert!(PendingPayment.can_transition_to(Paid));
        assert!(PendingPayment.can_transition_to(Cancelled));
        assert!(PendingPayment.can_transition_to(Refunded));
        assert!(Paid.can_transition_to(Refunded));

        assert!(!Paid.can_transition_to(PendingPayment));
        assert!(!Paid.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Paid));
        assert!(!Refunded.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Paid));

        let err = Refunded.transition(Paid).unwrap_err();
        assert_eq!(err.to_string(), "Invalid payment transition: REFUNDED → PAID");
    }

    #[test]
    fn test_fulfillment_transitions() {
        use FulfillmentStatus::*;
        let happy_path = [Pending, Accepted, Preparing, Shipped, Delivered];
        for pair in happy_path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} → {}", pair[0], pair[1]);
        }
        assert!(Pending.can_transition_to(Rejected));
        assert!(Accepted.can_transition_to(Rejected));

        assert!(!Preparing.can_transition_to(Rejected));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Delivered.can_transition_to(Pending));
        assert!(Shipped.transition(Preparing).is_err());
    }

    #[test]
    fn test_status_policy() {
        use FulfillmentStatus::*;
        use PaymentStatus::*;

        assert!(StatusPolicy::Permissive.check(Refunded, Shipped).is_ok());
        assert!(StatusPolicy::Strict.check(Refunded, Shipped).is_err());
        assert!(StatusPolicy::Strict.check(Cancelled, Accepted).is_err());
        assert!(StatusPolicy::Strict.check(Refunded, Delivered).is_ok());
        assert!(StatusPolicy::Strict.check(Cancelled, Rejected).is_ok());
        assert!(StatusPolicy::Strict.check(Paid, Shipped).is_ok());

        assert_eq!("STRICT".parse::<StatusPolicy>().unwrap(), StatusPolicy::Strict);
        assert!("lenient".parse::<StatusPolicy>().is_err());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::PendingPayment).unwrap(),
            "\"PENDING_PAYMENT\""
        );
        assert_eq!(serde_json::to_string(&PaymentMethod::Cod).unwrap(), "\"cod\"");
        let change = StatusChange::Fulfillment {
            from: FulfillmentStatus::Pending,
            to: FulfillmentStatus::Accepted,
        };
        assert_eq!(
            serde_json::to_value(change).unwrap(),
            json!({"axis": "fulfillment", "from": "PENDING", "to": "ACCEPTED"})
        );
    }

    #[test]
    fn test_place_and_snapshot() {
        let totals = OrderTotals::from_pricing(
            PricingResult::subtotal_only(Money::from_cents(12_000)),
            Money::from_cents(1_000),
        )
        .unwrap();
        let address = json!({"city": "Jeddah"});
        let now = Utc::now();
        let order = Order::place(
            NewOrder {
                store_id: "s1",
                user_id: "u1",
                currency: "SAR",
                shipping_address: &address,
                payment_method: PaymentMethod::Card,
                note: Some("ring twice"),
            },
            &totals,
            now,
        );
        assert_eq!(order.payment_status, PaymentStatus::PendingPayment);
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Pending);
        assert_eq!(order.grand_total(), Money::from_cents(13_000));
        assert_eq!(order.shipping_address_snapshot, address);

        let line = CartLine {
            cart_item_id: "ci".to_string(),
            quantity: 4,
            variant: CatalogVariant {
                variant_id: "v1".to_string(),
                product_id: "p1".to_string(),
                store_id: "s1".to_string(),
                category_id: None,
                product_name: "Cardamom".to_string(),
                options: json!({"weight": "250g"}),
                price_cents: 3_000,
            },
        };
        let item = OrderItem::snapshot(&order.id, &line, now);
        assert_eq!(item.price_at_purchase(), Money::from_cents(3_000));
        assert_eq!(item.line_total().unwrap(), Money::from_cents(12_000));
        assert_eq!(item.variant_options_snapshot, json!({"weight": "250g"}));

        let requoted = item.to_line_item("s1");
        assert_eq!(requoted.unit_price, item.price_at_purchase());
        assert_eq!(requoted.variant_id, "v1");
    }
}
