//! # Order Totals
//!
//! The one place that decides what a customer pays for one store's order.
//!
//! ```text
//!   checkout ─────┐
//!   cart preview ─┼──► compute_order_totals ──► price_cart
//!   staff quote ──┘            │
//!                              ▼
//!        grand_total = subtotal + delivery_fee − discounts_total
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cart::PricingCart;
use crate::error::CoreResult;
use crate::money::Money;
use crate::pricing::{price_cart, PricingResult};
use crate::promotion::RuleSet;
use crate::validation::validate_delivery_fee;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub delivery_fee: Money,
    pub discounts_total: Money,
    pub grand_total: Money,
    /// Full engine output, for display and audit.
    pub pricing: PricingResult,
}

/// Prices `cart` and adds the delivery fee.
///
/// ## Errors
/// - `ValidationError::MustNotBeNegative` when `delivery_fee < 0`
/// - `CoreError::MoneyOutOfRange` when a line, the subtotal or the grand
///   total does not fit in minor units
///
/// ```rust
/// use chrono::Utc;
/// use souq_core::cart::{LineItem, PricingCart};
/// use souq_core::money::Money;
/// use souq_core::promotion::RuleSet;
/// use souq_core::totals::compute_order_totals;
///
/// let item = LineItem {
///     product_id: "p".into(), variant_id: "v".into(), store_id: "s".into(),
///     category_ids: vec![], name: "Oud".into(), qty: 2,
///     unit_price: Money::from_cents(5000),
/// };
/// let cart = PricingCart::new(vec![item], "SAR");
/// let totals = compute_order_totals(&cart, &RuleSet::default(), Money::from_cents(1500), Utc::now()).unwrap();
/// assert_eq!(totals.grand_total.cents(), 11500);
/// ```
pub fn compute_order_totals(
    cart: &PricingCart,
    rules: &RuleSet,
    delivery_fee: Money,
    now: DateTime<Utc>,
) -> CoreResult<OrderTotals> {
    validate_delivery_fee(delivery_fee)?;

    let pricing = price_cart(cart, rules, now)?;
    OrderTotals::from_pricing(pricing, delivery_fee)
}

impl OrderTotals {
    /// Composes totals from an existing pricing result.
    pub fn from_pricing(pricing: PricingResult, delivery_fee: Money) -> CoreResult<Self> {
        // discounts_total <= subtotal, so only the addition can overflow
        let grand_total = pricing.subtotal.checked_add(delivery_fee)? - pricing.discounts_total;
        Ok(OrderTotals {
            subtotal: pricing.subtotal,
            delivery_fee,
            discounts_total: pricing.discounts_total,
            grand_total,
            pricing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::LineItem;
    use crate::error::CoreError;
    use crate::promotion::{Promotion, PromotionCandidate, PromotionType};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap()
    }

    fn cart_of(price_cents: i64, qty: i64) -> PricingCart {
        PricingCart::new(
            vec![LineItem {
                product_id: "p1".to_string(),
                variant_id: "v1".to_string(),
                store_id: "s1".to_string(),
                category_ids: vec![],
                name: "Saffron".to_string(),
                qty,
                unit_price: Money::from_cents(price_cents),
            }],
            "SAR",
        )
    }

    #[test]
    fn test_delivery_fee_added_after_discount() {
        let rules = RuleSet {
            promotions: vec![PromotionCandidate::new(Promotion {
                id: "promo".to_string(),
                name: "5 off".to_string(),
                promotion_type: PromotionType::CartFixedAmount,
                value: 500,
                active: true,
                start_at: None,
                end_at: None,
                min_purchase_cents: None,
                priority: 100,
                stackable: false,
                required_coupon_id: None,
                created_at: now(),
            })],
            offers: vec![],
        };

        let totals = compute_order_totals(&cart_of(3_000, 2), &rules, Money::from_cents(1_500), now())
            .unwrap();

        assert_eq!(totals.subtotal, Money::from_cents(6_000));
        assert_eq!(totals.discounts_total, Money::from_cents(500));
        assert_eq!(totals.delivery_fee, Money::from_cents(1_500));
        assert_eq!(totals.grand_total, Money::from_cents(7_000));
        assert_eq!(totals.pricing.grand_total, Money::from_cents(5_500));
    }

    #[test]
    fn test_zero_fee_matches_engine_total() {
        let totals =
            compute_order_totals(&cart_of(999, 3), &RuleSet::default(), Money::zero(), now()).unwrap();
        assert_eq!(totals.grand_total, totals.pricing.grand_total);
        assert_eq!(totals.grand_total, Money::from_cents(2_997));
    }

    #[test]
    fn test_negative_fee_rejected() {
        let err = compute_order_totals(
            &cart_of(999, 1),
            &RuleSet::default(),
            Money::from_cents(-1),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_two_hundred_cart_with_ten_percent_and_fee() {
        let rules = RuleSet {
            promotions: vec![PromotionCandidate::new(Promotion {
                id: "ten".to_string(),
                name: "10% off".to_string(),
                promotion_type: PromotionType::CartPercentage,
                value: 1_000,
                active: true,
                start_at: None,
                end_at: None,
                min_purchase_cents: None,
                priority: 100,
                stackable: false,
                required_coupon_id: None,
                created_at: now(),
            })],
            offers: vec![],
        };

        let totals =
            compute_order_totals(&cart_of(10_000, 2), &rules, Money::from_cents(500), now())
                .unwrap();

        assert_eq!(totals.subtotal.to_string(), "200.00");
        assert_eq!(totals.discounts_total.to_string(), "20.00");
        assert_eq!(totals.delivery_fee.to_string(), "5.00");
        assert_eq!(totals.grand_total.to_string(), "185.00");
        assert_eq!(totals.pricing.applied_rules.len(), 1);
    }

    #[test]
    fn test_overflow_surfaces_as_money_out_of_range() {
        let err = compute_order_totals(
            &cart_of(i64::MAX / 2, 3),
            &RuleSet::default(),
            Money::zero(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::MoneyOutOfRange(_)));

        let err = compute_order_totals(
            &cart_of(i64::MAX - 10, 1),
            &RuleSet::default(),
            Money::from_cents(500),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::MoneyOutOfRange(_)));
    }
}
