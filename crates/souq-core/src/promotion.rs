//! # Promotions, Coupons & Offers
//!
//! The rule records the pricing engine evaluates.
//!
//! ## Rule Families
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Promotion (value-based)                                                │
//! │  ├── CART_PERCENTAGE       value = percent (10.00)      ← evaluated     │
//! │  ├── CART_FIXED_AMOUNT     value = amount  (5.00)       ← evaluated     │
//! │  ├── PRODUCT_PERCENTAGE                                 ← loaded, 0     │
//! │  └── PRODUCT_FIXED_AMOUNT                               ← loaded, 0     │
//! │                                                                         │
//! │  Offer (configuration JSON → OfferStrategy)                             │
//! │  ├── BUY_X_GET_Y                                                        │
//! │  ├── BUNDLE_FIXED_PRICE          parsed and reported in notes,          │
//! │  ├── THRESHOLD_GIFT              never change the price                 │
//! │  └── THRESHOLD_FREE_SHIPPING                                            │
//! │                                                                         │
//! │  Coupon: optional gate on either family. Codes compare                 │
//! │  trimmed + case-insensitive.                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every rule shares the same window semantics: `[start_at, end_at]`,
//! both ends inclusive, either end optional.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Percentage};
use crate::validation::normalize_coupon_code;

/// Default priority for new rules. Lower runs first.
pub const DEFAULT_PRIORITY: i64 = 100;

/// True when `now` lies in the closed interval `[start, end]`.
pub fn within_window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if start.is_some_and(|s| now < s) {
        return false;
    }
    if end.is_some_and(|e| now > e) {
        return false;
    }
    true
}

// =============================================================================
// Promotion
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionType {
    ProductPercentage,
    ProductFixedAmount,
    CartPercentage,
    CartFixedAmount,
}

impl PromotionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionType::ProductPercentage => "PRODUCT_PERCENTAGE",
            PromotionType::ProductFixedAmount => "PRODUCT_FIXED_AMOUNT",
            PromotionType::CartPercentage => "CART_PERCENTAGE",
            PromotionType::CartFixedAmount => "CART_FIXED_AMOUNT",
        }
    }

    /// Cart-level types are the only ones that produce a discount today.
    pub fn is_cart_level(&self) -> bool {
        matches!(
            self,
            PromotionType::CartPercentage | PromotionType::CartFixedAmount
        )
    }
}

impl fmt::Display for PromotionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromotionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PRODUCT_PERCENTAGE" => Ok(PromotionType::ProductPercentage),
            "PRODUCT_FIXED_AMOUNT" => Ok(PromotionType::ProductFixedAmount),
            "CART_PERCENTAGE" => Ok(PromotionType::CartPercentage),
            "CART_FIXED_AMOUNT" => Ok(PromotionType::CartFixedAmount),
            other => Err(CoreError::UnknownPromotionType(other.to_string())),
        }
    }
}

/// A value-based discount rule.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Promotion {
    pub id: String,
    pub name: String,
    pub promotion_type: PromotionType,
    /// Two-place fixed point: percent for `*_PERCENTAGE` (1000 = 10.00%),
    /// minor units for `*_FIXED_AMOUNT` (500 = 5.00).
    pub value: i64,
    pub active: bool,
    #[ts(as = "Option<String>")]
    pub start_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub end_at: Option<DateTime<Utc>>,
    pub min_purchase_cents: Option<i64>,
    pub priority: i64,
    /// Stored and reported, not honoured: at most one promotion applies.
    pub stackable: bool,
    pub required_coupon_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Promotion {
    /// Value read as a percentage, clamped to `[0, 100]`.
    pub fn percentage(&self) -> Percentage {
        Percentage::from_bps(self.value)
    }

    /// Value read as an amount.
    pub fn amount(&self) -> Money {
        Money::from_cents(self.value)
    }

    pub fn min_purchase(&self) -> Option<Money> {
        self.min_purchase_cents.map(Money::from_cents)
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && within_window(self.start_at, self.end_at, now)
    }
}

// =============================================================================
// Coupon
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Coupon {
    pub id: String,
    pub code: String,
    pub active: bool,
    #[ts(as = "Option<String>")]
    pub start_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub end_at: Option<DateTime<Utc>>,
    /// Total redemptions allowed across all users.
    pub usage_limit: Option<i64>,
    /// Redemptions allowed per user.
    pub limit_per_user: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Case-insensitive, whitespace-insensitive code comparison.
    pub fn matches_code(&self, code: &str) -> bool {
        match (normalize_coupon_code(&self.code), normalize_coupon_code(code)) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => false,
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && within_window(self.start_at, self.end_at, now)
    }

    /// True when either usage limit has been reached.
    pub fn is_exhausted(&self, usage: &CouponUsage) -> bool {
        let total_reached = self
            .usage_limit
            .is_some_and(|limit| usage.total_redemptions >= limit);
        let user_reached = self
            .limit_per_user
            .is_some_and(|limit| usage.user_redemptions >= limit);
        total_reached || user_reached
    }
}

/// Redemption counts for one coupon, as seen by one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CouponUsage {
    pub total_redemptions: i64,
    /// Zero when pricing anonymously.
    pub user_redemptions: i64,
}

/// Record of a coupon being used on one order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CouponRedemption {
    pub id: String,
    pub coupon_id: String,
    pub user_id: String,
    pub order_id: String,
    #[ts(as = "String")]
    pub redeemed_at: DateTime<Utc>,
}

// =============================================================================
// Scope
// =============================================================================

/// What a promotion scope row points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeTarget {
    Store,
    Category,
    Product,
    Variant,
}

// =============================================================================
// Candidates & rule set
// =============================================================================

/// A promotion with everything needed to judge it, pre-joined by the loader.
#[derive(Debug, Clone)]
pub struct PromotionCandidate {
    pub promotion: Promotion,
    /// The gating coupon, when `required_coupon_id` is set.
    pub coupon: Option<Coupon>,
    pub coupon_usage: CouponUsage,
    /// Has store/category/product/variant scope rows. Not enforced.
    pub scoped: bool,
}

impl PromotionCandidate {
    pub fn new(promotion: Promotion) -> Self {
        PromotionCandidate {
            promotion,
            coupon: None,
            coupon_usage: CouponUsage::default(),
            scoped: false,
        }
    }

    pub fn with_coupon(mut self, coupon: Coupon, usage: CouponUsage) -> Self {
        self.coupon = Some(coupon);
        self.coupon_usage = usage;
        self
    }

    pub fn scoped(mut self, scoped: bool) -> Self {
        self.scoped = scoped;
        self
    }
}

/// Everything the engine may apply to one cart.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub promotions: Vec<PromotionCandidate>,
    pub offers: Vec<Offer>,
}

impl RuleSet {
    pub fn is_empty(&self) -> bool {
        self.promotions.is_empty() && self.offers.is_empty()
    }
}

// =============================================================================
// Offers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferType {
    BuyXGetY,
    BundleFixedPrice,
    ThresholdGift,
    ThresholdFreeShipping,
}

impl OfferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferType::BuyXGetY => "BUY_X_GET_Y",
            OfferType::BundleFixedPrice => "BUNDLE_FIXED_PRICE",
            OfferType::ThresholdGift => "THRESHOLD_GIFT",
            OfferType::ThresholdFreeShipping => "THRESHOLD_FREE_SHIPPING",
        }
    }
}

impl fmt::Display for OfferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY_X_GET_Y" => Ok(OfferType::BuyXGetY),
            "BUNDLE_FIXED_PRICE" => Ok(OfferType::BundleFixedPrice),
            "THRESHOLD_GIFT" => Ok(OfferType::ThresholdGift),
            "THRESHOLD_FREE_SHIPPING" => Ok(OfferType::ThresholdFreeShipping),
            other => Err(CoreError::UnknownOfferType(other.to_string())),
        }
    }
}

/// A configuration-driven offer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Offer {
    pub id: String,
    pub name: String,
    pub offer_type: OfferType,
    #[ts(type = "Record<string, unknown>")]
    pub configuration: Value,
    pub active: bool,
    #[ts(as = "Option<String>")]
    pub start_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub end_at: Option<DateTime<Utc>>,
    pub min_purchase_cents: Option<i64>,
    pub priority: i64,
    pub stackable: bool,
    pub required_coupon_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Offer {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && within_window(self.start_at, self.end_at, now)
    }

    /// Parses `configuration` into the strategy for `offer_type`.
    pub fn strategy(&self) -> CoreResult<OfferStrategy> {
        let invalid = |reason: String| CoreError::InvalidOfferConfig {
            offer_id: self.id.clone(),
            reason,
        };
        let config = self.configuration.clone();

        let strategy = match self.offer_type {
            OfferType::BuyXGetY => OfferStrategy::BuyXGetY(
                serde_json::from_value(config).map_err(|e| invalid(e.to_string()))?,
            ),
            OfferType::BundleFixedPrice => OfferStrategy::BundleFixedPrice(
                serde_json::from_value(config).map_err(|e| invalid(e.to_string()))?,
            ),
            OfferType::ThresholdGift => OfferStrategy::ThresholdGift(
                serde_json::from_value(config).map_err(|e| invalid(e.to_string()))?,
            ),
            OfferType::ThresholdFreeShipping => OfferStrategy::ThresholdFreeShipping(
                serde_json::from_value(config).map_err(|e| invalid(e.to_string()))?,
            ),
        };

        strategy.check().map_err(invalid)?;
        Ok(strategy)
    }
}

/// Reward given on the "get" side of a buy-X-get-Y offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardType {
    #[default]
    Free,
    Percentage,
}

fn default_discount_value() -> Percentage {
    Percentage::from_bps(Percentage::FULL_BPS as i64)
}

fn default_min_quantity_each() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyXGetY {
    pub buy_quantity: u32,
    pub get_quantity: u32,
    #[serde(default)]
    pub target_product_id: Option<String>,
    #[serde(default)]
    pub discount_type: RewardType,
    #[serde(default = "default_discount_value")]
    pub discount_value: Percentage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleFixedPrice {
    pub bundle_price: Money,
    pub required_product_ids: Vec<String>,
    #[serde(default)]
    pub required_variant_ids: Vec<String>,
    #[serde(default = "default_min_quantity_each")]
    pub min_quantity_each: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdGift {
    pub threshold: Money,
    #[serde(default)]
    pub gift_product_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdFreeShipping {
    pub threshold: Money,
}

/// Parsed offer configuration, one variant per offer type.
#[derive(Debug, Clone, PartialEq)]
pub enum OfferStrategy {
    BuyXGetY(BuyXGetY),
    BundleFixedPrice(BundleFixedPrice),
    ThresholdGift(ThresholdGift),
    ThresholdFreeShipping(ThresholdFreeShipping),
}

/// What evaluating an offer against a cart produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferOutcome {
    /// The strategy exists but is not wired into pricing yet.
    NotImplemented,
}

impl OfferStrategy {
    pub fn offer_type(&self) -> OfferType {
        match self {
            OfferStrategy::BuyXGetY(_) => OfferType::BuyXGetY,
            OfferStrategy::BundleFixedPrice(_) => OfferType::BundleFixedPrice,
            OfferStrategy::ThresholdGift(_) => OfferType::ThresholdGift,
            OfferStrategy::ThresholdFreeShipping(_) => OfferType::ThresholdFreeShipping,
        }
    }

    fn check(&self) -> Result<(), String> {
        match self {
            OfferStrategy::BuyXGetY(c) if c.buy_quantity == 0 || c.get_quantity == 0 => {
                Err("buy_quantity and get_quantity must be at least 1".to_string())
            }
            OfferStrategy::BundleFixedPrice(c) if c.required_product_ids.is_empty() => {
                Err("required_product_ids must not be empty".to_string())
            }
            OfferStrategy::BundleFixedPrice(c) if !c.bundle_price.is_positive() => {
                Err("bundle_price must be positive".to_string())
            }
            OfferStrategy::ThresholdGift(c) if c.threshold.is_negative() => {
                Err("threshold must not be negative".to_string())
            }
            OfferStrategy::ThresholdFreeShipping(c) if c.threshold.is_negative() => {
                Err("threshold must not be negative".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Evaluates the offer. No strategy changes the price yet.
    // TODO: wire BUY_X_GET_Y and THRESHOLD_FREE_SHIPPING into line_discounts / free_shipping
    pub fn evaluate(&self, _subtotal: Money) -> OfferOutcome {
        OfferOutcome::NotImplemented
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
    }

    fn offer(offer_type: OfferType, configuration: Value) -> Offer {
        Offer {
            id: "offer-1".to_string(),
            name: "Test offer".to_string(),
            offer_type,
            configuration,
            active: true,
            start_at: None,
            end_at: None,
            min_purchase_cents: None,
            priority: DEFAULT_PRIORITY,
            stackable: true,
            required_coupon_id: None,
            created_at: at(1),
        }
    }

    #[test]
    fn test_window_is_closed_interval() {
        assert!(within_window(Some(at(10)), Some(at(20)), at(10)));
        assert!(within_window(Some(at(10)), Some(at(20)), at(20)));
        assert!(!within_window(Some(at(10)), Some(at(20)), at(9)));
        assert!(!within_window(Some(at(10)), Some(at(20)), at(21)));
        assert!(within_window(None, None, at(1)));
        assert!(within_window(None, Some(at(5)), at(5)));
    }

    #[test]
    fn test_promotion_type_parse() {
        assert_eq!(
            "cart_percentage".parse::<PromotionType>().unwrap(),
            PromotionType::CartPercentage
        );
        assert!("CART_BOGO".parse::<PromotionType>().is_err());
        assert!(PromotionType::CartFixedAmount.is_cart_level());
        assert!(!PromotionType::ProductPercentage.is_cart_level());
    }

    #[test]
    fn test_coupon_code_matching() {
        let coupon = Coupon {
            id: "c1".to_string(),
            code: "SAVE10".to_string(),
            active: true,
            start_at: None,
            end_at: None,
            usage_limit: None,
            limit_per_user: None,
            created_at: at(1),
        };
        assert!(coupon.matches_code(" save10 "));
        assert!(!coupon.matches_code("SAVE20"));
        assert!(!coupon.matches_code(""));
    }

    #[test]
    fn test_coupon_exhaustion() {
        let coupon = Coupon {
            id: "c1".to_string(),
            code: "ONCE".to_string(),
            active: true,
            start_at: None,
            end_at: None,
            usage_limit: Some(10),
            limit_per_user: Some(1),
            created_at: at(1),
        };
        assert!(!coupon.is_exhausted(&CouponUsage::default()));
        assert!(coupon.is_exhausted(&CouponUsage {
            total_redemptions: 3,
            user_redemptions: 1
        }));
        assert!(coupon.is_exhausted(&CouponUsage {
            total_redemptions: 10,
            user_redemptions: 0
        }));
    }

    #[test]
    fn test_offer_strategies_parse() {
        let bxgy = offer(
            OfferType::BuyXGetY,
            json!({"buy_quantity": 2, "get_quantity": 1}),
        );
        match bxgy.strategy().unwrap() {
            OfferStrategy::BuyXGetY(c) => {
                assert_eq!(c.discount_type, RewardType::Free);
                assert_eq!(c.discount_value.bps(), 10_000);
                assert!(c.target_product_id.is_none());
            }
            other => panic!("unexpected strategy {other:?}"),
        }

        let shipping = offer(
            OfferType::ThresholdFreeShipping,
            json!({"threshold": "150.00"}),
        );
        assert_eq!(
            shipping.strategy().unwrap(),
            OfferStrategy::ThresholdFreeShipping(ThresholdFreeShipping {
                threshold: Money::from_cents(15_000)
            })
        );

        let bundle = offer(
            OfferType::BundleFixedPrice,
            json!({"bundle_price": 99, "required_product_ids": ["p1", "p2"]}),
        );
        let strategy = bundle.strategy().unwrap();
        assert_eq!(strategy.offer_type(), OfferType::BundleFixedPrice);
        assert_eq!(strategy.evaluate(Money::zero()), OfferOutcome::NotImplemented);
    }

    #[test]
    fn test_malformed_offer_config_is_rejected() {
        let missing = offer(OfferType::ThresholdGift, json!({"gift_product_ids": []}));
        assert!(matches!(
            missing.strategy(),
            Err(CoreError::InvalidOfferConfig { .. })
        ));

        let zero_buy = offer(
            OfferType::BuyXGetY,
            json!({"buy_quantity": 0, "get_quantity": 1}),
        );
        assert!(zero_buy.strategy().is_err());

        let empty_bundle = offer(
            OfferType::BundleFixedPrice,
            json!({"bundle_price": 50, "required_product_ids": []}),
        );
        assert!(empty_bundle.strategy().is_err());
    }
}
