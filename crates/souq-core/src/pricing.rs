//! # Pricing Engine
//!
//! Pure evaluation of a cart against a pre-loaded [`RuleSet`].
//!
//! ## Evaluation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  subtotal = Σ unit_price × qty                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  cart-level promotions, sorted (priority ASC, id ASC)                   │
//! │       │                                                                 │
//! │       │  for each:                                                      │
//! │       │    inactive / outside [start, end]          → skip              │
//! │       │    coupon gate not satisfied                → skip              │
//! │       │    subtotal < min_purchase                  → skip              │
//! │       │    value ≤ 0 / discount rounds to 0         → skip              │
//! │       │    otherwise                                → APPLY, stop       │
//! │       ▼                                                                 │
//! │  offers → parsed, reported in notes, no price effect                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  grand_total = subtotal − discounts_total + shipping                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! At most one promotion applies per cart, whatever `stackable` says.
//! Discount never exceeds subtotal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ts_rs::TS;

use crate::cart::PricingCart;
use crate::error::CoreResult;
use crate::money::Money;
use crate::promotion::{OfferOutcome, PromotionCandidate, PromotionType, RuleSet};
use crate::validation::normalize_coupon_code;

pub const NOTE_BASIS: &str = "subtotal + minimal cart promotions";
pub const NOTE_NO_STACKING: &str = "no stacking; first applicable cart-level promotion only";

// =============================================================================
// Result types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Promotion,
    Offer,
}

/// Extra facts about an applied rule, kept for receipts and audits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RuleMeta {
    pub promotion_type: PromotionType,
    pub priority: i64,
    pub stackable: bool,
    /// Code of the gating coupon, as stored.
    pub required_coupon: Option<String>,
    /// Id of the gating coupon; checkout records a redemption against it.
    pub coupon_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppliedRule {
    pub rule_type: RuleType,
    pub rule_id: String,
    pub name: String,
    pub amount: Money,
    pub meta: RuleMeta,
}

/// Output of [`price_cart`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricingResult {
    pub subtotal: Money,
    pub discounts_total: Money,
    /// Always zero here; delivery is added by the order total compositor.
    pub shipping: Money,
    pub grand_total: Money,
    pub applied_rules: Vec<AppliedRule>,
    /// Per-variant discounts. Empty until product-level rules are evaluated.
    pub line_discounts: BTreeMap<String, Money>,
    pub free_shipping: bool,
    pub gifts: Vec<String>,
    pub notes: Vec<String>,
}

impl PricingResult {
    /// Subtotal with nothing applied.
    pub fn subtotal_only(subtotal: Money) -> Self {
        PricingResult {
            subtotal,
            discounts_total: Money::zero(),
            shipping: Money::zero(),
            grand_total: subtotal,
            applied_rules: Vec::new(),
            line_discounts: BTreeMap::new(),
            free_shipping: false,
            gifts: Vec::new(),
            notes: vec![NOTE_BASIS.to_string(), NOTE_NO_STACKING.to_string()],
        }
    }

    /// Ids of the coupons this pricing consumed.
    pub fn redeemed_coupon_ids(&self) -> impl Iterator<Item = &str> {
        self.applied_rules
            .iter()
            .filter_map(|rule| rule.meta.coupon_id.as_deref())
    }

    fn apply(&mut self, rule: AppliedRule) {
        self.discounts_total += rule.amount;
        self.grand_total = self.subtotal - self.discounts_total + self.shipping;
        self.applied_rules.push(rule);
    }
}

// =============================================================================
// Skip reasons
// =============================================================================

/// Why a promotion did not apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Inactive,
    NotCartLevel,
    OutsideWindow,
    /// Promotion needs a coupon and the cart carries none.
    CouponMissing,
    /// The gating coupon row was not loaded.
    CouponUnavailable,
    CouponMismatch,
    CouponInactive,
    CouponExhausted,
    BelowMinimumPurchase,
    NonPositiveValue,
    ZeroDiscount,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::Inactive => "inactive",
            SkipReason::NotCartLevel => "not a cart-level promotion",
            SkipReason::OutsideWindow => "outside its active window",
            SkipReason::CouponMissing => "requires a coupon",
            SkipReason::CouponUnavailable => "required coupon not found",
            SkipReason::CouponMismatch => "coupon code does not match",
            SkipReason::CouponInactive => "coupon inactive or expired",
            SkipReason::CouponExhausted => "coupon usage limit reached",
            SkipReason::BelowMinimumPurchase => "subtotal below minimum purchase",
            SkipReason::NonPositiveValue => "value is not positive",
            SkipReason::ZeroDiscount => "discount rounds to zero",
        };
        f.write_str(text)
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Judges one promotion against a subtotal.
///
/// `coupon_code` must already be normalised (see
/// [`normalize_coupon_code`]).
pub fn evaluate_promotion(
    candidate: &PromotionCandidate,
    subtotal: Money,
    coupon_code: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Money, SkipReason> {
    let promo = &candidate.promotion;

    if !promo.active {
        return Err(SkipReason::Inactive);
    }
    if !promo.promotion_type.is_cart_level() {
        return Err(SkipReason::NotCartLevel);
    }
    if !promo.is_live(now) {
        return Err(SkipReason::OutsideWindow);
    }

    if promo.required_coupon_id.is_some() {
        let code = coupon_code.ok_or(SkipReason::CouponMissing)?;
        let coupon = candidate
            .coupon
            .as_ref()
            .ok_or(SkipReason::CouponUnavailable)?;
        if !coupon.matches_code(code) {
            return Err(SkipReason::CouponMismatch);
        }
        if !coupon.is_live(now) {
            return Err(SkipReason::CouponInactive);
        }
        if coupon.is_exhausted(&candidate.coupon_usage) {
            return Err(SkipReason::CouponExhausted);
        }
    }

    if let Some(min) = promo.min_purchase() {
        if min.is_positive() && subtotal < min {
            return Err(SkipReason::BelowMinimumPurchase);
        }
    }

    if promo.value <= 0 {
        return Err(SkipReason::NonPositiveValue);
    }

    let discount = match promo.promotion_type {
        PromotionType::CartPercentage => subtotal.percentage_of(promo.percentage()),
        PromotionType::CartFixedAmount => promo.amount().min(subtotal),
        PromotionType::ProductPercentage | PromotionType::ProductFixedAmount => Money::zero(),
    };

    if !discount.is_positive() {
        return Err(SkipReason::ZeroDiscount);
    }

    Ok(discount)
}

/// Prices a cart.
///
/// A rule that cannot be evaluated is skipped. The only failure is a
/// subtotal that does not fit in [`Money`].
pub fn price_cart(
    cart: &PricingCart,
    rules: &RuleSet,
    now: DateTime<Utc>,
) -> CoreResult<PricingResult> {
    let subtotal = cart.subtotal()?;
    let mut result = PricingResult::subtotal_only(subtotal);
    let coupon_code = cart.coupon_code.as_deref().and_then(normalize_coupon_code);

    let mut candidates: Vec<&PromotionCandidate> = rules
        .promotions
        .iter()
        .filter(|c| c.promotion.active && c.promotion.promotion_type.is_cart_level())
        .collect();
    candidates.sort_by(|a, b| {
        (a.promotion.priority, &a.promotion.id).cmp(&(b.promotion.priority, &b.promotion.id))
    });

    for candidate in candidates {
        let Ok(amount) = evaluate_promotion(candidate, subtotal, coupon_code.as_deref(), now)
        else {
            continue;
        };

        let promo = &candidate.promotion;
        if candidate.scoped {
            result.notes.push(format!(
                "promotion '{}' has scope restrictions that are not enforced",
                promo.name
            ));
        }
        result.apply(AppliedRule {
            rule_type: RuleType::Promotion,
            rule_id: promo.id.clone(),
            name: promo.name.clone(),
            amount,
            meta: RuleMeta {
                promotion_type: promo.promotion_type,
                priority: promo.priority,
                stackable: promo.stackable,
                required_coupon: candidate.coupon.as_ref().map(|c| c.code.clone()),
                coupon_id: promo.required_coupon_id.clone(),
            },
        });
        break;
    }

    let mut offers: Vec<_> = rules.offers.iter().filter(|o| o.is_live(now)).collect();
    offers.sort_by(|a, b| (a.priority, &a.id).cmp(&(b.priority, &b.id)));
    for offer in offers {
        match offer.strategy() {
            Ok(strategy) => match strategy.evaluate(subtotal) {
                OfferOutcome::NotImplemented => result.notes.push(format!(
                    "offer '{}' ({}) not applied: evaluation not implemented",
                    offer.name, offer.offer_type
                )),
            },
            Err(err) => result
                .notes
                .push(format!("offer '{}' skipped: {}", offer.name, err)),
        }
    }

    Ok(result)
}

// =============================================================================
// Unit Tests
// =============================================================================
