//! # Money Module
//!
//! `Money` and `Percentage`, the two numeric types every price flows through.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌                                  │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units (halalas, cents)                     │
//! │    185.00 SAR  →  Money(18500)                                          │
//! │    Sums are exact. Only percentages ever round, once, half-up.         │
//! │                                                                         │
//! │  At the JSON boundary amounts are decimal strings: "185.00".           │
//! │  Incoming strings or numbers are rounded half-up to 2 places.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use souq_core::money::{Money, Percentage};
//!
//! let price = Money::from_cents(6000);          // 60.00
//! let subtotal = price.multiply_quantity(3)?;   // 180.00
//! let off = subtotal.percentage_of(Percentage::from_bps(1000)); // 10%
//! assert_eq!(off.cents(), 1800);
//! assert_eq!(subtotal.to_string(), "180.00");
//! # Ok::<(), souq_core::CoreError>(())
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

/// Fixed scale for every amount: two decimal places.
pub const MONEY_SCALE: u32 = 2;

fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in minor units (two decimal places).
///
/// ## Where Money is Used
/// ```text
/// ProductVariant.price_cents ──► LineItem.unit_price ──► line total
///                                                           │
///                          PricingResult.subtotal ◄─────────┘
///                                   │
///                     − discounts_total + delivery_fee
///                                   │
///                                   ▼
///                         Order.grand_total_cents
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[serde(try_from = "Decimal", into = "Decimal")]
#[ts(export)]
pub struct Money(#[ts(type = "string")] i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Converts a decimal amount, rounding half-up to two places.
    ///
    /// ```rust
    /// use rust_decimal::Decimal;
    /// use souq_core::money::Money;
    ///
    /// let m = Money::from_decimal(Decimal::new(10005, 3)).unwrap(); // 10.005
    /// assert_eq!(m.cents(), 1001);
    /// ```
    pub fn from_decimal(amount: Decimal) -> CoreResult<Self> {
        round_half_up(amount)
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|minor| minor.to_i64())
            .map(Money)
            .ok_or_else(|| CoreError::MoneyOutOfRange(amount.to_string()))
    }

    /// Returns the value as a two-place decimal.
    #[inline]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, MONEY_SCALE)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Unit price × quantity.
    ///
    /// Fails with [`CoreError::MoneyOutOfRange`] instead of wrapping.
    pub fn multiply_quantity(&self, qty: i64) -> CoreResult<Self> {
        self.0
            .checked_mul(qty)
            .map(Money)
            .ok_or_else(|| CoreError::MoneyOutOfRange(format!("{self} × {qty}")))
    }

    /// Addition that fails with [`CoreError::MoneyOutOfRange`] on overflow.
    pub fn checked_add(self, other: Money) -> CoreResult<Self> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| CoreError::MoneyOutOfRange(format!("{self} + {other}")))
    }

    /// Sums amounts, failing on the first overflow.
    pub fn try_sum<I>(amounts: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = CoreResult<Money>>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |total, amount| total.checked_add(amount?))
    }

    /// Returns `pct` of this amount, rounded half-up to the minor unit.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps ± 5000) / 10000`, the ±5000 pushing
    /// exact halves away from zero.
    ///
    /// ```rust
    /// use souq_core::money::{Money, Percentage};
    ///
    /// // 10.10 × 5% = 0.505 → 0.51
    /// let off = Money::from_cents(1010).percentage_of(Percentage::from_bps(500));
    /// assert_eq!(off.cents(), 51);
    /// ```
    pub fn percentage_of(&self, pct: Percentage) -> Money {
        // i128 so large subtotals × 10000 cannot overflow
        let scaled = self.0 as i128 * pct.bps() as i128;
        let rounded = if scaled >= 0 {
            (scaled + 5000) / 10000
        } else {
            (scaled - 5000) / 10000
        };
        Money(rounded as i64)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl FromStr for Money {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str(s.trim()).map_err(|e| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: e.to_string(),
        })?;
        Money::from_decimal(amount)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = CoreError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Money::from_decimal(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.to_decimal()
    }
}

// The operators saturate. Totals that must be exact go through
// `multiply_quantity`, `checked_add` and `try_sum`.

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

// =============================================================================
// Percentage
// =============================================================================

/// A percentage in basis points, clamped to `[0, 100%]`.
///
/// 1 bps = 0.01%, so a promotion value of `10.00` (percent) is 1000 bps.
/// Serialized as a decimal percent string ("12.50").
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[serde(from = "Decimal", into = "Decimal")]
#[ts(export)]
pub struct Percentage(#[ts(type = "string")] u32);

impl Percentage {
    /// 100% in basis points.
    pub const FULL_BPS: u32 = 10_000;

    /// Creates a percentage from basis points, clamping into `[0, 10000]`.
    pub fn from_bps(bps: i64) -> Self {
        Percentage(bps.clamp(0, Self::FULL_BPS as i64) as u32)
    }

    /// Creates a percentage from a decimal percent (`12.5` → 1250 bps).
    pub fn from_decimal(pct: Decimal) -> Self {
        let bps = round_half_up(pct)
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|b| b.to_i64())
            .unwrap_or(if pct.is_sign_negative() { 0 } else { i64::MAX });
        Percentage::from_bps(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns the percent as a two-place decimal (`1250` → `12.50`).
    #[inline]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0 as i64, MONEY_SCALE)
    }
}

impl From<Decimal> for Percentage {
    fn from(pct: Decimal) -> Self {
        Percentage::from_decimal(pct)
    }
}

impl From<Percentage> for Decimal {
    fn from(pct: Percentage) -> Self {
        pct.to_decimal()
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.to_decimal())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_two_place_decimal() {
        assert_eq!(Money::from_cents(18500).to_string(), "185.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_from_decimal_rounds_half_up() {
        let cases = [
            ("10.005", 1001),
            ("10.004", 1000),
            ("2.675", 268),
            ("185", 18500),
            ("0.1", 10),
        ];
        for (input, expected) in cases {
            let money: Money = input.parse().unwrap();
            assert_eq!(money.cents(), expected, "parsing {input}");
        }
    }

    #[test]
    fn test_from_str_rejects_garbage() {
        let err = "twelve".parse::<Money>().unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_from_decimal_out_of_range() {
        let huge = Decimal::MAX;
        assert!(matches!(
            Money::from_decimal(huge),
            Err(CoreError::MoneyOutOfRange(_))
        ));
    }

    #[test]
    fn test_json_uses_decimal_strings() {
        let json = serde_json::to_string(&Money::from_cents(18500)).unwrap();
        assert_eq!(json, "\"185.00\"");

        let parsed: Money = serde_json::from_str("\"12.345\"").unwrap();
        assert_eq!(parsed.cents(), 1235);

        let from_number: Money = serde_json::from_str("3").unwrap();
        assert_eq!(from_number.cents(), 300);
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(250);
        assert_eq!((a + b).cents(), 1250);
        assert_eq!((a - b).cents(), 750);
        assert_eq!(a.multiply_quantity(3).unwrap().cents(), 3000);

        let total = Money::try_sum([a, b, b].into_iter().map(Ok)).unwrap();
        assert_eq!(total.cents(), 1500);
        let empty = Money::try_sum(Vec::<CoreResult<Money>>::new()).unwrap();
        assert!(empty.is_zero());
    }

    #[test]
    fn test_overflow_is_an_error_not_a_panic() {
        let half = Money::from_cents(i64::MAX / 2);
        assert!(matches!(
            half.multiply_quantity(3),
            Err(CoreError::MoneyOutOfRange(_))
        ));
        assert!(matches!(
            half.checked_add(half).and_then(|m| m.checked_add(half)),
            Err(CoreError::MoneyOutOfRange(_))
        ));
        assert!(matches!(
            Money::try_sum([Ok(half), Ok(half), Ok(half)]),
            Err(CoreError::MoneyOutOfRange(_))
        ));

        // Operators saturate rather than wrap.
        assert_eq!((half + half + half).cents(), i64::MAX);
        assert_eq!((Money::from_cents(i64::MIN) - half).cents(), i64::MIN);
    }

    #[test]
    fn test_percentage_of_rounding() {
        // 180.00 × 10% = 18.00
        let off = Money::from_cents(18000).percentage_of(Percentage::from_bps(1000));
        assert_eq!(off.cents(), 1800);

        // 10.05 × 5% = 0.5025 → 0.50
        let off = Money::from_cents(1005).percentage_of(Percentage::from_bps(500));
        assert_eq!(off.cents(), 50);

        // 0.10 × 5% = 0.005 → 0.01 (half-up)
        let off = Money::from_cents(10).percentage_of(Percentage::from_bps(500));
        assert_eq!(off.cents(), 1);

        let all = Money::from_cents(999).percentage_of(Percentage::from_bps(10_000));
        assert_eq!(all.cents(), 999);
    }

    #[test]
    fn test_percentage_clamps() {
        assert_eq!(Percentage::from_bps(15_000).bps(), 10_000);
        assert_eq!(Percentage::from_bps(-5).bps(), 0);
        assert_eq!(Percentage::from_decimal(Decimal::new(125, 1)).bps(), 1250);
        assert_eq!(Percentage::from_decimal(Decimal::new(150, 0)).bps(), 10_000);
        assert_eq!(Percentage::from_bps(1250).to_string(), "12.50%");
    }
}
