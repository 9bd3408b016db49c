//! # Pricing Service
//!
//! Loads the active rule set and runs the order total compositor over it.
//! Every caller that shows or charges an amount comes through here.
//!
//! A rule query that fails doesn't fail the request: the cart is priced at
//! its subtotal and [`NOTE_RULES_UNAVAILABLE`] is added to the notes.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::warn;

use crate::config::PricingSettings;
use crate::error::ServiceResult;
use crate::pool::Database;
use crate::repository::promotion;
use souq_core::validation::normalize_coupon_code;
use souq_core::{compute_order_totals, LineItem, Money, OrderTotals, PricingCart, RuleSet};

pub const NOTE_RULES_UNAVAILABLE: &str = "promotions unavailable; priced at subtotal";

/// Rule set plus whether loading it failed.
#[derive(Debug, Clone, Default)]
pub(crate) struct LoadedRules {
    pub rules: RuleSet,
    pub degraded: bool,
}

/// Loads rules on `conn`, degrading to an empty set on error.
pub(crate) async fn load_rules_or_degrade(
    conn: &mut SqliteConnection,
    user_id: Option<&str>,
    exclude_order: Option<&str>,
) -> LoadedRules {
    match promotion::load_rules(conn, user_id, exclude_order).await {
        Ok(rules) => LoadedRules {
            rules,
            degraded: false,
        },
        Err(e) => {
            warn!(error = %e, ?user_id, "Failed to load promotion rules, pricing at subtotal");
            LoadedRules {
                rules: RuleSet::default(),
                degraded: true,
            }
        }
    }
}

/// Runs the compositor and records degradation in the notes.
pub(crate) fn compose(
    cart: &PricingCart,
    loaded: &LoadedRules,
    delivery_fee: Money,
) -> ServiceResult<OrderTotals> {
    let mut totals = compute_order_totals(cart, &loaded.rules, delivery_fee, Utc::now())?;
    if loaded.degraded {
        totals.pricing.notes.push(NOTE_RULES_UNAVAILABLE.to_string());
    }
    Ok(totals)
}

#[derive(Debug, Clone)]
pub struct PricingService {
    db: Database,
    settings: PricingSettings,
}

impl PricingService {
    pub fn new(db: Database, settings: PricingSettings) -> Self {
        PricingService { db, settings }
    }

    pub fn currency(&self) -> &str {
        &self.settings.currency
    }

    /// Configured flat delivery fee per store order.
    pub fn delivery_fee(&self) -> Money {
        self.settings.delivery_fee
    }

    /// Builds the engine cart for one store's lines.
    pub(crate) fn cart(
        &self,
        items: Vec<LineItem>,
        currency: &str,
        user_id: Option<&str>,
        coupon_code: Option<&str>,
    ) -> PricingCart {
        let cart = PricingCart::new(items, currency)
            .with_coupon(coupon_code.and_then(normalize_coupon_code));
        match user_id {
            Some(user_id) => cart.with_user(user_id),
            None => cart,
        }
    }

    /// Totals for `items` against the rules active now.
    ///
    /// ## Errors
    /// Only validation (negative fee) and compositor errors. A failing rule
    /// query degrades to subtotal pricing.
    pub async fn compute_order_totals(
        &self,
        user_id: Option<&str>,
        items: Vec<LineItem>,
        delivery_fee: Money,
        currency: Option<&str>,
        coupon_code: Option<&str>,
    ) -> ServiceResult<OrderTotals> {
        let currency = currency.unwrap_or(&self.settings.currency);
        let cart = self.cart(items, currency, user_id, coupon_code);

        let mut conn = self.db.pool().acquire().await?;
        let loaded = load_rules_or_degrade(&mut conn, user_id, None).await;
        drop(conn);

        compose(&cart, &loaded, delivery_fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::pool::DbConfig;
    use crate::repository::promotion::{NewCoupon, NewPromotion};
    use souq_core::{PromotionType, ValidationError};

    fn item(cents: i64, qty: i64) -> LineItem {
        LineItem {
            product_id: "p1".to_string(),
            variant_id: "v1".to_string(),
            store_id: "s1".to_string(),
            category_ids: Vec::new(),
            name: "Dates".to_string(),
            qty,
            unit_price: Money::from_cents(cents),
        }
    }

    async fn service() -> PricingService {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        PricingService::new(db, PricingSettings::default())
    }

    #[tokio::test]
    async fn test_applies_coupon_promotion() {
        let pricing = service().await;
        let promotions = pricing.db.promotions();
        let coupon = promotions
            .create_coupon(NewCoupon {
                code: "save10".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        promotions
            .create_promotion(
                NewPromotion::new("Ten off", PromotionType::CartPercentage, 1_000)
                    .requires_coupon(&coupon.id),
            )
            .await
            .unwrap();

        let totals = pricing
            .compute_order_totals(
                Some("u1"),
                vec![item(6_000, 3)],
                Money::from_cents(1_500),
                None,
                Some(" Save10 "),
            )
            .await
            .unwrap();

        assert_eq!(totals.subtotal, Money::from_cents(18_000));
        assert_eq!(totals.discounts_total, Money::from_cents(1_800));
        assert_eq!(totals.grand_total, Money::from_cents(17_700));
        assert_eq!(totals.pricing.redeemed_coupon_ids().count(), 1);
    }

    #[tokio::test]
    async fn test_degrades_when_rules_cannot_load() {
        let pricing = service().await;
        sqlx::query("DROP TABLE offers")
            .execute(pricing.db.pool())
            .await
            .unwrap();

        let totals = pricing
            .compute_order_totals(Some("u1"), vec![item(2_500, 2)], Money::zero(), None, None)
            .await
            .unwrap();

        assert_eq!(totals.grand_total, Money::from_cents(5_000));
        assert!(totals.discounts_total.is_zero());
        assert!(totals
            .pricing
            .notes
            .iter()
            .any(|note| note == NOTE_RULES_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_negative_delivery_fee_rejected() {
        let pricing = service().await;
        let err = pricing
            .compute_order_totals(None, vec![item(100, 1)], Money::from_cents(-1), None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::MustNotBeNegative { .. })
        ));
    }
}
