//! # Promotion Repository
//!
//! Promotions, coupons, offers and coupon redemptions, plus the rule loader
//! that feeds the pricing engine.
//!
//! ## Rule Loading
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  promotions ──LEFT JOIN── coupons                                       │
//! │      │                       │                                          │
//! │      │                       └── COUNT(redemptions)  total / this user  │
//! │      └── EXISTS(promotion_scopes)                                       │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │  PromotionCandidate { promotion, coupon, coupon_usage, scoped }         │
//! │                                                                         │
//! │  offers ──► Offer (configuration parsed later by the engine)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A row the loader can't make sense of (unknown promotion or offer type) is
//! skipped with a warning; the rest of the rule set still loads.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use super::catalog::parse_json;
use crate::error::{DbError, DbResult};
use souq_core::promotion::DEFAULT_PRIORITY;
use souq_core::validation::normalize_coupon_code;
use souq_core::{
    new_id, Coupon, CouponRedemption, CouponUsage, Money, Offer, OfferType, Promotion,
    PromotionCandidate, PromotionType, RuleSet, ScopeTarget, ValidationError,
};

// =============================================================================
// Inputs
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct NewCoupon {
    pub code: String,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    pub limit_per_user: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewPromotion {
    pub name: String,
    pub promotion_type: PromotionType,
    /// Hundredths: basis points for percentages, cents for fixed amounts.
    pub value: i64,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub min_purchase: Option<Money>,
    pub priority: i64,
    pub stackable: bool,
    pub required_coupon_id: Option<String>,
}

impl NewPromotion {
    pub fn new(name: impl Into<String>, promotion_type: PromotionType, value: i64) -> Self {
        NewPromotion {
            name: name.into(),
            promotion_type,
            value,
            start_at: None,
            end_at: None,
            min_purchase: None,
            priority: DEFAULT_PRIORITY,
            stackable: true,
            required_coupon_id: None,
        }
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn min_purchase(mut self, amount: Money) -> Self {
        self.min_purchase = Some(amount);
        self
    }

    pub fn window(mut self, start_at: Option<DateTime<Utc>>, end_at: Option<DateTime<Utc>>) -> Self {
        self.start_at = start_at;
        self.end_at = end_at;
        self
    }

    pub fn requires_coupon(mut self, coupon_id: impl Into<String>) -> Self {
        self.required_coupon_id = Some(coupon_id.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct NewOffer {
    pub name: String,
    pub offer_type: OfferType,
    pub configuration: Value,
    pub priority: i64,
}

// =============================================================================
// Rows
// =============================================================================

/// Promotion joined with its coupon and redemption counts.
#[derive(Debug, sqlx::FromRow)]
struct CandidateRow {
    id: String,
    name: String,
    promotion_type: String,
    value: i64,
    active: bool,
    start_at: Option<DateTime<Utc>>,
    end_at: Option<DateTime<Utc>>,
    min_purchase_cents: Option<i64>,
    priority: i64,
    stackable: bool,
    required_coupon_id: Option<String>,
    created_at: DateTime<Utc>,
    coupon_code: Option<String>,
    coupon_active: Option<bool>,
    coupon_start_at: Option<DateTime<Utc>>,
    coupon_end_at: Option<DateTime<Utc>>,
    coupon_usage_limit: Option<i64>,
    coupon_limit_per_user: Option<i64>,
    coupon_created_at: Option<DateTime<Utc>>,
    total_redemptions: i64,
    user_redemptions: i64,
    scoped: bool,
}

impl TryFrom<CandidateRow> for PromotionCandidate {
    type Error = DbError;

    fn try_from(row: CandidateRow) -> DbResult<Self> {
        let promotion_type: PromotionType = row
            .promotion_type
            .parse()
            .map_err(|e| DbError::corrupt("promotion", &row.id, e))?;

        let coupon = match (&row.required_coupon_id, row.coupon_code) {
            (Some(coupon_id), Some(code)) => Some(Coupon {
                id: coupon_id.clone(),
                code,
                active: row.coupon_active.unwrap_or(false),
                start_at: row.coupon_start_at,
                end_at: row.coupon_end_at,
                usage_limit: row.coupon_usage_limit,
                limit_per_user: row.coupon_limit_per_user,
                created_at: row.coupon_created_at.unwrap_or(row.created_at),
            }),
            _ => None,
        };

        let promotion = Promotion {
            id: row.id,
            name: row.name,
            promotion_type,
            value: row.value,
            active: row.active,
            start_at: row.start_at,
            end_at: row.end_at,
            min_purchase_cents: row.min_purchase_cents,
            priority: row.priority,
            stackable: row.stackable,
            required_coupon_id: row.required_coupon_id,
            created_at: row.created_at,
        };

        let usage = CouponUsage {
            total_redemptions: row.total_redemptions,
            user_redemptions: row.user_redemptions,
        };

        let candidate = PromotionCandidate::new(promotion).scoped(row.scoped);
        Ok(match coupon {
            Some(coupon) => candidate.with_coupon(coupon, usage),
            None => candidate,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OfferRow {
    id: String,
    name: String,
    offer_type: String,
    configuration: String,
    active: bool,
    start_at: Option<DateTime<Utc>>,
    end_at: Option<DateTime<Utc>>,
    min_purchase_cents: Option<i64>,
    priority: i64,
    stackable: bool,
    required_coupon_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OfferRow> for Offer {
    type Error = DbError;

    fn try_from(row: OfferRow) -> DbResult<Self> {
        let offer_type: OfferType = row
            .offer_type
            .parse()
            .map_err(|e| DbError::corrupt("offer", &row.id, e))?;
        // Unparseable JSON still loads; the engine reports it as a bad config.
        let configuration = parse_json("offer", &row.id, &row.configuration).unwrap_or(Value::Null);

        Ok(Offer {
            id: row.id,
            name: row.name,
            offer_type,
            configuration,
            active: row.active,
            start_at: row.start_at,
            end_at: row.end_at,
            min_purchase_cents: row.min_purchase_cents,
            priority: row.priority,
            stackable: row.stackable,
            required_coupon_id: row.required_coupon_id,
            created_at: row.created_at,
        })
    }
}

const CANDIDATE_QUERY: &str = r#"
    SELECT
        p.id, p.name, p.promotion_type, p.value, p.active,
        p.start_at, p.end_at, p.min_purchase_cents, p.priority, p.stackable,
        p.required_coupon_id, p.created_at,
        c.code AS coupon_code,
        c.active AS coupon_active,
        c.start_at AS coupon_start_at,
        c.end_at AS coupon_end_at,
        c.usage_limit AS coupon_usage_limit,
        c.limit_per_user AS coupon_limit_per_user,
        c.created_at AS coupon_created_at,
        (SELECT COUNT(*) FROM coupon_redemptions r
            WHERE r.coupon_id = p.required_coupon_id
              AND (?2 IS NULL OR r.order_id <> ?2)) AS total_redemptions,
        (SELECT COUNT(*) FROM coupon_redemptions r
            WHERE r.coupon_id = p.required_coupon_id AND r.user_id = ?1
              AND (?2 IS NULL OR r.order_id <> ?2)) AS user_redemptions,
        EXISTS (SELECT 1 FROM promotion_scopes s WHERE s.promotion_id = p.id) AS scoped
    FROM promotions p
    LEFT JOIN coupons c ON c.id = p.required_coupon_id
    WHERE p.active = 1
    ORDER BY p.priority, p.id
"#;

const OFFER_QUERY: &str = r#"
    SELECT id, name, offer_type, configuration, active, start_at, end_at,
           min_purchase_cents, priority, stackable, required_coupon_id, created_at
    FROM offers
    WHERE active = 1
    ORDER BY priority, id
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for promotion database operations.
#[derive(Debug, Clone)]
pub struct PromotionRepository {
    pool: SqlitePool,
}

impl PromotionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PromotionRepository { pool }
    }

    /// Creates a coupon. The code is stored normalised (trimmed, upper case).
    pub async fn create_coupon(&self, new: NewCoupon) -> DbResult<Coupon> {
        let code = normalize_coupon_code(&new.code).ok_or_else(|| ValidationError::Required {
            field: "code".to_string(),
        })?;

        let coupon = Coupon {
            id: new_id(),
            code,
            active: true,
            start_at: new.start_at,
            end_at: new.end_at,
            usage_limit: new.usage_limit,
            limit_per_user: new.limit_per_user,
            created_at: Utc::now(),
        };
        debug!(id = %coupon.id, code = %coupon.code, "Creating coupon");

        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, active, start_at, end_at, usage_limit, limit_per_user, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&coupon.id)
        .bind(&coupon.code)
        .bind(coupon.active)
        .bind(coupon.start_at)
        .bind(coupon.end_at)
        .bind(coupon.usage_limit)
        .bind(coupon.limit_per_user)
        .bind(coupon.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: coupon.code.clone(),
            },
            other => other,
        })?;

        Ok(coupon)
    }

    /// Case-insensitive lookup.
    pub async fn find_coupon_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let Some(code) = normalize_coupon_code(code) else {
            return Ok(None);
        };
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            SELECT id, code, active, start_at, end_at, usage_limit, limit_per_user, created_at
            FROM coupons
            WHERE UPPER(code) = ?1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(coupon)
    }

    pub async fn set_coupon_active(&self, coupon_id: &str, active: bool) -> DbResult<()> {
        debug!(coupon_id, active, "Toggling coupon");
        sqlx::query("UPDATE coupons SET active = ?1 WHERE id = ?2")
            .bind(active)
            .bind(coupon_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_promotion(&self, new: NewPromotion) -> DbResult<Promotion> {
        let promotion = Promotion {
            id: new_id(),
            name: new.name,
            promotion_type: new.promotion_type,
            value: new.value,
            active: true,
            start_at: new.start_at,
            end_at: new.end_at,
            min_purchase_cents: new.min_purchase.map(|m| m.cents()),
            priority: new.priority,
            stackable: new.stackable,
            required_coupon_id: new.required_coupon_id,
            created_at: Utc::now(),
        };
        debug!(
            id = %promotion.id,
            promotion_type = %promotion.promotion_type,
            value = promotion.value,
            priority = promotion.priority,
            "Creating promotion"
        );

        sqlx::query(
            r#"
            INSERT INTO promotions (
                id, name, promotion_type, value, active, start_at, end_at,
                min_purchase_cents, priority, stackable, required_coupon_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&promotion.id)
        .bind(&promotion.name)
        .bind(promotion.promotion_type.as_str())
        .bind(promotion.value)
        .bind(promotion.active)
        .bind(promotion.start_at)
        .bind(promotion.end_at)
        .bind(promotion.min_purchase_cents)
        .bind(promotion.priority)
        .bind(promotion.stackable)
        .bind(&promotion.required_coupon_id)
        .bind(promotion.created_at)
        .execute(&self.pool)
        .await?;

        Ok(promotion)
    }

    pub async fn set_promotion_active(&self, promotion_id: &str, active: bool) -> DbResult<()> {
        debug!(promotion_id, active, "Toggling promotion");
        sqlx::query("UPDATE promotions SET active = ?1 WHERE id = ?2")
            .bind(active)
            .bind(promotion_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Restricts a promotion to a store, category, product or variant.
    /// Recorded only; pricing notes it but does not filter by it.
    pub async fn add_scope(
        &self,
        promotion_id: &str,
        target: ScopeTarget,
        target_id: &str,
    ) -> DbResult<()> {
        debug!(promotion_id, ?target, target_id, "Adding promotion scope");
        sqlx::query(
            "INSERT INTO promotion_scopes (promotion_id, target_kind, target_id) VALUES (?1, ?2, ?3)",
        )
        .bind(promotion_id)
        .bind(target)
        .bind(target_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_offer(&self, new: NewOffer) -> DbResult<Offer> {
        let offer = Offer {
            id: new_id(),
            name: new.name,
            offer_type: new.offer_type,
            configuration: new.configuration,
            active: true,
            start_at: None,
            end_at: None,
            min_purchase_cents: None,
            priority: new.priority,
            stackable: true,
            required_coupon_id: None,
            created_at: Utc::now(),
        };
        debug!(id = %offer.id, offer_type = %offer.offer_type, "Creating offer");

        sqlx::query(
            r#"
            INSERT INTO offers (
                id, name, offer_type, configuration, active, start_at, end_at,
                min_purchase_cents, priority, stackable, required_coupon_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&offer.id)
        .bind(&offer.name)
        .bind(offer.offer_type.as_str())
        .bind(offer.configuration.to_string())
        .bind(offer.active)
        .bind(offer.start_at)
        .bind(offer.end_at)
        .bind(offer.min_purchase_cents)
        .bind(offer.priority)
        .bind(offer.stackable)
        .bind(&offer.required_coupon_id)
        .bind(offer.created_at)
        .execute(&self.pool)
        .await?;

        Ok(offer)
    }

    pub async fn usage(&self, coupon_id: &str, user_id: &str) -> DbResult<CouponUsage> {
        let (total_redemptions, user_redemptions): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN user_id = ?2 THEN 1 ELSE 0 END), 0)
            FROM coupon_redemptions
            WHERE coupon_id = ?1
            "#,
        )
        .bind(coupon_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(CouponUsage {
            total_redemptions,
            user_redemptions,
        })
    }

    pub async fn redemptions_for_order(&self, order_id: &str) -> DbResult<Vec<CouponRedemption>> {
        let mut conn = self.pool.acquire().await?;
        fetch_redemptions(&mut conn, order_id).await
    }

    /// Every active rule, with coupon usage counted for `user_id`.
    pub async fn load_rules(&self, user_id: Option<&str>) -> DbResult<RuleSet> {
        let mut conn = self.pool.acquire().await?;
        load_rules(&mut conn, user_id, None).await
    }
}

// =============================================================================
// Connection-level operations
// =============================================================================

/// Loads the active rule set. Rows with an unknown type are skipped.
///
/// Redemptions made by `exclude_order` are left out of the usage counts, so
/// re-pricing an order doesn't count its own coupon against it.
pub(crate) async fn load_rules(
    conn: &mut SqliteConnection,
    user_id: Option<&str>,
    exclude_order: Option<&str>,
) -> DbResult<RuleSet> {
    let candidate_rows = sqlx::query_as::<_, CandidateRow>(CANDIDATE_QUERY)
        .bind(user_id)
        .bind(exclude_order)
        .fetch_all(&mut *conn)
        .await?;

    let mut promotions = Vec::with_capacity(candidate_rows.len());
    for row in candidate_rows {
        match PromotionCandidate::try_from(row) {
            Ok(candidate) => promotions.push(candidate),
            Err(err) => warn!(error = %err, "Skipping malformed promotion"),
        }
    }

    let offer_rows = sqlx::query_as::<_, OfferRow>(OFFER_QUERY)
        .fetch_all(&mut *conn)
        .await?;

    let mut offers = Vec::with_capacity(offer_rows.len());
    for row in offer_rows {
        match Offer::try_from(row) {
            Ok(offer) => offers.push(offer),
            Err(err) => warn!(error = %err, "Skipping malformed offer"),
        }
    }

    debug!(
        promotions = promotions.len(),
        offers = offers.len(),
        "Loaded pricing rules"
    );
    Ok(RuleSet { promotions, offers })
}

pub(crate) async fn fetch_redemptions(
    conn: &mut SqliteConnection,
    order_id: &str,
) -> DbResult<Vec<CouponRedemption>> {
    let redemptions = sqlx::query_as::<_, CouponRedemption>(
        r#"
        SELECT id, coupon_id, user_id, order_id, redeemed_at
        FROM coupon_redemptions
        WHERE order_id = ?1
        ORDER BY id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(redemptions)
}

pub(crate) async fn record_redemption(
    conn: &mut SqliteConnection,
    coupon_id: &str,
    user_id: &str,
    order_id: &str,
    now: DateTime<Utc>,
) -> DbResult<CouponRedemption> {
    let redemption = CouponRedemption {
        id: new_id(),
        coupon_id: coupon_id.to_string(),
        user_id: user_id.to_string(),
        order_id: order_id.to_string(),
        redeemed_at: now,
    };
    debug!(coupon_id, order_id, user_id, "Recording coupon redemption");

    sqlx::query(
        r#"
        INSERT INTO coupon_redemptions (id, coupon_id, user_id, order_id, redeemed_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&redemption.id)
    .bind(&redemption.coupon_id)
    .bind(&redemption.user_id)
    .bind(&redemption.order_id)
    .bind(redemption.redeemed_at)
    .execute(&mut *conn)
    .await?;

    Ok(redemption)
}

// =============================================================================
// Unit Tests
// =============================================================================
