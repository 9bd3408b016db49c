//! # Order Service
//!
//! Status transitions for placed orders, plus the staff tools: re-quoting an
//! order and adding items to it.
//!
//! ## Two Orthogonal Machines
//! ```text
//!   payment       PENDING_PAYMENT ──► PAID ──► REFUNDED
//!                        ├──► CANCELLED
//!                        └──► REFUNDED
//!
//!   fulfillment   PENDING ──► ACCEPTED ──► PREPARING ──► SHIPPED ──► DELIVERED
//!                    └──────────┴──► REJECTED
//! ```
//!
//! Each axis is checked on its own, then the configured [`StatusPolicy`]
//! judges the pair. The row is updated only if it still holds the status we
//! read, and `on_status_changed` hooks run before COMMIT.

use chrono::Utc;
use tracing::{info, warn};

use super::pricing::{compose, load_rules_or_degrade, PricingService};
use crate::config::PricingSettings;
use crate::error::{ServiceError, ServiceResult};
use crate::events::OrderHooks;
use crate::pool::Database;
use crate::repository::{catalog, order, promotion};
use souq_core::validation::validate_quantity;
use souq_core::{
    FulfillmentStatus, LineItem, Order, OrderItem, OrderItemStatus, OrderTotals, PaymentStatus,
    StatusChange, StatusPolicy,
};

/// Outcome of [`OrderService::add_items`].
#[derive(Debug, Clone)]
pub struct ItemsAdded {
    pub order: Order,
    /// New rows, frozen at the variants' current prices.
    pub added: Vec<OrderItem>,
    /// Variant ids left out: unknown, or sold by another store.
    pub skipped: Vec<String>,
    pub totals: OrderTotals,
}

/// A locked database while touching one order is that order's conflict.
fn busy_as_conflict(order_id: &str) -> impl FnOnce(ServiceError) -> ServiceError + '_ {
    move |err| err.or_conflict(|| ServiceError::ConcurrentUpdate(order_id.to_string()))
}

#[derive(Debug, Clone)]
pub struct OrderService {
    db: Database,
    pricing: PricingService,
    policy: StatusPolicy,
    hooks: OrderHooks,
}

impl OrderService {
    pub fn new(
        db: Database,
        settings: PricingSettings,
        policy: StatusPolicy,
        hooks: OrderHooks,
    ) -> Self {
        let pricing = PricingService::new(db.clone(), settings);
        OrderService {
            db,
            pricing,
            policy,
            hooks,
        }
    }

    pub fn policy(&self) -> StatusPolicy {
        self.policy
    }

    pub async fn update_payment_status(
        &self,
        order_id: &str,
        next: PaymentStatus,
    ) -> ServiceResult<Order> {
        self.set_payment_status(order_id, next)
            .await
            .map_err(busy_as_conflict(order_id))
    }

    pub async fn update_fulfillment_status(
        &self,
        order_id: &str,
        next: FulfillmentStatus,
    ) -> ServiceResult<Order> {
        self.set_fulfillment_status(order_id, next)
            .await
            .map_err(busy_as_conflict(order_id))
    }

    async fn set_payment_status(&self, order_id: &str, next: PaymentStatus) -> ServiceResult<Order> {
        let mut tx = self.db.pool().begin().await?;

        let mut order = order::fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;

        let from = order.payment_status;
        let to = from.transition(next)?;
        self.policy.check(to, order.fulfillment_status)?;

        let now = Utc::now();
        if !order::update_payment_status(&mut tx, order_id, from, to, now).await? {
            return Err(ServiceError::ConcurrentUpdate(order_id.to_string()));
        }
        order.payment_status = to;
        order.updated_at = now;

        self.hooks
            .status_changed(&order, StatusChange::Payment { from, to })?;
        tx.commit().await?;

        info!(order_id, %from, %to, "Payment status changed");
        Ok(order)
    }

    async fn set_fulfillment_status(
        &self,
        order_id: &str,
        next: FulfillmentStatus,
    ) -> ServiceResult<Order> {
        let mut tx = self.db.pool().begin().await?;

        let mut order = order::fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;

        let from = order.fulfillment_status;
        let to = from.transition(next)?;
        self.policy.check(order.payment_status, to)?;

        let now = Utc::now();
        if !order::update_fulfillment_status(&mut tx, order_id, from, to, now).await? {
            return Err(ServiceError::ConcurrentUpdate(order_id.to_string()));
        }
        order.fulfillment_status = to;
        order.updated_at = now;

        self.hooks
            .status_changed(&order, StatusChange::Fulfillment { from, to })?;
        tx.commit().await?;

        info!(order_id, %from, %to, "Fulfillment status changed");
        Ok(order)
    }

    /// Re-prices an order from its item snapshots, for the staff editor.
    ///
    /// Uses the order's own currency and delivery fee. Cancelled items are
    /// left out, and the order's own coupon redemption doesn't count against
    /// the coupon's limits. Nothing is written.
    pub async fn quote_order(
        &self,
        order_id: &str,
        coupon_code: Option<&str>,
    ) -> ServiceResult<OrderTotals> {
        let mut conn = self.db.pool().acquire().await?;

        let order = order::fetch_order(&mut conn, order_id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;
        let items: Vec<LineItem> = order::fetch_items(&mut conn, order_id)
            .await?
            .iter()
            .filter(|item| item.status == OrderItemStatus::Active)
            .map(|item| item.to_line_item(&order.store_id))
            .collect();

        let user_id = Some(order.user_id.as_str());
        let loaded = load_rules_or_degrade(&mut conn, user_id, Some(order_id)).await;
        drop(conn);

        let cart = self.pricing.cart(items, &order.currency, user_id, coupon_code);
        compose(&cart, &loaded, order.delivery_fee())
    }

    /// Adds `(variant_id, quantity)` pairs to an order and re-prices it.
    ///
    /// New rows take each variant's live price; existing rows keep their
    /// `price_at_purchase`. Variants that are unknown or belong to another
    /// store are skipped. Totals are recomputed over every active item with
    /// the order's currency and delivery fee, and the order's own coupon
    /// redemptions don't count against the coupon's limits. A coupon newly
    /// applied here is redeemed against this order.
    ///
    /// ## Errors
    /// - `Validation` for a quantity outside 1..=999 (nothing is written)
    /// - `OrderNotFound` for an unknown order
    /// - `ConcurrentUpdate` when the database stays locked
    pub async fn add_items(
        &self,
        order_id: &str,
        items: &[(&str, i64)],
        coupon_code: Option<&str>,
    ) -> ServiceResult<ItemsAdded> {
        self.insert_items(order_id, items, coupon_code)
            .await
            .map_err(busy_as_conflict(order_id))
    }

    async fn insert_items(
        &self,
        order_id: &str,
        items: &[(&str, i64)],
        coupon_code: Option<&str>,
    ) -> ServiceResult<ItemsAdded> {
        for &(_, qty) in items {
            validate_quantity(qty)?;
        }

        let mut tx = self.db.pool().begin().await?;

        let mut order = order::fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;

        let now = Utc::now();
        let mut added = Vec::with_capacity(items.len());
        let mut skipped = Vec::new();
        for &(variant_id, qty) in items {
            let variant = match catalog::find_variant(&mut tx, variant_id).await? {
                Some(variant) if variant.store_id == order.store_id => variant,
                Some(variant) => {
                    warn!(order_id, variant_id, store_id = %variant.store_id, "Skipping variant from another store");
                    skipped.push(variant_id.to_string());
                    continue;
                }
                None => {
                    warn!(order_id, variant_id, "Skipping unknown variant");
                    skipped.push(variant_id.to_string());
                    continue;
                }
            };
            let item = OrderItem::from_variant(order_id, &variant, qty, now);
            order::insert_item(&mut tx, &item).await?;
            added.push(item);
        }

        let lines: Vec<LineItem> = order::fetch_items(&mut tx, order_id)
            .await?
            .iter()
            .filter(|item| item.status == OrderItemStatus::Active)
            .map(|item| item.to_line_item(&order.store_id))
            .collect();

        let user_id = Some(order.user_id.as_str());
        let loaded = load_rules_or_degrade(&mut tx, user_id, Some(order_id)).await;
        let cart = self.pricing.cart(lines, &order.currency, user_id, coupon_code);
        let totals = compose(&cart, &loaded, order.delivery_fee())?;

        if !order::update_totals(&mut tx, order_id, &totals, now).await? {
            return Err(ServiceError::ConcurrentUpdate(order_id.to_string()));
        }

        let redeemed = promotion::fetch_redemptions(&mut tx, order_id).await?;
        for coupon_id in totals.pricing.redeemed_coupon_ids() {
            if redeemed.iter().all(|r| r.coupon_id != coupon_id) {
                promotion::record_redemption(&mut tx, coupon_id, &order.user_id, order_id, now)
                    .await?;
            }
        }

        tx.commit().await?;

        order.subtotal_cents = totals.subtotal.cents();
        order.discount_cents = totals.discounts_total.cents();
        order.grand_total_cents = totals.grand_total.cents();
        order.updated_at = now;

        info!(
            order_id,
            added = added.len(),
            skipped = skipped.len(),
            grand_total = %totals.grand_total,
            "Items added to order"
        );
        Ok(ItemsAdded {
            order,
            added,
            skipped,
            totals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{HookError, OrderEventHook};
    use crate::pool::DbConfig;
    use crate::repository::promotion::{NewCoupon, NewPromotion};
    use crate::service::CheckoutService;
    use serde_json::json;
    use souq_core::{CheckoutRequest, CoreError, Money, PromotionType};
    use std::sync::Mutex;

    const USER: &str = "u1";

    #[derive(Default)]
    struct RecordChanges(Mutex<Vec<StatusChange>>);

    impl OrderEventHook for RecordChanges {
        fn name(&self) -> &str {
            "record"
        }

        fn on_status_changed(&self, _order: &Order, change: StatusChange) -> Result<(), HookError> {
            self.0.lock().unwrap().push(change);
            Ok(())
        }
    }

    /// Places a single 2 × 40.00 order with a 10.00 delivery fee.
    async fn placed_order(db: &Database, coupon: Option<&str>) -> Order {
        let catalog = db.catalog();
        let store = catalog.create_store("Bayt Al Oud").await.unwrap();
        let product = catalog.create_product(&store.id, None, "Bakhoor").await.unwrap();
        let variant = catalog
            .create_variant(&product.id, None, 4_000, json!({"scent": "rose"}))
            .await
            .unwrap();
        db.carts().add_item(USER, &variant.id, 2).await.unwrap();

        let settings = PricingSettings {
            delivery_fee: Money::from_cents(1_000),
            ..Default::default()
        };
        let checkout = CheckoutService::new(db.clone(), settings, OrderHooks::new());
        let request = CheckoutRequest {
            shipping_address: Some(json!({"city": "Madinah"})),
            coupon_code: coupon.map(str::to_string),
            ..Default::default()
        };
        checkout
            .checkout(USER, &request)
            .await
            .unwrap()
            .remove(0)
            .order
    }

    fn service(db: &Database, policy: StatusPolicy, hooks: OrderHooks) -> OrderService {
        OrderService::new(db.clone(), PricingSettings::default(), policy, hooks)
    }

    #[tokio::test]
    async fn test_payment_and_fulfillment_transitions() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = placed_order(&db, None).await;
        let recorder = std::sync::Arc::new(RecordChanges::default());
        let mut hooks = OrderHooks::new();
        hooks.register(recorder.clone());
        let orders = service(&db, StatusPolicy::Permissive, hooks);

        let paid = orders
            .update_payment_status(&order.id, PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);

        for next in [FulfillmentStatus::Accepted, FulfillmentStatus::Preparing] {
            orders.update_fulfillment_status(&order.id, next).await.unwrap();
        }

        let stored = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(stored.fulfillment_status, FulfillmentStatus::Preparing);

        let changes = recorder.0.lock().unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(
            changes[0],
            StatusChange::Payment {
                from: PaymentStatus::PendingPayment,
                to: PaymentStatus::Paid
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = placed_order(&db, None).await;
        let orders = service(&db, StatusPolicy::Permissive, OrderHooks::new());

        let err = orders
            .update_fulfillment_status(&order.id, FulfillmentStatus::Shipped)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::InvalidTransition { .. })));

        let stored = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.fulfillment_status, FulfillmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_refunded_and_shipped() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = placed_order(&db, None).await;
        let permissive = service(&db, StatusPolicy::Permissive, OrderHooks::new());
        let strict = service(&db, StatusPolicy::Strict, OrderHooks::new());

        for next in [
            FulfillmentStatus::Accepted,
            FulfillmentStatus::Preparing,
            FulfillmentStatus::Shipped,
        ] {
            strict.update_fulfillment_status(&order.id, next).await.unwrap();
        }

        let err = strict
            .update_payment_status(&order.id, PaymentStatus::Refunded)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::IncoherentStatus { .. })));

        let refunded = permissive
            .update_payment_status(&order.id, PaymentStatus::Refunded)
            .await
            .unwrap();
        assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
        assert_eq!(refunded.fulfillment_status, FulfillmentStatus::Shipped);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let orders = service(&db, StatusPolicy::Permissive, OrderHooks::new());

        let err = orders
            .update_payment_status("missing", PaymentStatus::Paid)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::OrderNotFound(_)));
        assert!(orders.quote_order("missing", None).await.is_err());
    }

    #[tokio::test]
    async fn test_add_items_reprices_without_touching_snapshots() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = placed_order(&db, None).await;
        assert_eq!(order.grand_total(), Money::from_cents(9_000));

        let catalog = db.catalog();
        let existing = db.orders().items(&order.id).await.unwrap();
        let bakhoor = existing[0].variant_id.clone().unwrap();
        catalog.set_variant_price(&bakhoor, 4_500).await.unwrap();

        let product = catalog.create_product(&order.store_id, None, "Mabkhara").await.unwrap();
        let burner = catalog
            .create_variant(&product.id, None, 1_500, json!({"colour": "gold"}))
            .await
            .unwrap();
        let other_store = catalog.create_store("Elsewhere").await.unwrap();
        let product = catalog.create_product(&other_store.id, None, "Musk").await.unwrap();
        let foreign = catalog
            .create_variant(&product.id, None, 700, json!({}))
            .await
            .unwrap();

        let orders = service(&db, StatusPolicy::Permissive, OrderHooks::new());
        let result = orders
            .add_items(
                &order.id,
                &[(burner.id.as_str(), 2), (foreign.id.as_str(), 1), ("missing", 1)],
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.added.len(), 1);
        assert_eq!(result.added[0].price_at_purchase(), Money::from_cents(1_500));
        assert_eq!(result.skipped, vec![foreign.id.clone(), "missing".to_string()]);

        // 2 × 40.00 at the old snapshot + 2 × 15.00 new, plus the 10.00 fee
        assert_eq!(result.totals.subtotal, Money::from_cents(11_000));
        assert_eq!(result.totals.delivery_fee, Money::from_cents(1_000));
        assert_eq!(result.totals.grand_total, Money::from_cents(12_000));
        assert_eq!(result.order.grand_total(), Money::from_cents(12_000));

        let stored = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.subtotal(), Money::from_cents(11_000));
        assert_eq!(stored.grand_total(), Money::from_cents(12_000));
        assert_eq!(stored.delivery_fee(), Money::from_cents(1_000));
        assert!(stored.updated_at >= order.updated_at);

        let items = db.orders().items(&order.id).await.unwrap();
        assert_eq!(items.len(), 2);
        let old = items.iter().find(|i| i.id == existing[0].id).unwrap();
        assert_eq!(old.price_at_purchase(), Money::from_cents(4_000));
    }

    #[tokio::test]
    async fn test_add_items_applies_coupon_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let promotions = db.promotions();
        let coupon = promotions
            .create_coupon(NewCoupon {
                code: "ONCE".to_string(),
                usage_limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        promotions
            .create_promotion(
                NewPromotion::new("Ten percent", PromotionType::CartPercentage, 1_000)
                    .requires_coupon(&coupon.id),
            )
            .await
            .unwrap();

        let order = placed_order(&db, Some("once")).await;
        assert_eq!(order.discount(), Money::from_cents(800));
        let variant_id = db.orders().items(&order.id).await.unwrap()[0]
            .variant_id
            .clone()
            .unwrap();

        let orders = service(&db, StatusPolicy::Permissive, OrderHooks::new());
        let result = orders
            .add_items(&order.id, &[(variant_id.as_str(), 1)], Some("ONCE"))
            .await
            .unwrap();

        // the order's own redemption doesn't exhaust the single-use coupon
        assert_eq!(result.totals.subtotal, Money::from_cents(12_000));
        assert_eq!(result.totals.discounts_total, Money::from_cents(1_200));
        assert_eq!(result.totals.grand_total, Money::from_cents(11_800));
        assert_eq!(promotions.redemptions_for_order(&order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_items_rejects_bad_input() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = placed_order(&db, None).await;
        let variant_id = db.orders().items(&order.id).await.unwrap()[0]
            .variant_id
            .clone()
            .unwrap();
        let orders = service(&db, StatusPolicy::Permissive, OrderHooks::new());

        let err = orders
            .add_items(&order.id, &[(variant_id.as_str(), 1), (variant_id.as_str(), 0)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(db.orders().items(&order.id).await.unwrap().len(), 1);

        let err = orders
            .add_items("missing", &[(variant_id.as_str(), 1)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_quote_uses_snapshot_prices() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let promotions = db.promotions();
        let coupon = promotions
            .create_coupon(NewCoupon {
                code: "ONCE".to_string(),
                usage_limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        promotions
            .create_promotion(
                NewPromotion::new("Five off", PromotionType::CartFixedAmount, 500)
                    .requires_coupon(&coupon.id),
            )
            .await
            .unwrap();

        let order = placed_order(&db, Some("once")).await;
        assert_eq!(order.discount(), Money::from_cents(500));

        let items = db.orders().items(&order.id).await.unwrap();
        let variant_id = items[0].variant_id.clone().unwrap();
        db.catalog().set_variant_price(&variant_id, 9_999).await.unwrap();

        let orders = service(&db, StatusPolicy::Permissive, OrderHooks::new());
        let quote = orders.quote_order(&order.id, Some("ONCE")).await.unwrap();

        assert_eq!(quote.subtotal, Money::from_cents(8_000));
        assert_eq!(quote.delivery_fee, Money::from_cents(1_000));
        assert_eq!(quote.discounts_total, Money::from_cents(500));
        assert_eq!(quote.grand_total, order.grand_total());
    }
}
