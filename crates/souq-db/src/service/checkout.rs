//! # Checkout Service
//!
//! Turns a customer's cart into one order per store, atomically.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate request                                                       │
//! │       │                                                                 │
//! │  BEGIN ─────────────────────────────────────────────────────────────┐   │
//! │  │  shipping snapshot   inline address, else saved (owner only)     │   │
//! │  │  cart lines          joined with live variant prices             │   │
//! │  │  per store:                                                      │   │
//! │  │     rules ──► totals ──► order ──► items ──► redemptions ──► hooks│   │
//! │  │  delete cart rows    fewer than read ⇒ ConcurrentCheckout        │   │
//! │  COMMIT ────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any error before COMMIT drops the transaction, which rolls back every
//! order, item and redemption and leaves the cart untouched.
//!
//! Rules are reloaded for each store inside the transaction, so a coupon
//! redeemed by the first store's order counts against the next one.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::pricing::{compose, load_rules_or_degrade, PricingService};
use crate::config::PricingSettings;
use crate::error::{ServiceError, ServiceResult};
use crate::events::OrderHooks;
use crate::pool::Database;
use crate::repository::{address, cart, order, promotion};
use souq_core::{
    CartLine, CheckoutRequest, LineItem, NewOrder, Order, OrderItem, PlacedOrder,
    ShippingSource, StoreQuote, ValidationError,
};

#[derive(Debug, Clone)]
pub struct CheckoutService {
    db: Database,
    pricing: PricingService,
    hooks: OrderHooks,
}

impl CheckoutService {
    pub fn new(db: Database, settings: PricingSettings, hooks: OrderHooks) -> Self {
        let pricing = PricingService::new(db.clone(), settings);
        CheckoutService { db, pricing, hooks }
    }

    /// Places one order per store in the user's cart and empties the cart.
    ///
    /// ## Errors
    /// - `Validation` for a malformed request
    /// - `AddressNotFound` when `address_id` isn't one of the user's
    /// - `EmptyCart` when there is nothing to buy
    /// - `Hook` when an `on_order_created` hook refuses the order
    /// - `ConcurrentCheckout` when another checkout consumed the cart first,
    ///   or the database stayed locked past the busy timeout
    pub async fn checkout(
        &self,
        user_id: &str,
        request: &CheckoutRequest,
    ) -> ServiceResult<Vec<PlacedOrder>> {
        self.place_orders(user_id, request)
            .await
            .map_err(|err| err.or_conflict(|| ServiceError::ConcurrentCheckout))
    }

    async fn place_orders(
        &self,
        user_id: &str,
        request: &CheckoutRequest,
    ) -> ServiceResult<Vec<PlacedOrder>> {
        request.validate()?;
        let coupon_code = request.coupon();

        let mut tx = self.db.pool().begin().await?;

        let shipping = match request.shipping_source() {
            Some(ShippingSource::Inline(address)) => address.clone(),
            Some(ShippingSource::Saved(address_id)) => {
                address::find_for_user(&mut tx, user_id, address_id)
                    .await?
                    .ok_or_else(|| ServiceError::AddressNotFound(address_id.to_string()))?
                    .snapshot()
            }
            None => {
                return Err(ValidationError::Required {
                    field: "address_id or shipping_address".to_string(),
                }
                .into())
            }
        };

        let lines = cart::load_lines(&mut tx, user_id).await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        let line_count = lines.len();
        let cart_item_ids: Vec<String> = lines.iter().map(|l| l.cart_item_id.clone()).collect();

        let by_store = group_by_store(lines);
        debug!(user_id, stores = by_store.len(), lines = line_count, "Checking out");

        let mut placed = Vec::with_capacity(by_store.len());
        for (store_id, lines) in by_store {
            let items: Vec<LineItem> = lines.iter().map(CartLine::to_line_item).collect();
            let pricing_cart = self.pricing.cart(
                items,
                self.pricing.currency(),
                Some(user_id),
                coupon_code.as_deref(),
            );
            let loaded = load_rules_or_degrade(&mut tx, Some(user_id), None).await;
            let totals = compose(&pricing_cart, &loaded, self.pricing.delivery_fee())?;

            let now = Utc::now();
            let new_order = Order::place(
                NewOrder {
                    store_id: &store_id,
                    user_id,
                    currency: self.pricing.currency(),
                    shipping_address: &shipping,
                    payment_method: request.payment_method,
                    note: request.note(),
                },
                &totals,
                now,
            );
            order::insert_order(&mut tx, &new_order).await?;

            let mut order_items = Vec::with_capacity(lines.len());
            for line in &lines {
                let item = OrderItem::snapshot(&new_order.id, line, now);
                order::insert_item(&mut tx, &item).await?;
                order_items.push(item);
            }

            let coupon_ids: Vec<String> =
                totals.pricing.redeemed_coupon_ids().map(str::to_string).collect();
            for coupon_id in &coupon_ids {
                promotion::record_redemption(&mut tx, coupon_id, user_id, &new_order.id, now)
                    .await?;
            }

            info!(
                order_id = %new_order.id,
                store_id = %store_id,
                grand_total = %totals.grand_total,
                discount = %totals.discounts_total,
                "Order created"
            );

            let placed_order = PlacedOrder {
                order: new_order,
                items: order_items,
                totals,
            };
            self.hooks.order_created(&placed_order)?;
            placed.push(placed_order);
        }

        let ids: Vec<&str> = cart_item_ids.iter().map(String::as_str).collect();
        let deleted = cart::delete_lines(&mut tx, user_id, &ids).await?;
        if deleted < line_count as u64 {
            warn!(user_id, read = line_count, deleted, "Cart consumed by a concurrent checkout");
            return Err(ServiceError::ConcurrentCheckout);
        }

        tx.commit().await?;
        info!(user_id, orders = placed.len(), "Checkout committed");

        Ok(placed)
    }

    /// Per-store totals for the current cart. Writes nothing.
    pub async fn preview(
        &self,
        user_id: &str,
        coupon_code: Option<&str>,
    ) -> ServiceResult<Vec<StoreQuote>> {
        let mut conn = self.db.pool().acquire().await?;

        let lines = cart::load_lines(&mut conn, user_id).await?;
        if lines.is_empty() {
            return Ok(Vec::new());
        }
        let loaded = load_rules_or_degrade(&mut conn, Some(user_id), None).await;
        drop(conn);

        let mut quotes = Vec::new();
        for (store_id, lines) in group_by_store(lines) {
            let items: Vec<LineItem> = lines.iter().map(CartLine::to_line_item).collect();
            let pricing_cart = self.pricing.cart(
                items.clone(),
                self.pricing.currency(),
                Some(user_id),
                coupon_code,
            );
            let totals = compose(&pricing_cart, &loaded, self.pricing.delivery_fee())?;
            quotes.push(StoreQuote {
                store_id,
                items,
                totals,
            });
        }

        Ok(quotes)
    }
}

/// Groups cart lines by store, keeping cart order inside each store.
fn group_by_store(lines: Vec<CartLine>) -> BTreeMap<String, Vec<CartLine>> {
    let mut by_store: BTreeMap<String, Vec<CartLine>> = BTreeMap::new();
    for line in lines {
        by_store
            .entry(line.store_id().to_string())
            .or_default()
            .push(line);
    }
    by_store
}
