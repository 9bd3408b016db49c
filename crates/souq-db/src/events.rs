//! # Order Event Hooks
//!
//! Explicit callbacks fired from inside the order transactions.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CheckoutService::checkout                                              │
//! │    BEGIN                                                                │
//! │      INSERT order, items, redemptions                                   │
//! │      hooks.order_created(&placed) ──► hook 1 ──► hook 2 ──► ...         │
//! │                                          │                              │
//! │                                          └── Err ──► ROLLBACK           │
//! │    COMMIT                                                               │
//! │                                                                         │
//! │  OrderService::update_*_status                                          │
//! │    BEGIN ─ UPDATE ─ hooks.status_changed(&order, change) ─ COMMIT       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Hooks run synchronously and in registration order. A hook that needs to do
//! slow work should hand it off (channel, outbox table) and return quickly.

use souq_core::{Order, PlacedOrder, StatusChange};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
#[error("hook '{hook}' failed: {message}")]
pub struct HookError {
    pub hook: String,
    pub message: String,
}

impl HookError {
    pub fn new(hook: impl Into<String>, message: impl Into<String>) -> Self {
        HookError {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

/// Observer of order lifecycle events.
///
/// All methods default to a no-op, so implementors only override what they
/// need.
pub trait OrderEventHook: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Called once per store order, before the checkout commits.
    fn on_order_created(&self, _placed: &PlacedOrder) -> Result<(), HookError> {
        Ok(())
    }

    /// Called after a status column changed, before the update commits.
    fn on_status_changed(&self, _order: &Order, _change: StatusChange) -> Result<(), HookError> {
        Ok(())
    }
}

/// Ordered list of hooks shared by the services.
#[derive(Clone, Default)]
pub struct OrderHooks {
    hooks: Vec<Arc<dyn OrderEventHook>>,
}

impl OrderHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn OrderEventHook>) {
        self.hooks.push(hook);
    }

    pub fn with(mut self, hook: impl OrderEventHook + 'static) -> Self {
        self.register(Arc::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Stops at the first failing hook.
    pub fn order_created(&self, placed: &PlacedOrder) -> Result<(), HookError> {
        self.hooks
            .iter()
            .try_for_each(|hook| hook.on_order_created(placed))
    }

    pub fn status_changed(&self, order: &Order, change: StatusChange) -> Result<(), HookError> {
        self.hooks
            .iter()
            .try_for_each(|hook| hook.on_status_changed(order, change))
    }
}

impl std::fmt::Debug for OrderHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| h.name()))
            .finish()
    }
}

/// Logs every event at INFO.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHook;

impl OrderEventHook for TracingHook {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_order_created(&self, placed: &PlacedOrder) -> Result<(), HookError> {
        info!(
            order_id = %placed.order.id,
            store_id = %placed.order.store_id,
            items = placed.items.len(),
            grand_total = %placed.order.grand_total(),
            "Order created"
        );
        Ok(())
    }

    fn on_status_changed(&self, order: &Order, change: StatusChange) -> Result<(), HookError> {
        info!(order_id = %order.id, ?change, "Order status changed");
        Ok(())
    }
}
