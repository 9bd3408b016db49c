//! # Services
//!
//! Operations that span several repositories and own their transaction.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CheckoutService ──► checkout / preview                                 │
//! │        │                                                                │
//! │        ├──► PricingService (rules + compute_order_totals)               │
//! │        └──► OrderHooks (on_order_created)                               │
//! │                                                                         │
//! │  OrderService ──► payment / fulfillment transitions, staff quote        │
//! │        ├──► PricingService                                              │
//! │        └──► OrderHooks (on_status_changed)                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod checkout;
pub mod orders;
pub mod pricing;

pub use checkout::CheckoutService;
pub use orders::{ItemsAdded, OrderService};
pub use pricing::PricingService;
