//! # Repository Module
//!
//! Database repository implementations for the marketplace.
//!
//! ## Two Access Styles
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Repository methods            Connection-level functions               │
//! │  ──────────────────            ──────────────────────────               │
//! │  db.carts().add_item(..)       cart::load_lines(&mut tx, user)          │
//! │  db.orders().get(id)           order::insert_order(&mut tx, &order)     │
//! │       │                                     │                           │
//! │       ▼                                     ▼                           │
//! │  own pooled connection         caller's transaction (checkout, status)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Stores, products, variants
//! - [`CartRepository`](cart::CartRepository) - Cart rows
//! - [`AddressRepository`](address::AddressRepository) - Saved addresses
//! - [`PromotionRepository`](promotion::PromotionRepository) - Promotions, coupons, offers
//! - [`OrderRepository`](order::OrderRepository) - Placed orders

pub mod address;
pub mod cart;
pub mod catalog;
pub mod order;
pub mod promotion;
