//! # souq-db: Persistence and Services for the Souq Marketplace
//!
//! SQLite storage (via sqlx) for the catalog, carts, promotions and orders,
//! plus the services that price carts and place orders transactionally.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Souq Data Flow                                   │
//! │                                                                         │
//! │  HTTP handler / CLI (checkout, preview, status update)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     souq-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Services    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │               │    │               │    │  (embedded)  │  │   │
//! │  │   │ Checkout      │───►│ Catalog, Cart │    │              │  │   │
//! │  │   │ Orders        │    │ Address       │    │ 001_initial  │  │   │
//! │  │   │ Pricing       │    │ Promotion     │    │   _schema    │  │   │
//! │  │   │   │           │    │ Order         │    │              │  │   │
//! │  │   └───┼───────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │       │                        │                               │   │
//! │  │       ▼                        ▼                               │   │
//! │  │   souq-core              Database (pool.rs)                    │   │
//! │  │   price_cart             SqlitePool, WAL, foreign keys         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and service error types
//! - [`repository`] - Table-level access (catalog, cart, address, promotion, order)
//! - [`service`] - Checkout, order status and pricing services
//! - [`events`] - Hooks fired when orders are created or change status
//! - [`config`] - TOML + environment configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use souq_db::{CheckoutService, Database, MarketConfig, OrderHooks};
//!
//! let config = MarketConfig::load(Some("souq.toml".as_ref()))?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let checkout = CheckoutService::new(db.clone(), config.pricing.clone(), OrderHooks::new());
//! let quotes = checkout.preview("user-1", Some("WELCOME")).await?;
//! let orders = checkout.checkout("user-1", &request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod events;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, MarketConfig};
pub use error::{DbError, DbResult, ServiceError, ServiceResult};
pub use events::{HookError, OrderEventHook, OrderHooks, TracingHook};
pub use pool::{Database, DbConfig};
pub use service::{CheckoutService, ItemsAdded, OrderService, PricingService};

// Repository re-exports for convenience
pub use repository::address::AddressRepository;
pub use repository::cart::CartRepository;
pub use repository::catalog::CatalogRepository;
pub use repository::order::OrderRepository;
pub use repository::promotion::PromotionRepository;
