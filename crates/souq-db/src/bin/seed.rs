//! # Demo Marketplace Seeder
//!
//! Builds a small two-store marketplace, prices a cart and checks it out.
//! Handy for eyeballing the pricing notes and the per-store split.
//!
//! ## Usage
//! ```bash
//! # In-memory database, default settings
//! cargo run -p souq-db --bin seed
//!
//! # Persist to a file, load settings from TOML
//! cargo run -p souq-db --bin seed -- --db ./souq_dev.db --config ./souq.toml
//!
//! # More logging
//! RUST_LOG=debug cargo run -p souq-db --bin seed
//! ```

use std::env;
use std::path::PathBuf;

use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use souq_core::{CheckoutRequest, Money, PaymentMethod, PaymentStatus, PromotionType, ScopeTarget};
use souq_db::repository::address::NewAddress;
use souq_db::repository::promotion::{NewCoupon, NewPromotion};
use souq_db::{
    CheckoutService, Database, MarketConfig, OrderHooks, OrderService, TracingHook,
};

const DEMO_USER: &str = "demo-customer";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,souq=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Souq demo seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  TOML settings file");
                println!("  -d, --db <PATH>      Database file (default: in-memory)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = MarketConfig::load(config_path.as_deref())?;
    config.database.path = db_path.unwrap_or_else(|| ":memory:".to_string());

    let db = Database::new(config.db_config()).await?;
    info!(path = %config.database.path, "Database ready");

    // Catalog
    let catalog = db.catalog();
    let dates_store = catalog.create_store("Tamr House").await?;
    let oud_store = catalog.create_store("Oud Corner").await?;
    let sweets = catalog.create_category("Sweets").await?;

    let ajwa = catalog
        .create_product(&dates_store.id, Some(&sweets.id), "Ajwa Dates")
        .await?;
    let ajwa_1kg = catalog
        .create_variant(&ajwa.id, Some("AJWA-1KG"), 6_000, json!({"size": "1kg"}))
        .await?;
    let oud = catalog.create_product(&oud_store.id, None, "Cambodi Oud").await?;
    let oud_3ml = catalog
        .create_variant(&oud.id, Some("OUD-3ML"), 2_500, json!({"volume": "3ml"}))
        .await?;

    // Promotions
    let promotions = db.promotions();
    let coupon = promotions
        .create_coupon(NewCoupon {
            code: "welcome".to_string(),
            usage_limit: Some(100),
            limit_per_user: Some(1),
            ..Default::default()
        })
        .await?;
    promotions
        .create_promotion(
            NewPromotion::new("Welcome 10%", PromotionType::CartPercentage, 1_000)
                .priority(10)
                .requires_coupon(&coupon.id),
        )
        .await?;
    let big_basket = promotions
        .create_promotion(
            NewPromotion::new("15 off over 150", PromotionType::CartFixedAmount, 1_500)
                .min_purchase(Money::from_cents(15_000)),
        )
        .await?;
    promotions
        .add_scope(&big_basket.id, ScopeTarget::Category, &sweets.id)
        .await?;

    // Customer
    let address = db
        .addresses()
        .create(
            DEMO_USER,
            NewAddress {
                label: Some("Home".to_string()),
                city: "Riyadh".to_string(),
                street: "Olaya St".to_string(),
                ..Default::default()
            },
        )
        .await?;
    let carts = db.carts();
    carts.add_item(DEMO_USER, &ajwa_1kg.id, 3).await?;
    carts.add_item(DEMO_USER, &oud_3ml.id, 2).await?;

    let hooks = OrderHooks::new().with(TracingHook);
    let checkout = CheckoutService::new(db.clone(), config.pricing.clone(), hooks.clone());
    let orders = OrderService::new(
        db.clone(),
        config.pricing.clone(),
        config.orders.status_policy,
        hooks,
    );

    println!();
    println!("Preview with coupon WELCOME:");
    for quote in checkout.preview(DEMO_USER, Some("WELCOME")).await? {
        println!(
            "  store {}: subtotal {} - discount {} + delivery {} = {}",
            quote.store_id,
            quote.totals.subtotal,
            quote.totals.discounts_total,
            quote.totals.delivery_fee,
            quote.totals.grand_total
        );
        for note in &quote.totals.pricing.notes {
            println!("    note: {note}");
        }
    }

    let request = CheckoutRequest {
        address_id: Some(address.id),
        payment_method: PaymentMethod::Card,
        coupon_code: Some("WELCOME".to_string()),
        ..Default::default()
    };
    let placed = checkout.checkout(DEMO_USER, &request).await?;

    println!();
    println!("Placed {} orders:", placed.len());
    for placed_order in &placed {
        let order = &placed_order.order;
        println!(
            "  {} ({} items) total {} {}",
            order.id,
            placed_order.items.len(),
            order.grand_total(),
            order.currency
        );
        let paid = orders.update_payment_status(&order.id, PaymentStatus::Paid).await?;
        println!("    payment: {}", paid.payment_status);
    }

    println!();
    println!("✓ Seed complete");

    Ok(())
}
