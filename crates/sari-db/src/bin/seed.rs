//! # Seed Data Generator
//!
//! Populates a demo database with sari-sari store products, standing in for
//! a first catalog sync against a real server.
//!
//! ## Usage
//! ```bash
//! # Generate the default catalog (300 products)
//! cargo run -p sari-db --bin seed
//!
//! # Generate a custom amount
//! cargo run -p sari-db --bin seed -- --count 150
//!
//! # Specify database path
//! cargo run -p sari-db --bin seed -- --db ./data/sari.db
//! ```
//!
//! ## Generated Products
//! Realistic corner-store stock across categories:
//! - Beverages (softdrinks, energy drinks, juice, bottled water)
//! - Instant noodles (pancit canton, mami)
//! - Canned goods (sardines, corned beef, tuna)
//! - Sachets (coffee, detergent, shampoo, toothpaste)
//! - Snacks (crackers, chips, cornick)
//!
//! Each product has:
//! - Unique code: `{CATEGORY}-{NAME}-{INDEX}`
//! - Sequential id (simulating server-assigned ids)
//! - Price: ₱8.00 - ₱30.00 base plus size addon, in centavos
//! - Stock: 0 - 50
//! - Some rows carry an expiration date

use chrono::{Days, Utc};
use std::env;

use sari_core::Product;
use sari_db::{Database, DbConfig};

/// Product categories with typical sari-sari brands.
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "BEV",
        &[
            "Coke Sakto",
            "Royal Tru-Orange",
            "Sprite",
            "Mountain Dew",
            "C2 Apple",
            "C2 Lemon",
            "Sting Energy",
            "Cobra Energy",
            "Zest-O Orange",
            "Natures Spring Water",
            "Wilkins Distilled",
            "Kopiko Lucky Day",
            "Nescafe Creamy White",
            "Milo RTD",
        ],
    ),
    (
        "NDL",
        &[
            "Lucky Me Pancit Canton Original",
            "Lucky Me Pancit Canton Chilimansi",
            "Lucky Me Pancit Canton Calamansi",
            "Lucky Me Beef Mami",
            "Payless Xtra Big",
            "Quickchow Pancit Canton",
            "Nissin Cup Noodles",
        ],
    ),
    (
        "CND",
        &[
            "Ligo Sardines Red",
            "Ligo Sardines Green",
            "Mega Sardines",
            "555 Tuna Flakes",
            "Argentina Corned Beef",
            "CDO Karne Norte",
            "Purefoods Corned Beef",
            "Century Tuna",
        ],
    ),
    (
        "SCH",
        &[
            "Kopiko Brown Coffee",
            "Nescafe 3in1 Original",
            "Great Taste White",
            "Milo Powder",
            "Bear Brand Powdered Milk",
            "Surf Powder Kalamansi",
            "Tide Bar",
            "Downy Sunrise Fresh",
            "Palmolive Shampoo",
            "Head and Shoulders",
            "Safeguard Soap",
            "Colgate Toothpaste",
        ],
    ),
    (
        "SNK",
        &[
            "SkyFlakes Crackers",
            "Fita Crackers",
            "Rebisco Crackers",
            "Piattos Cheese",
            "Nova Multigrain",
            "V-Cut Onion",
            "Chippy BBQ",
            "Boy Bawang Cornick",
            "Clover Chips",
            "Hansel Mocha",
            "Cream-O Vanilla",
            "Choco Mucho",
        ],
    ),
];

/// Size variants with price addons in centavos.
const SIZES: &[(&str, i64)] = &[
    ("Solo", 0),
    ("Sakto", 100),
    ("Sulit Pack", 300),
    ("Twin", 400),
    ("Family", 800),
    ("Jumbo", 1000),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 300;
    let mut db_path = String::from("./sari_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(300);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Sari POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 300)");
                println!("  -d, --db <PATH>    Database file path (default: ./sari_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Sari POS Seed Data Generator");
    println!("===============================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    // Connect to database (runs migrations, seeds payment methods)
    let config = DbConfig::new(&db_path);
    let db = Database::new(config).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Check existing products
    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Generate products
    println!();
    println!("Generating products...");

    let mut generated = 0;
    let start = std::time::Instant::now();

    'outer: for (category_idx, (category_code, products)) in CATEGORIES.iter().enumerate() {
        for (product_idx, product_name) in products.iter().enumerate() {
            for (size_idx, (size_name, price_addon)) in SIZES.iter().enumerate() {
                if generated >= count {
                    break 'outer;
                }

                let seed = category_idx * 1000 + product_idx * 20 + size_idx;
                let product = generate_product(
                    generated as i64 + 1,
                    category_code,
                    category_idx as i64 + 1,
                    product_name,
                    size_name,
                    *price_addon,
                    seed,
                );

                if let Err(e) = db.products().upsert(&product).await {
                    eprintln!("Failed to insert {}: {}", product.code, e);
                    continue;
                }

                generated += 1;

                if generated % 100 == 0 {
                    println!("  Generated {} products...", generated);
                }
            }
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} products in {:?}", generated, elapsed);

    // Verify the catalog reads back
    println!();
    println!("Verifying catalog...");
    let listed = db.products().list(10).await?;
    println!("  First {} products by name:", listed.len());
    for product in &listed {
        println!("    {} {} - {}", product.code, product.name, product.sell_price());
    }

    let methods = db.payment_methods().list().await?;
    println!("  Payment methods: {}", methods.len());

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Generates a single product with deterministic pseudo-random data.
fn generate_product(
    id: i64,
    category: &str,
    category_id: i64,
    name: &str,
    size: &str,
    price_addon: i64,
    seed: usize,
) -> Product {
    let now = Utc::now();

    // Unique scannable code
    let compact: String = name.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let prefix: String = compact.chars().take(3).collect::<String>().to_uppercase();
    let code = format!("{}-{}-{:03}", category, prefix, seed);

    // Price: base ₱8.00 - ₱19.99 plus size addon
    let sell_price_cents = 800 + ((seed * 17) % 1200) as i64 + price_addon;

    // Acquisition cost: 60-80% of selling price
    let cost_pct = 60 + (seed % 20) as i64;
    let buy_price_cents = sell_price_cents * cost_pct / 100;

    // Stock 0-50, so a few items start out-of-stock for realistic testing
    let stock = (seed % 51) as i64;

    // Every fifth product is perishable with an expiry 6-18 months out
    let expiration_date = if seed % 5 == 0 {
        now.date_naive().checked_add_days(Days::new(180 + (seed % 360) as u64))
    } else {
        None
    };

    Product {
        id,
        code,
        name: format!("{} {}", name, size),
        description: None,
        buy_price_cents,
        sell_price_cents,
        stock,
        low_stock_level: 5,
        expiration_date,
        category_id: Some(category_id),
        cached_at: now,
    }
}
