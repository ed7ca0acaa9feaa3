//! # Seed Data Generator
//!
//! Populates a database with demo customers, products and transactions.
//!
//! ## Usage
//! ```bash
//! # 40 customers (default)
//! cargo run -p gaspro-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p gaspro-db --bin seed -- --count 200 --db ./data/gaspro.db
//! ```
//!
//! Every record goes through the Registry and the Ledger, so balances,
//! holdings and the sync outbox end up exactly as they would in real use.

use std::env;

use gaspro_core::{
    CustomerProfile, CylinderDirection, Money, NewCylinderTransaction, NewInvoice, NewProduct,
    NewRepayment, RepaymentMethod, SaleLine,
};
use gaspro_db::{Database, DbConfig};

/// Gas products for the catalog: (name, size)
const PRODUCTS: &[(&str, &str)] = &[
    ("Cooking Gas 12kg", "12"),
    ("Cooking Gas 48kg", "48"),
    ("Oxygen 40L", "40"),
    ("Oxygen 10L", "10"),
    ("Nitrogen 50L", "50"),
    ("CO2 20kg", "20"),
];

/// Customer name stems paired with a customer type.
const CUSTOMERS: &[(&str, &str)] = &[
    ("Al-Shifa", "Hospital"),
    ("Rafidia", "Hospital"),
    ("Al-Amal", "Medical Center"),
    ("Ibn Sina", "Clinic"),
    ("Abu Salem", "Individual"),
    ("Al-Quds Trading", "Company"),
    ("Al-Zaytoun", "Residential Complex"),
    ("Al-Bayt", "Restaurant"),
];

const CITIES: &[&str] = &["Nablus", "Ramallah", "Hebron", "Jenin", "Tulkarm"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 40;
    let mut db_path = String::from("./gaspro_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(40);
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
                println!("GasPro Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of customers to generate (default: 40)");
                println!("  -d, --db <PATH>    Database file path (default: ./gaspro_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 GasPro Seed Data Generator");
    println!("=============================");
    println!("Database:  {}", db_path);
    println!("Customers: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.customers().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} customers", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let registry = db.registry();
    let ledger = db.ledger();
    let start = std::time::Instant::now();

    let mut product_ids = Vec::with_capacity(PRODUCTS.len());
    for (name, size) in PRODUCTS {
        let product = registry
            .add_product(NewProduct {
                name: name.to_string(),
                size: size.to_string(),
            })
            .await?;
        product_ids.push(product.id);
    }
    println!("✓ Added {} products", product_ids.len());

    let mut transactions = 0usize;
    for seed in 0..count {
        let (stem, kind) = CUSTOMERS[seed % CUSTOMERS.len()];
        let customer = registry
            .add_customer(CustomerProfile {
                name: format!("{} {}", stem, seed + 1),
                customer_type: kind.to_string(),
                city: CITIES[seed % CITIES.len()].to_string(),
                phone: Some(format!("059{:07}", seed * 7919 % 10_000_000)),
                ..Default::default()
            })
            .await?;

        let product_id = &product_ids[seed % product_ids.len()];
        let quantity = (seed % 4) as i64 + 1;
        let total = Money::from_major_minor(60 * quantity, 0);
        let cash = Money::from_major_minor(((seed * 13) % 60) as i64 * quantity, 0);

        if let Err(e) = ledger
            .record_invoice(NewInvoice {
                customer_id: customer.id.clone(),
                items: vec![SaleLine {
                    product_id: product_id.clone(),
                    quantity,
                }],
                total_amount: total,
                cash,
                cheque: Money::zero(),
                cheque_number: None,
                date: None,
            })
            .await
        {
            eprintln!("Failed to record sale for {}: {}", customer.name, e);
            continue;
        }
        transactions += 1;

        ledger
            .record_cylinder_transaction(NewCylinderTransaction {
                customer_id: customer.id.clone(),
                product_id: product_id.clone(),
                quantity,
                direction: CylinderDirection::Out,
                note: None,
                date: None,
            })
            .await?;
        transactions += 1;

        // Every third customer returns one cylinder and pays something back
        if seed % 3 == 0 {
            ledger
                .record_cylinder_transaction(NewCylinderTransaction {
                    customer_id: customer.id.clone(),
                    product_id: product_id.clone(),
                    quantity: 1,
                    direction: CylinderDirection::In,
                    note: None,
                    date: None,
                })
                .await?;
            ledger
                .record_repayment(NewRepayment {
                    customer_id: customer.id.clone(),
                    amount: Money::from_major_minor(20, 0),
                    method: RepaymentMethod::Cash,
                    note: None,
                    date: None,
                })
                .await?;
            transactions += 2;
        }

        if (seed + 1) % 10 == 0 {
            println!("  Generated {} customers...", seed + 1);
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} customers and {} transactions in {:?}", count, transactions, elapsed);

    println!();
    println!("Verifying ledger...");
    let report = db.reconciler().reconcile_all().await?;
    println!("  Corrections needed: {}", report.corrections());
    println!("  Debtors: {}", registry.debtors().await?.len());
    println!("  Cylinders out: {}", ledger.total_cylinders_out().await?);

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
