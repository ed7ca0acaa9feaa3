//! # Product Commands
//!
//! Renaming is safe at any time: history keeps the name it was recorded
//! with and holdings are keyed by product id.

use serde_json::Value;

use gaspro_core::NewProduct;
use gaspro_db::Database;

use super::{resolve_product, to_json};
use crate::cli::ProductCommand;
use crate::error::CliResult;

pub async fn run(db: &Database, cmd: ProductCommand) -> CliResult<Value> {
    let registry = db.registry();
    match cmd {
        ProductCommand::Add { name, size } => {
            to_json(&registry.add_product(NewProduct { name, size }).await?)
        }
        ProductCommand::List { active } => {
            let products = if active {
                registry.list_active_products().await?
            } else {
                registry.list_products().await?
            };
            to_json(&products)
        }
        ProductCommand::Rename {
            product,
            name,
            size,
        } => {
            let current = resolve_product(db, &product).await?;
            let input = NewProduct {
                name,
                size: size.unwrap_or(current.size),
            };
            to_json(&registry.update_product(&current.id, input).await?)
        }
        ProductCommand::Deactivate { product } => {
            let current = resolve_product(db, &product).await?;
            to_json(&registry.set_product_active(&current.id, false).await?)
        }
        ProductCommand::Activate { product } => {
            let current = resolve_product(db, &product).await?;
            to_json(&registry.set_product_active(&current.id, true).await?)
        }
    }
}
