//! # Commands
//!
//! ```text
//! commands/
//! ├── mod.rs       ◄─── You are here (dispatch, lookups)
//! ├── customer.rs  ◄─── Customer registry
//! ├── product.rs   ◄─── Product catalogue
//! ├── ledger.rs    ◄─── Sales, debts, repayments, cylinders, deletes, redates
//! ├── store.rs     ◄─── Reconcile, export/import, reset, settings
//! └── sync.rs      ◄─── Replication status and control
//! ```
//!
//! Every command returns a JSON value; `main` prints it.

pub mod customer;
pub mod ledger;
pub mod product;
pub mod store;
pub mod sync;

use serde::Serialize;
use serde_json::Value;

use gaspro_core::{Customer, Product};
use gaspro_db::Database;

use crate::cli::Command;
use crate::error::{CliError, CliResult};
use crate::state::AppState;

pub async fn dispatch(state: &AppState, command: Command) -> CliResult<Value> {
    match command {
        Command::Customer(cmd) => customer::run(state.db(), cmd).await,
        Command::Product(cmd) => product::run(state.db(), cmd).await,
        Command::Sale(args) => ledger::sale(state.db(), args).await,
        Command::Debt(cmd) => ledger::debt(state.db(), cmd).await,
        Command::Repay(args) => ledger::repay(state.db(), args).await,
        Command::Cylinder(cmd) => ledger::cylinder(state.db(), cmd).await,
        Command::Delete(cmd) => ledger::delete(state.db(), cmd).await,
        Command::Redate(cmd) => ledger::redate(state.db(), cmd).await,
        Command::Reconcile => store::reconcile(state.db()).await,
        Command::Export { output } => store::export(state.db(), output).await,
        Command::Import { file, auth } => store::import(state.db(), file, auth).await,
        Command::Reset { auth, yes } => store::reset(state.db(), auth, yes).await,
        Command::Settings(cmd) => store::settings(state.db(), cmd).await,
        Command::Sync(cmd) => sync::run(state.sync(), cmd).await,
    }
}

/// Finds a customer by serial number (`12` or `#12`) or by id.
pub(crate) async fn resolve_customer(db: &Database, key: &str) -> CliResult<Customer> {
    let key = key.trim();
    if let Ok(serial) = key.trim_start_matches('#').parse::<i64>() {
        return Ok(db.registry().find_customer_by_serial(serial).await?);
    }
    Ok(db.registry().get_customer(key).await?)
}

/// Finds a product by id, then by case-insensitive name.
pub(crate) async fn resolve_product(db: &Database, key: &str) -> CliResult<Product> {
    let key = key.trim();
    let products = db.registry().list_products().await?;
    products
        .iter()
        .find(|p| p.id == key)
        .or_else(|| products.iter().find(|p| p.name.eq_ignore_ascii_case(key)))
        .cloned()
        .ok_or_else(|| CliError::not_found("Product", key))
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> CliResult<Value> {
    serde_json::to_value(value).map_err(|e| CliError::internal(e.to_string()))
}
