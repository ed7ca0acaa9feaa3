//! # Customer Commands

use serde_json::{json, Value};
use tracing::info;

use gaspro_core::{Customer, CustomerProfile};
use gaspro_db::Database;

use super::{resolve_customer, to_json};
use crate::cli::{CustomerCommand, ProfileArgs, ProfilePatch};
use crate::error::CliResult;

pub async fn run(db: &Database, cmd: CustomerCommand) -> CliResult<Value> {
    let registry = db.registry();
    match cmd {
        CustomerCommand::Add(args) => {
            let customer = registry.add_customer(profile_from_args(args)).await?;
            info!(id = %customer.id, serial = customer.serial_number, "Customer added");
            to_json(&customer)
        }
        CustomerCommand::List { search } => {
            let customers = match search {
                Some(term) => registry.search_customers(&term).await?,
                None => registry.list_customers().await?,
            };
            to_json(&customers)
        }
        CustomerCommand::Show { customer } => {
            let customer = resolve_customer(db, &customer).await?;
            let statement = db.ledger().customer_statement(&customer.id).await?;
            let holdings = db.ledger().cylinder_holdings(&customer.id).await?;
            Ok(json!({
                "statement": to_json(&statement)?,
                "holdings": to_json(&holdings)?,
            }))
        }
        CustomerCommand::Update { customer, profile } => {
            let current = resolve_customer(db, &customer).await?;
            let profile = apply_patch(&current, profile);
            to_json(&registry.update_customer(&current.id, profile).await?)
        }
        CustomerCommand::Delete { customer } => {
            let customer = resolve_customer(db, &customer).await?;
            let removed = registry.delete_customer(&customer.id).await?;
            info!(id = %removed.id, "Customer deleted");
            to_json(&removed)
        }
        CustomerCommand::Debtors => to_json(&registry.debtors().await?),
        CustomerCommand::Loans => to_json(&registry.customers_with_active_loans().await?),
    }
}

fn profile_from_args(args: ProfileArgs) -> CustomerProfile {
    CustomerProfile {
        name: args.name,
        customer_type: args.customer_type,
        city: args.city,
        village: args.village,
        neighborhood: args.neighborhood,
        phone: args.phone,
        whatsapp: args.whatsapp,
    }
}

/// Current profile with the given fields replaced. An empty `--phone ""`
/// clears the phone.
fn apply_patch(current: &Customer, patch: ProfilePatch) -> CustomerProfile {
    let clearable = |new: Option<String>, old: &Option<String>| match new {
        Some(v) if v.trim().is_empty() => None,
        Some(v) => Some(v),
        None => old.clone(),
    };
    CustomerProfile {
        name: patch.name.unwrap_or_else(|| current.name.clone()),
        customer_type: patch
            .customer_type
            .unwrap_or_else(|| current.customer_type.clone()),
        city: patch.city.unwrap_or_else(|| current.city.clone()),
        village: patch.village.unwrap_or_else(|| current.village.clone()),
        neighborhood: patch
            .neighborhood
            .unwrap_or_else(|| current.neighborhood.clone()),
        phone: clearable(patch.phone, &current.phone),
        whatsapp: clearable(patch.whatsapp, &current.whatsapp),
    }
}
