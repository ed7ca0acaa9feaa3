//! # Ledger Commands
//!
//! Sales, manual debts, repayments and cylinder movements, plus the
//! password-confirmed deletes and the date edits.
//!
//! ## Delete Confirmation
//! ```text
//! gaspro delete invoice <ID> <CUSTOMER> --password ****
//!        │
//!        ▼
//! require_admin_password ── wrong ──► UNAUTHORIZED (nothing written)
//!        │ ok (or no password set yet)
//!        ▼
//! Ledger::delete_invoice ── reverses balance and totalPurchases
//! ```

use serde_json::Value;
use tracing::info;

use gaspro_core::{CylinderDirection, NewCylinderTransaction, NewInvoice, NewRepayment, SaleLine};
use gaspro_db::Database;

use super::{resolve_customer, resolve_product, to_json};
use crate::cli::{
    CylinderArgs, CylinderCommand, DebtCommand, DeleteArgs, DeleteCommand, RedateCommand,
    RepayArgs, SaleArgs,
};
use crate::error::CliResult;

pub async fn sale(db: &Database, args: SaleArgs) -> CliResult<Value> {
    let customer = resolve_customer(db, &args.customer).await?;

    let mut items = Vec::with_capacity(args.items.len());
    for (product, quantity) in &args.items {
        let product = resolve_product(db, product).await?;
        items.push(SaleLine {
            product_id: product.id,
            quantity: *quantity,
        });
    }

    let invoice = db
        .ledger()
        .record_invoice(NewInvoice {
            customer_id: customer.id,
            items,
            total_amount: args.total,
            cash: args.cash,
            cheque: args.cheque,
            cheque_number: args.cheque_number,
            date: args.date,
        })
        .await?;
    info!(id = %invoice.id, total = %invoice.total_amount, "Sale recorded");
    to_json(&invoice)
}

pub async fn debt(db: &Database, cmd: DebtCommand) -> CliResult<Value> {
    match cmd {
        DebtCommand::Manual {
            customer,
            amount,
            note,
        } => {
            let customer = resolve_customer(db, &customer).await?;
            let invoice = db
                .ledger()
                .record_manual_debt(&customer.id, amount, &note)
                .await?;
            to_json(&invoice)
        }
    }
}

pub async fn repay(db: &Database, args: RepayArgs) -> CliResult<Value> {
    let customer = resolve_customer(db, &args.customer).await?;
    let repayment = db
        .ledger()
        .record_repayment(NewRepayment {
            customer_id: customer.id,
            amount: args.amount,
            method: args.method.into(),
            note: args.note,
            date: args.date,
        })
        .await?;
    to_json(&repayment)
}

pub async fn cylinder(db: &Database, cmd: CylinderCommand) -> CliResult<Value> {
    match cmd {
        CylinderCommand::Out(args) => move_cylinders(db, args, CylinderDirection::Out).await,
        CylinderCommand::In(args) => move_cylinders(db, args, CylinderDirection::In).await,
        CylinderCommand::Holdings { customer: Some(key) } => {
            let customer = resolve_customer(db, &key).await?;
            to_json(&db.ledger().cylinder_holdings(&customer.id).await?)
        }
        CylinderCommand::Holdings { customer: None } => {
            let total = db.ledger().total_cylinders_out().await?;
            let holders = db.registry().customers_with_active_loans().await?;
            Ok(serde_json::json!({
                "totalOut": total,
                "customers": to_json(&holders)?,
            }))
        }
    }
}

async fn move_cylinders(
    db: &Database,
    args: CylinderArgs,
    direction: CylinderDirection,
) -> CliResult<Value> {
    let customer = resolve_customer(db, &args.customer).await?;
    let product = resolve_product(db, &args.product).await?;
    let tx = db
        .ledger()
        .record_cylinder_transaction(NewCylinderTransaction {
            customer_id: customer.id,
            product_id: product.id,
            quantity: args.quantity,
            direction,
            note: args.note,
            date: args.date,
        })
        .await?;
    to_json(&tx)
}

pub async fn delete(db: &Database, cmd: DeleteCommand) -> CliResult<Value> {
    let ledger = db.ledger();
    match cmd {
        DeleteCommand::Invoice(args) => {
            let customer_id = confirm(db, &args).await?;
            to_json(&ledger.delete_invoice(&args.id, &customer_id).await?)
        }
        DeleteCommand::Repayment(args) => {
            let customer_id = confirm(db, &args).await?;
            to_json(&ledger.delete_repayment(&args.id, &customer_id).await?)
        }
        DeleteCommand::Cylinder(args) => {
            let customer_id = confirm(db, &args).await?;
            to_json(&ledger.delete_cylinder_transaction(&args.id, &customer_id).await?)
        }
    }
}

/// Checks the admin password and resolves the owner's id.
async fn confirm(db: &Database, args: &DeleteArgs) -> CliResult<String> {
    db.registry()
        .require_admin_password(args.auth.password.as_deref())
        .await?;
    Ok(resolve_customer(db, &args.customer).await?.id)
}

pub async fn redate(db: &Database, cmd: RedateCommand) -> CliResult<Value> {
    let ledger = db.ledger();
    match cmd {
        RedateCommand::Invoice(args) => to_json(&ledger.update_invoice_date(&args.id, args.date).await?),
        RedateCommand::Repayment(args) => {
            to_json(&ledger.update_repayment_date(&args.id, args.date).await?)
        }
        RedateCommand::Cylinder(args) => {
            to_json(&ledger.update_cylinder_transaction_date(&args.id, args.date).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{AdminAuth, MethodArg, RedateArgs};
    use crate::commands::tests::{customer, product, setup};
    use crate::error::ErrorCode;
    use gaspro_core::Money;

    fn cyl(customer: &str, product: &str, quantity: i64) -> CylinderArgs {
        CylinderArgs {
            customer: customer.into(),
            product: product.into(),
            quantity,
            note: None,
            date: None,
        }
    }

    #[tokio::test]
    async fn test_sale_then_repay() {
        let db = setup().await;
        let c = customer(&db, "Nadia").await;
        product(&db, "12kg").await;

        let invoice = sale(
            &db,
            SaleArgs {
                customer: "1".into(),
                items: vec![("12kg".into(), 2)],
                total: Money::from_minor(30_000),
                cash: Money::from_minor(10_000),
                cheque: Money::zero(),
                cheque_number: None,
                date: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(invoice["items"][0]["productName"], "12kg");

        repay(
            &db,
            RepayArgs {
                customer: c.id.clone(),
                amount: Money::from_minor(5_000),
                method: MethodArg::Cash,
                note: None,
                date: None,
            },
        )
        .await
        .unwrap();

        let after = db.registry().get_customer(&c.id).await.unwrap();
        assert_eq!(after.balance, Money::from_minor(15_000));
        assert_eq!(after.total_purchases, Money::from_minor(30_000));
    }

    #[tokio::test]
    async fn test_over_return_is_rejected() {
        let db = setup().await;
        customer(&db, "Nadia").await;
        product(&db, "48kg").await;

        cylinder(&db, CylinderCommand::Out(cyl("1", "48kg", 3))).await.unwrap();
        let err = cylinder(&db, CylinderCommand::In(cyl("1", "48kg", 4)))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Rejected);

        let holdings = cylinder(&db, CylinderCommand::Holdings { customer: None })
            .await
            .unwrap();
        assert_eq!(holdings["totalOut"], 3);
    }

    #[tokio::test]
    async fn test_delete_requires_password_once_set() {
        let db = setup().await;
        let c = customer(&db, "Nadia").await;
        let invoice = db
            .ledger()
            .record_manual_debt(&c.id, Money::from_minor(2_000), "")
            .await
            .unwrap();
        db.registry().set_admin_password(None, "s3cret").await.unwrap();

        let args = |password: Option<&str>| DeleteArgs {
            id: invoice.id.clone(),
            customer: c.id.clone(),
            auth: AdminAuth {
                password: password.map(String::from),
            },
        };

        let err = delete(&db, DeleteCommand::Invoice(args(Some("guess"))))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);
        let err = delete(&db, DeleteCommand::Invoice(args(None))).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);

        delete(&db, DeleteCommand::Invoice(args(Some("s3cret"))))
            .await
            .unwrap();
        let after = db.registry().get_customer(&c.id).await.unwrap();
        assert_eq!(after.balance, Money::zero());
    }

    #[tokio::test]
    async fn test_redate_unknown_transaction() {
        let db = setup().await;
        let err = redate(
            &db,
            RedateCommand::Repayment(RedateArgs {
                id: "missing".into(),
                date: chrono::Utc::now(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
