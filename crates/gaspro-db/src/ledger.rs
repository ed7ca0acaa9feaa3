//! # Ledger Engine
//!
//! The only sanctioned way to create, redate or remove an invoice, repayment
//! or cylinder movement. Every balance-affecting operation commits the
//! transaction row, the owning customer's derived state and the outbox
//! entries together.
//!
//! ## Operation Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 record_cylinder_transaction (example)                   │
//! │                                                                         │
//! │  validate input                        ← nothing locked yet             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  locks.customer(id)                    ← gate (shared) + customer mutex │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │  1. claim customer row       (missing → policy decides)        │   │
//! │  │  2. read holding             (authoritative, in-transaction)   │   │
//! │  │  3. Consistency Guard        (reject → rollback, no change)    │   │
//! │  │  4. INSERT cylinder_transactions                               │   │
//! │  │  5. apply LedgerEffect → save balance + holdings               │   │
//! │  │  6. enqueue outbox entries                                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT, then wake the replicator                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Deleting applies the reversed effect of the stored row, so a record
//! followed by its delete restores the customer exactly. Redating touches
//! only the date.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::customer::CustomerRepository;
use crate::repository::cylinder::CylinderRepository;
use crate::repository::invoice::InvoiceRepository;
use crate::repository::product::ProductRepository;
use crate::repository::repayment::RepaymentRepository;
use crate::repository::sync::SyncOutboxRepository;
use gaspro_core::ledger::{
    build_cylinder_transaction, build_invoice, build_repayment, invoice_item, manual_debt_invoice,
};
use gaspro_core::reconcile::derive_balances;
use gaspro_core::validation::{
    validate_new_cylinder_transaction, validate_new_invoice, validate_new_repayment,
    validate_positive_amount,
};
use gaspro_core::{
    guard, CoreError, Customer, CylinderTransaction, EntityKind, Invoice, LedgerEffect, Money,
    NewCylinderTransaction, NewInvoice, NewRepayment, Repayment,
};

// =============================================================================
// Policy
// =============================================================================

/// How the ledger treats a new transaction whose customer does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerPolicy {
    /// `true`: refuse with `CustomerNotFound`.
    /// `false`: store the transaction and skip the balance change.
    pub reject_missing_customer: bool,
}

impl LedgerPolicy {
    pub const fn strict() -> Self {
        LedgerPolicy {
            reject_missing_customer: true,
        }
    }

    pub const fn tolerant() -> Self {
        LedgerPolicy {
            reject_missing_customer: false,
        }
    }
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        LedgerPolicy::strict()
    }
}

// =============================================================================
// Read Models
// =============================================================================

/// One product held by a customer, with the current product name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CylinderHolding {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
}

/// A customer's full history, most recent first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerStatement {
    pub customer: Customer,
    pub invoices: Vec<Invoice>,
    pub repayments: Vec<Repayment>,
    pub cylinder_transactions: Vec<CylinderTransaction>,
    /// Σ invoice debt − Σ repayments, recomputed from the history above.
    pub derived_balance: Money,
}

// =============================================================================
// Ledger
// =============================================================================

/// The Ledger Engine. Obtain one with [`Database::ledger`].
#[derive(Debug, Clone)]
pub struct Ledger {
    db: Database,
    policy: LedgerPolicy,
}

impl Ledger {
    pub fn new(db: Database, policy: LedgerPolicy) -> Self {
        Ledger { db, policy }
    }

    pub fn policy(&self) -> LedgerPolicy {
        self.policy
    }

    // =========================================================================
    // Invoices
    // =========================================================================

    /// Records a sale.
    ///
    /// Adds the total to `totalPurchases` and the debt to `balance`. A
    /// negative debt (overpayment) lowers the balance.
    pub async fn record_invoice(&self, input: NewInvoice) -> DbResult<Invoice> {
        validate_new_invoice(&input)?;

        let _guard = self.db.locks().customer(&input.customer_id).await;
        let mut tx = self.db.begin_write().await?;

        let customer = claim(&mut tx, &input.customer_id).await?;
        let customer = self.admit(customer, &input.customer_id)?;

        let mut items = Vec::with_capacity(input.items.len());
        for line in &input.items {
            let product = ProductRepository::fetch(&mut tx, &line.product_id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
            items.push(invoice_item(&product, line.quantity));
        }

        let name = customer_name(customer.as_ref());
        let invoice = build_invoice(Uuid::new_v4().to_string(), name, input, items, Utc::now());
        store_invoice(&mut tx, customer, &invoice).await?;

        tx.commit().await?;
        self.db.notify_change();

        info!(
            id = %invoice.id,
            customer_id = %invoice.customer_id,
            total = %invoice.total_amount,
            debt = %invoice.payment_details.debt,
            "Invoice recorded"
        );
        Ok(invoice)
    }

    /// Injects a pre-existing balance as a synthetic invoice with one
    /// placeholder line and `debt == total == amount`.
    pub async fn record_manual_debt(
        &self,
        customer_id: &str,
        amount: Money,
        note: &str,
    ) -> DbResult<Invoice> {
        validate_positive_amount("amount", amount)?;

        let _guard = self.db.locks().customer(customer_id).await;
        let mut tx = self.db.begin_write().await?;

        let customer = claim(&mut tx, customer_id).await?;
        let customer = self.admit(customer, customer_id)?;

        let invoice = manual_debt_invoice(
            Uuid::new_v4().to_string(),
            customer_id.to_string(),
            customer_name(customer.as_ref()),
            amount,
            note,
            Utc::now(),
        );
        store_invoice(&mut tx, customer, &invoice).await?;

        tx.commit().await?;
        self.db.notify_change();

        info!(id = %invoice.id, customer_id = %customer_id, amount = %amount, "Manual debt recorded");
        Ok(invoice)
    }

    /// Removes an invoice and reverses both of its effects.
    pub async fn delete_invoice(&self, id: &str, customer_id: &str) -> DbResult<Invoice> {
        let _guard = self.db.locks().customer(customer_id).await;
        let mut tx = self.db.begin_write().await?;

        let invoice = InvoiceRepository::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", id))?;
        check_owner("Invoice", id, &invoice.customer_id, customer_id)?;

        let customer = claim(&mut tx, customer_id).await?;
        InvoiceRepository::delete(&mut tx, id).await?;
        SyncOutboxRepository::enqueue_delete(&mut tx, EntityKind::Invoice, id).await?;
        apply_effect(&mut tx, customer, &LedgerEffect::of_invoice(&invoice).reversed()).await?;

        tx.commit().await?;
        self.db.notify_change();

        info!(id = %id, customer_id = %customer_id, "Invoice deleted");
        Ok(invoice)
    }

    /// Changes an invoice's date. Balances are untouched.
    pub async fn update_invoice_date(&self, id: &str, date: DateTime<Utc>) -> DbResult<Invoice> {
        let _gate = self.db.locks().shared().await;
        let mut tx = self.db.begin_write().await?;

        if !InvoiceRepository::update_date(&mut tx, id, date).await? {
            return Err(DbError::not_found("Invoice", id));
        }
        let invoice = InvoiceRepository::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", id))?;
        SyncOutboxRepository::enqueue_upsert(&mut tx, EntityKind::Invoice, id, &invoice).await?;

        tx.commit().await?;
        self.db.notify_change();
        Ok(invoice)
    }

    // =========================================================================
    // Repayments
    // =========================================================================

    /// Records money received; lowers the balance by the amount.
    pub async fn record_repayment(&self, input: NewRepayment) -> DbResult<Repayment> {
        validate_new_repayment(&input)?;

        let _guard = self.db.locks().customer(&input.customer_id).await;
        let mut tx = self.db.begin_write().await?;

        let customer = claim(&mut tx, &input.customer_id).await?;
        let customer = self.admit(customer, &input.customer_id)?;

        let repayment = build_repayment(
            Uuid::new_v4().to_string(),
            customer_name(customer.as_ref()),
            input,
            Utc::now(),
        );
        RepaymentRepository::insert(&mut tx, &repayment).await?;
        SyncOutboxRepository::enqueue_upsert(
            &mut tx,
            EntityKind::Repayment,
            &repayment.id,
            &repayment,
        )
        .await?;
        apply_effect(&mut tx, customer, &LedgerEffect::of_repayment(&repayment)).await?;

        tx.commit().await?;
        self.db.notify_change();

        info!(
            id = %repayment.id,
            customer_id = %repayment.customer_id,
            amount = %repayment.amount,
            "Repayment recorded"
        );
        Ok(repayment)
    }

    /// Removes a repayment; the balance goes back up by the amount.
    pub async fn delete_repayment(&self, id: &str, customer_id: &str) -> DbResult<Repayment> {
        let _guard = self.db.locks().customer(customer_id).await;
        let mut tx = self.db.begin_write().await?;

        let repayment = RepaymentRepository::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Repayment", id))?;
        check_owner("Repayment", id, &repayment.customer_id, customer_id)?;

        let customer = claim(&mut tx, customer_id).await?;
        RepaymentRepository::delete(&mut tx, id).await?;
        SyncOutboxRepository::enqueue_delete(&mut tx, EntityKind::Repayment, id).await?;
        apply_effect(&mut tx, customer, &LedgerEffect::of_repayment(&repayment).reversed()).await?;

        tx.commit().await?;
        self.db.notify_change();

        info!(id = %id, customer_id = %customer_id, "Repayment deleted");
        Ok(repayment)
    }

    pub async fn update_repayment_date(&self, id: &str, date: DateTime<Utc>) -> DbResult<Repayment> {
        let _gate = self.db.locks().shared().await;
        let mut tx = self.db.begin_write().await?;

        if !RepaymentRepository::update_date(&mut tx, id, date).await? {
            return Err(DbError::not_found("Repayment", id));
        }
        let repayment = RepaymentRepository::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Repayment", id))?;
        SyncOutboxRepository::enqueue_upsert(&mut tx, EntityKind::Repayment, id, &repayment)
            .await?;

        tx.commit().await?;
        self.db.notify_change();
        Ok(repayment)
    }

    // =========================================================================
    // Cylinder Movements
    // =========================================================================

    /// Records a loan (`out`) or a return (`in`).
    ///
    /// Returns are checked against the holding read inside the same
    /// transaction; a return larger than what is out is refused and nothing
    /// is written.
    pub async fn record_cylinder_transaction(
        &self,
        input: NewCylinderTransaction,
    ) -> DbResult<CylinderTransaction> {
        validate_new_cylinder_transaction(&input)?;

        let _guard = self.db.locks().customer(&input.customer_id).await;
        let mut tx = self.db.begin_write().await?;

        let customer = claim(&mut tx, &input.customer_id).await?;
        let customer = self.admit(customer, &input.customer_id)?;

        let product = ProductRepository::fetch(&mut tx, &input.product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(input.product_id.clone()))?;

        let holding =
            CustomerRepository::fetch_holding(&mut tx, &input.customer_id, &product.id).await?;
        guard::check_movement(&product.name, input.direction, holding, input.quantity)?;

        let movement = build_cylinder_transaction(
            Uuid::new_v4().to_string(),
            customer_name(customer.as_ref()),
            &product,
            input,
            Utc::now(),
        );
        CylinderRepository::insert(&mut tx, &movement).await?;
        SyncOutboxRepository::enqueue_upsert(
            &mut tx,
            EntityKind::CylinderTransaction,
            &movement.id,
            &movement,
        )
        .await?;
        apply_effect(&mut tx, customer, &LedgerEffect::of_cylinder(&movement)).await?;

        tx.commit().await?;
        self.db.notify_change();

        info!(
            id = %movement.id,
            customer_id = %movement.customer_id,
            product = %movement.product_name,
            direction = ?movement.direction,
            quantity = movement.quantity,
            holding_before = holding,
            "Cylinder transaction recorded"
        );
        Ok(movement)
    }

    /// Removes a movement and applies the inverse delta.
    ///
    /// Removing a loan the customer has since returned would leave the
    /// holding negative and is refused.
    pub async fn delete_cylinder_transaction(
        &self,
        id: &str,
        customer_id: &str,
    ) -> DbResult<CylinderTransaction> {
        let _guard = self.db.locks().customer(customer_id).await;
        let mut tx = self.db.begin_write().await?;

        let movement = CylinderRepository::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("CylinderTransaction", id))?;
        check_owner("CylinderTransaction", id, &movement.customer_id, customer_id)?;

        let customer = claim(&mut tx, customer_id).await?;
        if customer.is_some() {
            let holding =
                CustomerRepository::fetch_holding(&mut tx, customer_id, &movement.product_id)
                    .await?;
            guard::check_removal(
                &movement.product_name,
                movement.direction,
                holding,
                movement.quantity,
            )?;
        }

        CylinderRepository::delete(&mut tx, id).await?;
        SyncOutboxRepository::enqueue_delete(&mut tx, EntityKind::CylinderTransaction, id).await?;
        apply_effect(&mut tx, customer, &LedgerEffect::of_cylinder(&movement).reversed()).await?;

        tx.commit().await?;
        self.db.notify_change();

        info!(id = %id, customer_id = %customer_id, "Cylinder transaction deleted");
        Ok(movement)
    }

    pub async fn update_cylinder_transaction_date(
        &self,
        id: &str,
        date: DateTime<Utc>,
    ) -> DbResult<CylinderTransaction> {
        let _gate = self.db.locks().shared().await;
        let mut tx = self.db.begin_write().await?;

        if !CylinderRepository::update_date(&mut tx, id, date).await? {
            return Err(DbError::not_found("CylinderTransaction", id));
        }
        let movement = CylinderRepository::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("CylinderTransaction", id))?;
        SyncOutboxRepository::enqueue_upsert(
            &mut tx,
            EntityKind::CylinderTransaction,
            id,
            &movement,
        )
        .await?;

        tx.commit().await?;
        self.db.notify_change();
        Ok(movement)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current holding of one product for one customer (0 when none).
    pub async fn cylinder_holding(&self, customer_id: &str, product_id: &str) -> DbResult<i64> {
        let mut conn = self.db.pool().acquire().await?;
        CustomerRepository::fetch_holding(&mut conn, customer_id, product_id).await
    }

    /// A customer's non-zero holdings with product names resolved now.
    pub async fn cylinder_holdings(&self, customer_id: &str) -> DbResult<Vec<CylinderHolding>> {
        let mut conn = self.db.pool().acquire().await?;
        let customer = CustomerRepository::fetch(&mut conn, customer_id)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", customer_id))?;

        let mut holdings = Vec::new();
        for (product_id, quantity) in customer.cylinder_balance.iter() {
            let product_name = ProductRepository::fetch(&mut conn, product_id)
                .await?
                .map(|p| p.name)
                .unwrap_or_else(|| product_id.to_string());
            holdings.push(CylinderHolding {
                product_id: product_id.to_string(),
                product_name,
                quantity,
            });
        }
        Ok(holdings)
    }

    /// Sum of every holding across all customers.
    pub async fn total_cylinders_out(&self) -> DbResult<i64> {
        self.db.customers().total_cylinders_out().await
    }

    pub async fn customer_statement(&self, customer_id: &str) -> DbResult<CustomerStatement> {
        let customer = self
            .db
            .customers()
            .get_by_id(customer_id)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", customer_id))?;
        let invoices = self.db.invoices().list_for_customer(customer_id).await?;
        let repayments = self.db.repayments().list_for_customer(customer_id).await?;
        let cylinder_transactions = self.db.cylinders().list_for_customer(customer_id).await?;

        let derived_balance = derive_balances(&invoices, &repayments)
            .remove(customer_id)
            .unwrap_or_default();

        Ok(CustomerStatement {
            customer,
            invoices,
            repayments,
            cylinder_transactions,
            derived_balance,
        })
    }

    pub async fn list_invoices(&self) -> DbResult<Vec<Invoice>> {
        self.db.invoices().list().await
    }

    pub async fn list_repayments(&self) -> DbResult<Vec<Repayment>> {
        self.db.repayments().list().await
    }

    pub async fn list_cylinder_transactions(&self) -> DbResult<Vec<CylinderTransaction>> {
        self.db.cylinders().list().await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Applies the missing-customer policy to a claimed customer.
    fn admit(&self, customer: Option<Customer>, customer_id: &str) -> DbResult<Option<Customer>> {
        match customer {
            Some(customer) => Ok(Some(customer)),
            None if self.policy.reject_missing_customer => {
                Err(CoreError::CustomerNotFound(customer_id.to_string()).into())
            }
            None => {
                warn!(
                    customer_id = %customer_id,
                    "Customer not found; storing transaction without balance change"
                );
                Ok(None)
            }
        }
    }
}

/// Locks the customer row for this transaction and loads it.
async fn claim(conn: &mut SqliteConnection, customer_id: &str) -> DbResult<Option<Customer>> {
    if CustomerRepository::claim(conn, customer_id).await? {
        CustomerRepository::fetch(conn, customer_id).await
    } else {
        Ok(None)
    }
}

fn customer_name(customer: Option<&Customer>) -> String {
    customer.map(|c| c.name.clone()).unwrap_or_default()
}

fn check_owner(entity: &str, id: &str, owner: &str, given: &str) -> DbResult<()> {
    if owner == given {
        return Ok(());
    }
    Err(CoreError::CustomerMismatch {
        entity: entity.to_string(),
        id: id.to_string(),
        owner: owner.to_string(),
        given: given.to_string(),
    }
    .into())
}

async fn store_invoice(
    conn: &mut SqliteConnection,
    customer: Option<Customer>,
    invoice: &Invoice,
) -> DbResult<()> {
    InvoiceRepository::insert(conn, invoice).await?;
    SyncOutboxRepository::enqueue_upsert(conn, EntityKind::Invoice, &invoice.id, invoice).await?;
    apply_effect(conn, customer, &LedgerEffect::of_invoice(invoice)).await
}

/// Applies an effect to the customer (if any) and saves the derived state.
async fn apply_effect(
    conn: &mut SqliteConnection,
    customer: Option<Customer>,
    effect: &LedgerEffect,
) -> DbResult<()> {
    let Some(mut customer) = customer else {
        return Ok(());
    };
    effect.apply(&mut customer)?;
    CustomerRepository::save_derived(conn, &customer).await?;
    SyncOutboxRepository::enqueue_upsert(conn, EntityKind::Customer, &customer.id, &customer)
        .await?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use gaspro_core::{
        CustomerProfile, CylinderDirection, InvoiceStatus, NewProduct, Product, RepaymentMethod,
        SaleLine, MANUAL_DEBT_PRODUCT_ID,
    };

    fn money(major: i64) -> Money {
        Money::from_major_minor(major, 0)
    }

    async fn setup() -> (Database, Customer, Product) {
        setup_with(DbConfig::in_memory()).await
    }

    async fn setup_with(config: DbConfig) -> (Database, Customer, Product) {
        let db = Database::new(config).await.unwrap();
        let customer = db
            .registry()
            .add_customer(CustomerProfile {
                name: "Al-Noor Clinic".into(),
                customer_type: "Clinic".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let product = db
            .registry()
            .add_product(NewProduct {
                name: "12kg".into(),
                size: "12".into(),
            })
            .await
            .unwrap();
        (db, customer, product)
    }

    fn sale(customer: &Customer, product: &Product, total: i64, cash: i64) -> NewInvoice {
        NewInvoice {
            customer_id: customer.id.clone(),
            items: vec![SaleLine {
                product_id: product.id.clone(),
                quantity: 2,
            }],
            total_amount: money(total),
            cash: money(cash),
            cheque: Money::zero(),
            cheque_number: None,
            date: None,
        }
    }

    fn repay(customer: &Customer, amount: i64) -> NewRepayment {
        NewRepayment {
            customer_id: customer.id.clone(),
            amount: money(amount),
            method: RepaymentMethod::Cash,
            note: None,
            date: None,
        }
    }

    fn movement(
        customer: &Customer,
        product: &Product,
        direction: CylinderDirection,
        quantity: i64,
    ) -> NewCylinderTransaction {
        NewCylinderTransaction {
            customer_id: customer.id.clone(),
            product_id: product.id.clone(),
            quantity,
            direction,
            note: None,
            date: None,
        }
    }

    async fn reload(db: &Database, id: &str) -> Customer {
        db.customers().get_by_id(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_invoice_round_trip() {
        let (db, customer, product) = setup().await;
        let ledger = db.ledger();

        ledger.record_manual_debt(&customer.id, money(30), "opening").await.unwrap();
        let before = reload(&db, &customer.id).await;

        let invoice = ledger.record_invoice(sale(&customer, &product, 200, 50)).await.unwrap();
        assert_eq!(invoice.items[0].product_name, "12kg");
        assert_eq!(invoice.status, InvoiceStatus::Partial);

        let during = reload(&db, &customer.id).await;
        assert_eq!(during.balance, before.balance + money(150));
        assert_eq!(during.total_purchases, before.total_purchases + money(200));

        ledger.delete_invoice(&invoice.id, &customer.id).await.unwrap();
        let after = reload(&db, &customer.id).await;
        assert_eq!(after.balance, before.balance);
        assert_eq!(after.total_purchases, before.total_purchases);
    }

    #[tokio::test]
    async fn test_overpayment_lowers_balance() {
        let (db, customer, product) = setup().await;
        let invoice = db
            .ledger()
            .record_invoice(sale(&customer, &product, 100, 120))
            .await
            .unwrap();

        assert_eq!(invoice.payment_details.debt, money(-20));
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(reload(&db, &customer.id).await.balance, money(-20));
    }

    #[tokio::test]
    async fn test_repayment_round_trip() {
        let (db, customer, _) = setup().await;
        let ledger = db.ledger();
        ledger.record_manual_debt(&customer.id, money(80), "").await.unwrap();

        let repayment = ledger.record_repayment(repay(&customer, 30)).await.unwrap();
        assert_eq!(reload(&db, &customer.id).await.balance, money(50));

        ledger.delete_repayment(&repayment.id, &customer.id).await.unwrap();
        assert_eq!(reload(&db, &customer.id).await.balance, money(80));
    }

    #[tokio::test]
    async fn test_cylinder_round_trip_both_directions() {
        let (db, customer, product) = setup().await;
        let ledger = db.ledger();

        let out = ledger
            .record_cylinder_transaction(movement(&customer, &product, CylinderDirection::Out, 5))
            .await
            .unwrap();
        assert_eq!(ledger.cylinder_holding(&customer.id, &product.id).await.unwrap(), 5);

        let back = ledger
            .record_cylinder_transaction(movement(&customer, &product, CylinderDirection::In, 2))
            .await
            .unwrap();
        assert_eq!(ledger.cylinder_holding(&customer.id, &product.id).await.unwrap(), 3);

        ledger.delete_cylinder_transaction(&back.id, &customer.id).await.unwrap();
        assert_eq!(ledger.cylinder_holding(&customer.id, &product.id).await.unwrap(), 5);

        ledger.delete_cylinder_transaction(&out.id, &customer.id).await.unwrap();
        assert_eq!(ledger.cylinder_holding(&customer.id, &product.id).await.unwrap(), 0);
        assert!(reload(&db, &customer.id).await.cylinder_balance.is_empty());
    }

    #[tokio::test]
    async fn test_guard_sequence() {
        let (db, customer, product) = setup().await;
        let ledger = db.ledger();
        ledger
            .record_cylinder_transaction(movement(&customer, &product, CylinderDirection::Out, 3))
            .await
            .unwrap();

        let err = ledger
            .record_cylinder_transaction(movement(&customer, &product, CylinderDirection::In, 4))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Rejected(CoreError::InsufficientCylinders { holding: 3, requested: 4, .. })
        ));
        assert_eq!(ledger.cylinder_holding(&customer.id, &product.id).await.unwrap(), 3);
        assert_eq!(db.cylinders().list().await.unwrap().len(), 1);

        ledger
            .record_cylinder_transaction(movement(&customer, &product, CylinderDirection::In, 3))
            .await
            .unwrap();
        assert_eq!(ledger.cylinder_holding(&customer.id, &product.id).await.unwrap(), 0);

        let err = ledger
            .record_cylinder_transaction(movement(&customer, &product, CylinderDirection::In, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::NothingToReturn { .. })));
    }

    #[tokio::test]
    async fn test_deleting_returned_loan_is_refused() {
        let (db, customer, product) = setup().await;
        let ledger = db.ledger();
        let out = ledger
            .record_cylinder_transaction(movement(&customer, &product, CylinderDirection::Out, 2))
            .await
            .unwrap();
        ledger
            .record_cylinder_transaction(movement(&customer, &product, CylinderDirection::In, 2))
            .await
            .unwrap();

        let err = ledger.delete_cylinder_transaction(&out.id, &customer.id).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Rejected(CoreError::InsufficientCylinders { .. })
        ));
        assert!(db.cylinders().get_by_id(&out.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_manual_debt() {
        let (db, customer, _) = setup().await;
        let invoice = db
            .ledger()
            .record_manual_debt(&customer.id, money(500), "opening balance")
            .await
            .unwrap();

        assert_eq!(reload(&db, &customer.id).await.balance, money(500));
        let invoices = db.invoices().list_for_customer(&customer.id).await.unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].payment_details.debt, money(500));
        assert_eq!(invoices[0].items.len(), 1);
        assert_eq!(invoices[0].items[0].product_id, MANUAL_DEBT_PRODUCT_ID);
        assert_eq!(invoice.status, InvoiceStatus::Debt);
    }

    #[tokio::test]
    async fn test_mixed_ledger_scenario() {
        let (db, customer, product) = setup().await;
        let ledger = db.ledger();

        let invoice = ledger.record_invoice(sale(&customer, &product, 200, 50)).await.unwrap();
        assert_eq!(reload(&db, &customer.id).await.balance, money(150));

        let repayment = ledger.record_repayment(repay(&customer, 100)).await.unwrap();
        assert_eq!(reload(&db, &customer.id).await.balance, money(50));

        ledger.delete_repayment(&repayment.id, &customer.id).await.unwrap();
        assert_eq!(reload(&db, &customer.id).await.balance, money(150));

        ledger.delete_invoice(&invoice.id, &customer.id).await.unwrap();
        let after = reload(&db, &customer.id).await;
        assert_eq!(after.balance, Money::zero());
        assert_eq!(after.total_purchases, Money::zero());
    }

    #[tokio::test]
    async fn test_missing_customer_strict() {
        let (db, _, product) = setup().await;
        let ghost = Customer::new("ghost".into(), 99, CustomerProfile::default());

        let err = db
            .ledger()
            .record_invoice(sale(&ghost, &product, 10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::CustomerNotFound(_))));
        assert!(db.invoices().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_customer_tolerant() {
        let (db, _, _) =
            setup_with(DbConfig::in_memory().ledger_policy(LedgerPolicy::tolerant())).await;
        let ghost = Customer::new("ghost".into(), 99, CustomerProfile::default());

        let repayment = db.ledger().record_repayment(repay(&ghost, 10)).await.unwrap();
        assert_eq!(repayment.customer_name, "");
        assert_eq!(db.repayments().list().await.unwrap().len(), 1);
        assert!(db.customers().get_by_id("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_checks_owner_and_existence() {
        let (db, customer, _) = setup().await;
        let ledger = db.ledger();
        let repayment = ledger.record_repayment(repay(&customer, 10)).await.unwrap();

        let err = ledger.delete_repayment("missing", &customer.id).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        let err = ledger.delete_repayment(&repayment.id, "someone-else").await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::CustomerMismatch { .. })));
        assert_eq!(reload(&db, &customer.id).await.balance, money(-10));
    }

    #[tokio::test]
    async fn test_redate_is_metadata_only() {
        let (db, customer, product) = setup().await;
        let ledger = db.ledger();
        let invoice = ledger.record_invoice(sale(&customer, &product, 90, 0)).await.unwrap();
        let balance = reload(&db, &customer.id).await.balance;

        let new_date = Utc::now() - chrono::Duration::days(30);
        let redated = ledger.update_invoice_date(&invoice.id, new_date).await.unwrap();
        assert_eq!(redated.date.timestamp(), new_date.timestamp());
        assert_eq!(reload(&db, &customer.id).await.balance, balance);

        let err = ledger.update_repayment_date("missing", new_date).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_rejected_write_leaves_no_outbox_entry() {
        let (db, customer, product) = setup().await;
        let pending = db.sync_outbox().count_pending().await.unwrap();

        let _ = db
            .ledger()
            .record_cylinder_transaction(movement(&customer, &product, CylinderDirection::In, 1))
            .await
            .unwrap_err();
        assert_eq!(db.sync_outbox().count_pending().await.unwrap(), pending);
    }

    #[tokio::test]
    async fn test_extreme_amounts_are_refused() {
        let (db, customer, product) = setup().await;
        let ledger = db.ledger();
        let huge = Money::parse("92233720368547758.07").unwrap();

        let err = ledger.record_manual_debt(&customer.id, huge, "").await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Rejected(CoreError::Validation(gaspro_core::ValidationError::OutOfRange { .. }))
        ));

        let mut input = sale(&customer, &product, 100, 0);
        input.cheque = huge;
        assert!(ledger.record_invoice(input).await.is_err());

        let after = reload(&db, &customer.id).await;
        assert_eq!(after.balance, Money::zero());
        assert_eq!(after.total_purchases, Money::zero());
        assert!(db.invoices().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_returns_cannot_overdraw() {
        let (db, customer, product) = setup().await;
        let ledger = db.ledger();
        ledger
            .record_cylinder_transaction(movement(&customer, &product, CylinderDirection::Out, 3))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let ledger = ledger.clone();
            let input = movement(&customer, &product, CylinderDirection::In, 3);
            handles.push(tokio::spawn(async move {
                ledger.record_cylinder_transaction(input).await
            }));
        }
        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(ledger.cylinder_holding(&customer.id, &product.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_holdings_follow_product_rename() {
        let (db, customer, product) = setup().await;
        db.ledger()
            .record_cylinder_transaction(movement(&customer, &product, CylinderDirection::Out, 4))
            .await
            .unwrap();

        db.registry()
            .update_product(
                &product.id,
                NewProduct {
                    name: "12kg Butane".into(),
                    size: "12".into(),
                },
            )
            .await
            .unwrap();

        let holdings = db.ledger().cylinder_holdings(&customer.id).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].product_name, "12kg Butane");
        assert_eq!(holdings[0].quantity, 4);
        assert_eq!(db.ledger().total_cylinders_out().await.unwrap(), 4);

        // The movement keeps the name it was recorded under
        let history = db.cylinders().list_for_customer(&customer.id).await.unwrap();
        assert_eq!(history[0].product_name, "12kg");
    }

    #[tokio::test]
    async fn test_customer_statement() {
        let (db, customer, product) = setup().await;
        let ledger = db.ledger();
        ledger.record_invoice(sale(&customer, &product, 120, 20)).await.unwrap();
        ledger.record_repayment(repay(&customer, 40)).await.unwrap();

        let statement = ledger.customer_statement(&customer.id).await.unwrap();
        assert_eq!(statement.invoices.len(), 1);
        assert_eq!(statement.repayments.len(), 1);
        assert_eq!(statement.derived_balance, money(60));
        assert_eq!(statement.customer.balance, statement.derived_balance);
    }

    /// Several writers and an outbox drainer on one WAL file, each on its
    /// own pooled connection.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_on_file_database() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let (db, _, product) = setup_with(DbConfig::new(dir.path().join("gaspro.db"))).await;
        let ledger = db.ledger();

        let mut customers = Vec::new();
        for i in 0..4 {
            let customer = db
                .registry()
                .add_customer(CustomerProfile {
                    name: format!("Depot {}", i),
                    customer_type: "Shop".into(),
                    ..Default::default()
                })
                .await
                .unwrap();
            let mut repayments = Vec::new();
            for _ in 0..10 {
                repayments.push(ledger.record_repayment(repay(&customer, 1)).await.unwrap().id);
            }
            customers.push((customer, repayments));
        }

        // Same autocommit writes the replicator issues between batches
        let stop = Arc::new(AtomicBool::new(false));
        let drainer = {
            let db = db.clone();
            let stop = Arc::clone(&stop);
            tokio::spawn(async move {
                while !stop.load(Ordering::Relaxed) {
                    for entry in db.sync_outbox().get_pending(20, 10).await? {
                        db.sync_outbox().mark_synced(&entry.id).await?;
                    }
                    db.settings().set_needs_sync(true).await?;
                    db.sync_outbox().clear_needs_sync_if_drained().await?;
                    tokio::task::yield_now().await;
                }
                Ok::<_, DbError>(())
            })
        };

        let mut handles = Vec::new();
        for (i, (customer, repayments)) in customers.iter().cloned().enumerate() {
            let db = db.clone();
            let product = product.clone();
            handles.push(tokio::spawn(async move {
                let ledger = db.ledger();
                for id in repayments {
                    ledger.delete_repayment(&id, &customer.id).await?;
                    ledger.record_invoice(sale(&customer, &product, 50, 10)).await?;
                    ledger
                        .record_cylinder_transaction(movement(
                            &customer,
                            &product,
                            CylinderDirection::Out,
                            1,
                        ))
                        .await?;
                }
                db.registry()
                    .add_customer(CustomerProfile {
                        name: format!("Walk-in {}", i),
                        customer_type: "Home".into(),
                        ..Default::default()
                    })
                    .await?;
                Ok::<_, DbError>(())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        stop.store(true, Ordering::Relaxed);
        drainer.await.unwrap().unwrap();

        for (customer, _) in &customers {
            assert_eq!(reload(&db, &customer.id).await.balance, money(400));
            assert_eq!(ledger.cylinder_holding(&customer.id, &product.id).await.unwrap(), 10);
        }

        let mut serials: Vec<i64> = db
            .registry()
            .list_customers()
            .await
            .unwrap()
            .iter()
            .map(|c| c.serial_number)
            .collect();
        serials.sort_unstable();
        assert_eq!(serials, (1..=9).collect::<Vec<i64>>());

        let report = db.reconciler().reconcile_all().await.unwrap();
        assert!(report.is_clean());
        db.close().await;
    }
}
