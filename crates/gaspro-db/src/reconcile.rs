//! # Reconciliation Pass
//!
//! Recomputes every customer's cached balance and cylinder holdings from the
//! full transaction history and overwrites the ones that drifted.
//!
//! ```text
//! invoices ──┐
//!            ├── derive ──► truth ──┐
//! repayments ┘                      ├── compare ──► corrections ──► save + outbox
//! customers ────────────────────────┘
//! ```
//!
//! Runs under the exclusive ledger gate: no ledger write is in flight while
//! the history is scanned, so the pass never sees a half-applied operation.
//! Corrections are logged, not treated as errors. Running it twice in a row
//! corrects nothing the second time.

use std::collections::HashMap;

use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::customer::CustomerRepository;
use crate::repository::cylinder::CylinderRepository;
use crate::repository::invoice::InvoiceRepository;
use crate::repository::repayment::RepaymentRepository;
use crate::repository::sync::SyncOutboxRepository;
use gaspro_core::reconcile::{
    plan_balance_corrections, plan_cylinder_corrections, ReconciliationReport,
};
use gaspro_core::{Customer, EntityKind};

/// Which derived values a pass recomputes.
#[derive(Debug, Clone, Copy)]
struct Scope {
    balances: bool,
    cylinders: bool,
}

impl Scope {
    const ALL: Scope = Scope {
        balances: true,
        cylinders: true,
    };
}

/// Obtain one with [`Database::reconciler`].
#[derive(Debug, Clone)]
pub struct Reconciler {
    db: Database,
}

impl Reconciler {
    pub fn new(db: Database) -> Self {
        Reconciler { db }
    }

    /// Recomputes `balance = Σ invoice debt − Σ repayments` for every customer.
    pub async fn recalculate_all_balances(&self) -> DbResult<ReconciliationReport> {
        self.run(Scope {
            balances: true,
            cylinders: false,
        })
        .await
    }

    /// Rebuilds every customer's holdings as Σ out − Σ in per product.
    pub async fn recalculate_all_cylinder_balances(&self) -> DbResult<ReconciliationReport> {
        self.run(Scope {
            balances: false,
            cylinders: true,
        })
        .await
    }

    /// Both passes in one transaction. Run at startup and after every pull.
    pub async fn reconcile_all(&self) -> DbResult<ReconciliationReport> {
        self.run(Scope::ALL).await
    }

    async fn run(&self, scope: Scope) -> DbResult<ReconciliationReport> {
        let _gate = self.db.locks().exclusive().await;
        let mut tx = self.db.begin_write().await?;

        let report = reconcile_in(&mut tx, scope).await?;

        tx.commit().await?;
        if !report.is_clean() {
            self.db.notify_change();
        }
        Ok(report)
    }
}

/// Runs a pass on an open transaction. The caller must hold the exclusive gate.
pub(crate) async fn reconcile_all_in(conn: &mut SqliteConnection) -> DbResult<ReconciliationReport> {
    reconcile_in(conn, Scope::ALL).await
}

async fn reconcile_in(conn: &mut SqliteConnection, scope: Scope) -> DbResult<ReconciliationReport> {
    let customers = CustomerRepository::list_all(conn).await?;
    let mut report = ReconciliationReport {
        customers_checked: customers.len(),
        ..Default::default()
    };

    if scope.balances {
        let invoices = InvoiceRepository::list_all(conn).await?;
        let repayments = RepaymentRepository::list_all(conn).await?;
        report.balances = plan_balance_corrections(&customers, &invoices, &repayments);
    }
    if scope.cylinders {
        let movements = CylinderRepository::list_all(conn).await?;
        report.cylinders = plan_cylinder_corrections(&customers, &movements);
    }

    if report.is_clean() {
        info!(customers = report.customers_checked, "Reconciliation found no drift");
        return Ok(report);
    }

    let mut by_id: HashMap<String, Customer> =
        customers.into_iter().map(|c| (c.id.clone(), c)).collect();
    let mut touched: Vec<String> = Vec::new();

    for fix in &report.balances {
        warn!(
            customer_id = %fix.customer_id,
            cached = %fix.cached,
            correct = %fix.correct,
            "Correcting customer balance"
        );
        if let Some(customer) = by_id.get_mut(&fix.customer_id) {
            customer.balance = fix.correct;
            touched.push(fix.customer_id.clone());
        }
    }
    for fix in &report.cylinders {
        warn!(
            customer_id = %fix.customer_id,
            cached = fix.cached.total(),
            correct = fix.correct.total(),
            "Correcting cylinder holdings"
        );
        if let Some(customer) = by_id.get_mut(&fix.customer_id) {
            customer.cylinder_balance = fix.correct.clone();
            touched.push(fix.customer_id.clone());
        }
    }

    touched.sort();
    touched.dedup();
    for id in &touched {
        if let Some(customer) = by_id.get(id) {
            CustomerRepository::save_derived(conn, customer).await?;
            SyncOutboxRepository::enqueue_upsert(conn, EntityKind::Customer, id, customer).await?;
        }
    }

    info!(
        customers = report.customers_checked,
        balances = report.balances.len(),
        cylinders = report.cylinders.len(),
        "Reconciliation corrected drift"
    );
    Ok(report)
}
