//! # Snapshot Service
//!
//! Whole-store export, import and factory reset.
//!
//! ## Import Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Snapshot (file or remote pull)                                        │
//! │       │                                                                 │
//! │       ▼  normalize()  ── legacy records migrated in memory              │
//! │                                                                         │
//! │  exclusive gate ─── no ledger write in flight                          │
//! │       │                                                                 │
//! │       ▼  BEGIN                                                          │
//! │  delete every collection                                               │
//! │  insert customers, products, invoices, repayments, cylinder movements  │
//! │  replace customer types, merge settings                                │
//! │  reconcile (cached balances from the file are not trusted)             │
//! │  enqueue one snapshot entry (local files only)                         │
//! │       ▼  COMMIT                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Any failure rolls the whole import back; the previous store survives.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::reconcile::reconcile_all_in;
use crate::repository::customer::CustomerRepository;
use crate::repository::cylinder::CylinderRepository;
use crate::repository::invoice::InvoiceRepository;
use crate::repository::product::ProductRepository;
use crate::repository::repayment::RepaymentRepository;
use crate::repository::settings::{SettingsRepository, NEEDS_SYNC};
use crate::repository::sync::SyncOutboxRepository;
use gaspro_core::reconcile::ReconciliationReport;
use gaspro_core::snapshot::{NormalizeReport, SNAPSHOT_FORMAT_VERSION};
use gaspro_core::{EntityKind, Snapshot};

/// Outbox entity id used for whole-store replacements.
pub const SNAPSHOT_ENTITY_ID: &str = "snapshot";

/// Outcome of [`SnapshotService::import_snapshot`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub customers: usize,
    pub products: usize,
    pub invoices: usize,
    pub repayments: usize,
    pub cylinder_transactions: usize,
    /// Customers whose negative total purchases were clamped to zero.
    pub purchases_clamped: usize,
    pub migrated: NormalizeReport,
    pub reconciliation: ReconciliationReport,
}

/// Where an imported snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// A file chosen by the operator. Replicated after import.
    Local,
    /// The replica's copy. Never echoed back.
    Remote,
}

/// Obtain one with [`Database::snapshots`].
#[derive(Debug, Clone)]
pub struct SnapshotService {
    db: Database,
}

impl SnapshotService {
    pub fn new(db: Database) -> Self {
        SnapshotService { db }
    }

    /// Reads every collection inside one read transaction.
    ///
    /// The admin password hash is never part of the export.
    pub async fn export_snapshot(&self) -> DbResult<Snapshot> {
        let mut tx = self.db.pool().begin().await?;

        let snapshot = Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            exported_at: Some(Utc::now()),
            customers: CustomerRepository::list_all(&mut tx).await?,
            products: ProductRepository::list_all(&mut tx).await?,
            invoices: InvoiceRepository::list_all(&mut tx).await?,
            repayments: RepaymentRepository::list_all(&mut tx).await?,
            cylinder_transactions: CylinderRepository::list_all(&mut tx).await?,
            customer_types: ProductRepository::list_customer_types(&mut tx).await?,
            settings: SettingsRepository::load(&mut tx).await?,
        };
        tx.rollback().await?;

        let snapshot = Snapshot {
            settings: gaspro_core::Settings {
                admin_password_hash: None,
                ..snapshot.settings
            },
            ..snapshot
        };

        info!(
            customers = snapshot.customers.len(),
            transactions = snapshot.transaction_count(),
            "Snapshot exported"
        );
        Ok(snapshot)
    }

    /// Replaces the whole store with `snapshot`.
    ///
    /// Customer types are only replaced when the document carries some.
    /// A local admin password survives the import. The new store is queued
    /// for replication as one snapshot entry.
    pub async fn import_snapshot(&self, snapshot: Snapshot) -> DbResult<ImportReport> {
        let report = self.import(snapshot, Origin::Local).await?;
        report.ok_or_else(|| DbError::Internal("Local import was skipped".to_string()))
    }

    /// Imports a snapshot pulled from the replica.
    ///
    /// Returns `None` without touching the store when local changes are still
    /// waiting to be replicated: the local store stays the source of truth.
    /// The check runs under the exclusive gate, inside the import transaction.
    pub async fn import_remote_snapshot(&self, snapshot: Snapshot) -> DbResult<Option<ImportReport>> {
        self.import(snapshot, Origin::Remote).await
    }

    async fn import(&self, mut snapshot: Snapshot, origin: Origin) -> DbResult<Option<ImportReport>> {
        let migrated = snapshot.normalize();
        if migrated != NormalizeReport::default() {
            info!(
                serials = migrated.serials_assigned,
                rekeyed = migrated.balances_rekeyed,
                linked = migrated.transactions_linked,
                placeholders = migrated.placeholder_products,
                "Migrated legacy snapshot records"
            );
        }

        let mut report = ImportReport {
            customers: snapshot.customers.len(),
            products: snapshot.products.len(),
            invoices: snapshot.invoices.len(),
            repayments: snapshot.repayments.len(),
            cylinder_transactions: snapshot.cylinder_transactions.len(),
            migrated,
            ..Default::default()
        };

        let _gate = self.db.locks().exclusive().await;
        let mut tx = self.db.begin_write().await?;

        if origin == Origin::Remote {
            let pending = SettingsRepository::get_value(&mut tx, NEEDS_SYNC)
                .await?
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if pending {
                info!("Local changes pending, remote snapshot not imported");
                return Ok(None);
            }
        }

        wipe(&mut tx).await?;

        for product in &snapshot.products {
            ProductRepository::insert(&mut tx, product).await?;
        }
        for customer in &mut snapshot.customers {
            if customer.total_purchases.is_negative() {
                warn!(
                    customer_id = %customer.id,
                    total_purchases = %customer.total_purchases,
                    "Clamping negative total purchases"
                );
                customer.total_purchases = customer.total_purchases.floor_zero();
                report.purchases_clamped += 1;
            }
            CustomerRepository::insert(&mut tx, customer).await?;
        }
        for invoice in &snapshot.invoices {
            InvoiceRepository::insert(&mut tx, invoice).await?;
        }
        for repayment in &snapshot.repayments {
            RepaymentRepository::insert(&mut tx, repayment).await?;
        }
        for movement in &snapshot.cylinder_transactions {
            CylinderRepository::insert(&mut tx, movement).await?;
        }

        let mut seen = HashSet::new();
        let labels: Vec<String> = snapshot
            .customer_types
            .iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && seen.insert(l.clone()))
            .collect();
        if !labels.is_empty() {
            ProductRepository::replace_customer_types(&mut tx, &labels).await?;
        }

        // The replication flag is local state, never taken from a document
        let settings = gaspro_core::Settings {
            admin_password_hash: None,
            needs_sync: false,
            ..snapshot.settings.clone()
        };
        SettingsRepository::save(&mut tx, &settings).await?;

        report.reconciliation = reconcile_all_in(&mut tx).await?;

        if origin == Origin::Local {
            SyncOutboxRepository::enqueue_upsert(
                &mut tx,
                EntityKind::Snapshot,
                SNAPSHOT_ENTITY_ID,
                &snapshot,
            )
            .await?;
        }

        tx.commit().await?;
        self.db.notify_change();

        info!(
            customers = report.customers,
            invoices = report.invoices,
            repayments = report.repayments,
            cylinder_transactions = report.cylinder_transactions,
            corrections = report.reconciliation.corrections(),
            origin = ?origin,
            "Snapshot imported"
        );
        Ok(Some(report))
    }

    /// Deletes every customer, product and transaction and resets settings.
    ///
    /// Customer-type labels and the admin password are kept.
    pub async fn factory_reset(&self) -> DbResult<()> {
        let _gate = self.db.locks().exclusive().await;
        let mut tx = self.db.begin_write().await?;

        wipe(&mut tx).await?;

        let empty = Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            exported_at: Some(Utc::now()),
            customer_types: ProductRepository::list_customer_types(&mut tx).await?,
            ..Default::default()
        };
        SyncOutboxRepository::enqueue_upsert(
            &mut tx,
            EntityKind::Snapshot,
            SNAPSHOT_ENTITY_ID,
            &empty,
        )
        .await?;

        tx.commit().await?;
        self.db.notify_change();

        warn!("Factory reset completed");
        Ok(())
    }
}

/// Deletes ledger collections and settings. Children go before parents.
async fn wipe(conn: &mut sqlx::SqliteConnection) -> DbResult<()> {
    let invoices = InvoiceRepository::delete_all(conn).await?;
    let repayments = RepaymentRepository::delete_all(conn).await?;
    let movements = CylinderRepository::delete_all(conn).await?;
    let customers = CustomerRepository::delete_all(conn).await?;
    let products = ProductRepository::delete_all(conn).await?;
    SettingsRepository::clear(conn).await?;

    info!(
        invoices,
        repayments,
        movements,
        customers,
        products,
        "Store wiped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use gaspro_core::{
        CustomerProfile, CylinderDirection, Money, NewCylinderTransaction, NewProduct,
        NewRepayment, RepaymentMethod,
    };

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn populate(db: &Database) -> String {
        let customer = db
            .registry()
            .add_customer(CustomerProfile {
                name: "Al-Makassed Hospital".into(),
                customer_type: "Hospital".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let product = db
            .registry()
            .add_product(NewProduct {
                name: "Oxygen 40L".into(),
                size: "40".into(),
            })
            .await
            .unwrap();
        let ledger = db.ledger();
        ledger
            .record_manual_debt(&customer.id, Money::from_minor(80_000), "opening balance")
            .await
            .unwrap();
        ledger
            .record_repayment(NewRepayment {
                customer_id: customer.id.clone(),
                amount: Money::from_minor(30_000),
                method: RepaymentMethod::Cash,
                note: None,
                date: None,
            })
            .await
            .unwrap();
        ledger
            .record_cylinder_transaction(NewCylinderTransaction {
                customer_id: customer.id.clone(),
                product_id: product.id.clone(),
                quantity: 3,
                direction: CylinderDirection::Out,
                note: None,
                date: None,
            })
            .await
            .unwrap();
        customer.id
    }

    #[tokio::test]
    async fn test_export_then_import_into_fresh_store() {
        let source = db().await;
        let customer_id = populate(&source).await;
        source.registry().set_admin_password(None, "pw").await.unwrap();

        let snapshot = source.snapshots().export_snapshot().await.unwrap();
        assert_eq!(snapshot.transaction_count(), 3);
        assert!(snapshot.settings.admin_password_hash.is_none());

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("argon2"));

        let target = db().await;
        let report = target
            .snapshots()
            .import_snapshot(serde_json::from_str(&json).unwrap())
            .await
            .unwrap();
        assert_eq!(report.customers, 1);
        assert!(report.reconciliation.is_clean());

        let customer = target.registry().get_customer(&customer_id).await.unwrap();
        assert_eq!(customer.balance, Money::from_minor(50_000));
        assert_eq!(customer.cylinder_balance.total(), 3);
        assert_eq!(target.invoices().list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_import_replaces_existing_data() {
        let db = db().await;
        populate(&db).await;

        let doc = r#"{
            "customers": [{"id": "c-new", "serialNumber": 1, "name": "Jenin Bakery"}],
            "products": [{"id": "p12", "name": "12kg", "size": "12"}]
        }"#;
        db.snapshots()
            .import_snapshot(serde_json::from_str(doc).unwrap())
            .await
            .unwrap();

        let customers = db.registry().list_customers().await.unwrap();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].name, "Jenin Bakery");
        assert!(db.repayments().list().await.unwrap().is_empty());
        // No labels in the document: the existing ones stay
        assert!(!db.registry().list_customer_types().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_corrects_cached_state_from_history() {
        let db = db().await;
        let doc = r#"{
            "customers": [
                {"id": "c1", "name": "Qalqilya Clinic", "balance": 99999,
                 "totalPurchases": -500, "cylinderBalance": {"12kg": 9}}
            ],
            "products": [{"id": "p12", "name": "12kg", "size": "12"}],
            "repayments": [
                {"id": "r1", "customerId": "c1", "customerName": "Qalqilya Clinic",
                 "amount": 2000, "method": "cash", "date": "2024-05-01T09:00:00Z"}
            ],
            "cylinderTransactions": [
                {"id": "t1", "customerId": "c1", "productName": "12kg",
                 "quantity": 2, "type": "out", "date": "2024-05-01T09:00:00Z"}
            ],
            "customerTypes": ["Clinic", "Clinic", " "]
        }"#;

        let report = db
            .snapshots()
            .import_snapshot(serde_json::from_str(doc).unwrap())
            .await
            .unwrap();
        assert_eq!(report.purchases_clamped, 1);
        assert_eq!(report.migrated.serials_assigned, 1);
        assert_eq!(report.migrated.transactions_linked, 1);
        assert_eq!(report.reconciliation.balances.len(), 1);
        assert_eq!(report.reconciliation.cylinders.len(), 1);

        let customer = db.registry().get_customer("c1").await.unwrap();
        assert_eq!(customer.serial_number, 1);
        assert_eq!(customer.balance, Money::from_minor(-2000));
        assert_eq!(customer.total_purchases, Money::zero());
        assert_eq!(customer.cylinder_balance.get("p12"), 2);
        assert_eq!(
            db.registry().list_customer_types().await.unwrap(),
            vec!["Clinic".to_string()]
        );
        assert!(db.registry().has_pending_changes().await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_import_keeps_previous_store() {
        let db = db().await;
        let customer_id = populate(&db).await;

        // Two customers with the same id violate the primary key
        let doc = r#"{
            "customers": [
                {"id": "dup", "serialNumber": 1, "name": "A"},
                {"id": "dup", "serialNumber": 2, "name": "B"}
            ]
        }"#;
        let result = db
            .snapshots()
            .import_snapshot(serde_json::from_str(doc).unwrap())
            .await;
        assert!(result.is_err());

        let customer = db.registry().get_customer(&customer_id).await.unwrap();
        assert_eq!(customer.balance, Money::from_minor(50_000));
    }

    #[tokio::test]
    async fn test_remote_import_respects_pending_changes() {
        let source = db().await;
        populate(&source).await;
        let remote = source.snapshots().export_snapshot().await.unwrap();

        // Unreplicated local work blocks the import
        let local = db().await;
        local
            .registry()
            .add_customer(CustomerProfile {
                name: "Local Only".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let skipped = local.snapshots().import_remote_snapshot(remote.clone()).await.unwrap();
        assert!(skipped.is_none());
        assert_eq!(local.registry().list_customers().await.unwrap()[0].name, "Local Only");

        // Once replicated, the remote copy replaces the store and is not echoed
        local.settings().set_needs_sync(false).await.unwrap();
        let pending_before = local.sync_outbox().count_pending().await.unwrap();
        let report = local.snapshots().import_remote_snapshot(remote).await.unwrap();
        assert!(report.is_some());
        assert_eq!(
            local.registry().list_customers().await.unwrap()[0].name,
            "Al-Makassed Hospital"
        );
        assert_eq!(local.sync_outbox().count_pending().await.unwrap(), pending_before);
        assert!(!local.registry().has_pending_changes().await.unwrap());
    }

    #[tokio::test]
    async fn test_factory_reset() {
        let db = db().await;
        populate(&db).await;
        db.registry().set_admin_password(None, "pw").await.unwrap();
        let labels = db.registry().list_customer_types().await.unwrap();

        db.snapshots().factory_reset().await.unwrap();

        assert!(db.registry().list_customers().await.unwrap().is_empty());
        assert!(db.registry().list_products().await.unwrap().is_empty());
        assert!(db.invoices().list().await.unwrap().is_empty());
        assert_eq!(db.registry().list_customer_types().await.unwrap(), labels);
        assert!(db.registry().verify_admin_password("pw").await.unwrap());
        assert!(!db.registry().verify_admin_password("other").await.unwrap());
    }
}
