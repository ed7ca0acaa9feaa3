//! # Inbound Snapshot Handler
//!
//! Pulls the replica's snapshot and folds it into the local store.
//!
//! ## Pull Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Pull and Reconcile                              │
//! │                                                                         │
//! │  needsSync raised? ── yes ──► skip import (local work not yet pushed)  │
//! │        │ no                                                             │
//! │        ▼                                                                │
//! │  timeout(replica.pull())                                               │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  import_remote_snapshot   ── rechecks needsSync inside its transaction │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  reconcile_all()          ── always, imported or not                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The replica only ever wins over a device that has nothing left to say.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info};

use gaspro_core::reconcile::ReconciliationReport;
use gaspro_db::{Database, ImportReport};

use crate::error::{SyncError, SyncResult};
use crate::remote::Replica;

/// What a pull did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullOutcome {
    /// Present when the remote snapshot replaced the local store.
    pub imported: Option<ImportReport>,
    /// True when local changes were still pending and the import was skipped.
    pub skipped_pending: bool,
    pub reconciliation: ReconciliationReport,
}

pub struct InboundHandler {
    db: Database,
    replica: Arc<dyn Replica>,
    timeout: Duration,
}

impl InboundHandler {
    pub fn new(db: Database, replica: Arc<dyn Replica>, timeout: Duration) -> Self {
        InboundHandler {
            db,
            replica,
            timeout,
        }
    }

    pub async fn pull_and_reconcile(&self) -> SyncResult<PullOutcome> {
        let mut outcome = PullOutcome::default();

        if self.db.registry().has_pending_changes().await? {
            info!("Local changes pending, skipping snapshot pull");
            outcome.skipped_pending = true;
        } else {
            let snapshot = match timeout(self.timeout, self.replica.pull()).await {
                Ok(result) => result?,
                Err(_) => return Err(SyncError::Timeout(self.timeout.as_secs())),
            };
            debug!(
                customers = snapshot.customers.len(),
                invoices = snapshot.invoices.len(),
                "Pulled remote snapshot"
            );

            match self.db.snapshots().import_remote_snapshot(snapshot).await? {
                Some(report) => outcome.imported = Some(report),
                None => {
                    info!("Local changes appeared during pull, import skipped");
                    outcome.skipped_pending = true;
                }
            }
        }

        outcome.reconciliation = self.db.reconciler().reconcile_all().await?;
        if !outcome.reconciliation.is_clean() {
            info!(
                balances = outcome.reconciliation.balances.len(),
                cylinders = outcome.reconciliation.cylinders.len(),
                "Reconciliation corrected cached state after pull"
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replicator::tests::{db_with_writes, Behaviour, FakeReplica};
    use gaspro_core::{CustomerProfile, Money};
    use gaspro_db::DbConfig;

    async fn remote_snapshot() -> gaspro_core::Snapshot {
        let remote = db_with_writes(3).await;
        remote.snapshots().export_snapshot().await.unwrap()
    }

    #[tokio::test]
    async fn test_pull_imports_when_nothing_pending() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let replica = FakeReplica::new(Behaviour::Accept);
        *replica.snapshot.lock().unwrap() = remote_snapshot().await;

        let handler = InboundHandler::new(db.clone(), replica, Duration::from_secs(1));
        let outcome = handler.pull_and_reconcile().await.unwrap();

        let report = outcome.imported.unwrap();
        assert_eq!(report.customers, 3);
        assert!(!outcome.skipped_pending);
        assert!(outcome.reconciliation.is_clean());
        assert_eq!(db.registry().list_customers().await.unwrap().len(), 3);
        // A pulled snapshot is not queued back to the replica
        assert_eq!(db.sync_outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pull_skipped_while_local_changes_pending() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let local = db
            .registry()
            .add_customer(CustomerProfile {
                name: "Local only".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        db.ledger()
            .record_manual_debt(&local.id, Money::from_minor(500), "")
            .await
            .unwrap();

        let replica = FakeReplica::new(Behaviour::Accept);
        *replica.snapshot.lock().unwrap() = remote_snapshot().await;

        let handler = InboundHandler::new(db.clone(), replica, Duration::from_secs(1));
        let outcome = handler.pull_and_reconcile().await.unwrap();

        assert!(outcome.imported.is_none());
        assert!(outcome.skipped_pending);
        let customers = db.registry().list_customers().await.unwrap();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].id, local.id);
    }

    #[tokio::test]
    async fn test_pull_failure_leaves_store() {
        let db = db_with_writes(1).await;
        db.settings().set_needs_sync(false).await.unwrap();

        let replica = FakeReplica::new(Behaviour::Refuse);
        let handler = InboundHandler::new(db.clone(), replica, Duration::from_secs(1));
        let err = handler.pull_and_reconcile().await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(db.registry().list_customers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pull_times_out() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let replica = FakeReplica::new(Behaviour::Hang);

        let handler = InboundHandler::new(db, replica, Duration::from_millis(50));
        let err = handler.pull_and_reconcile().await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout(_)));
    }
}
