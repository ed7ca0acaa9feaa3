//! # Application State
//!
//! What every command needs: the open database and the sync agent.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         AppState                             │
//! │                                                              │
//! │  ┌────────────────────┐        ┌──────────────────────────┐  │
//! │  │  Database          │◄───────│  SyncAgent               │  │
//! │  │  ledger / registry │ outbox │  idle while offline      │  │
//! │  │  snapshots         │        │  replicator when online  │  │
//! │  └────────────────────┘        └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use tracing::{info, warn};

use gaspro_db::Database;
use gaspro_sync::{SyncAgent, SyncConfig};

use crate::error::CliResult;

pub struct AppState {
    db: Database,
    sync: SyncAgent,
}

impl AppState {
    pub fn new(db: Database, config: SyncConfig) -> CliResult<Self> {
        let sync = SyncAgent::new(config, db.clone())?;
        Ok(AppState { db, sync })
    }

    /// An offline state, as a fresh install has.
    pub fn offline(db: Database) -> Self {
        let sync = SyncAgent::offline(db.clone());
        AppState { db, sync }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn sync(&self) -> &SyncAgent {
        &self.sync
    }

    /// Rebuilds cached balances, then starts replication.
    pub async fn start(&mut self) -> CliResult<()> {
        let report = self.db.reconciler().reconcile_all().await?;
        if !report.is_clean() {
            info!(
                balances = report.balances.len(),
                cylinders = report.cylinders.len(),
                "Startup reconciliation corrected cached state"
            );
        }
        self.sync.start().await?;
        Ok(())
    }

    /// Flushes pending changes when online, then stops the agent.
    pub async fn finish(mut self) {
        if self.sync.config().is_sync_enabled() {
            if let Err(e) = self.sync.push_now().await {
                warn!(error = %e, "Final push failed; changes stay queued");
            }
        }
        if let Err(e) = self.sync.shutdown().await {
            warn!(error = %e, "Sync agent did not stop cleanly");
        }
        self.db.close().await;
    }
}
