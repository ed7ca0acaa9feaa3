//! # Sync Agent
//!
//! Owns the replication components for one open database.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         SyncAgent                                │  │
//! │  │                                                                  │  │
//! │  │  • Pulls once on start (if configured)                          │  │
//! │  │  • Spawns the replicator loop                                    │  │
//! │  │  • Answers status / push_now / pull_now                          │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │              ┌────────────────┴────────────────┐                       │
//! │              ▼                                 ▼                        │
//! │  ┌────────────────────────┐       ┌────────────────────────┐           │
//! │  │      Replicator        │       │    InboundHandler      │           │
//! │  │                        │       │                        │           │
//! │  │ outbox ──► replica     │       │ replica ──► snapshot   │           │
//! │  │ (background task)      │       │ import + reconcile     │           │
//! │  └────────────────────────┘       └────────────────────────┘           │
//! │                                                                         │
//! │  OFFLINE MODE: no replica is built, nothing is spawned. Writes keep   │
//! │  accumulating in the outbox until the device goes online.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use gaspro_db::Database;

use crate::config::{SyncConfig, SyncMode};
use crate::error::{SyncError, SyncResult};
use crate::inbound::{InboundHandler, PullOutcome};
use crate::remote::{HttpReplica, Replica};
use crate::replicator::{PushOutcome, ReplicationState, Replicator};

// =============================================================================
// Sync Status
// =============================================================================

/// Current sync status for external queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub mode: SyncMode,

    /// Whether the background replicator is running.
    pub running: bool,

    /// Outbox entries not yet acknowledged by the replica.
    pub pending_count: i64,

    /// Pending entries that exhausted their retries.
    pub stuck_count: i64,

    /// The sticky "local changes not yet replicated" flag.
    pub needs_sync: bool,

    pub last_push: Option<DateTime<Utc>>,
    pub last_pull: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

// =============================================================================
// Sync Agent
// =============================================================================

pub struct SyncAgent {
    config: Arc<SyncConfig>,
    db: Database,

    /// `None` while offline.
    replica: Option<Arc<dyn Replica>>,
    replicator: Option<Arc<Replicator>>,

    state: Arc<RwLock<ReplicationState>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SyncAgent {
    /// Builds an agent talking to the configured HTTP replica.
    ///
    /// Offline configurations build an idle agent and never touch the network.
    pub fn new(config: SyncConfig, db: Database) -> SyncResult<Self> {
        let replica: Option<Arc<dyn Replica>> = if config.is_sync_enabled() {
            config.validate()?;
            Some(Arc::new(HttpReplica::new(&config)?))
        } else {
            None
        };
        Ok(Self::build(config, db, replica))
    }

    /// Builds an online agent over any [`Replica`].
    pub fn with_replica(config: SyncConfig, db: Database, replica: Arc<dyn Replica>) -> Self {
        Self::build(config, db, Some(replica))
    }

    /// An idle agent with default configuration.
    pub fn offline(db: Database) -> Self {
        Self::build(SyncConfig::default(), db, None)
    }

    fn build(config: SyncConfig, db: Database, replica: Option<Arc<dyn Replica>>) -> Self {
        let config = Arc::new(config);
        let replicator = replica.as_ref().map(|replica| {
            Arc::new(Replicator::new(
                db.clone(),
                Arc::clone(replica),
                Arc::clone(&config),
            ))
        });
        let state = match &replicator {
            Some(r) => r.state(),
            None => Arc::new(RwLock::new(ReplicationState::default())),
        };

        SyncAgent {
            config,
            db,
            replica,
            replicator,
            state,
            shutdown_tx: None,
            task: None,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Starts background replication.
    ///
    /// Pulls once first when `pull_on_start` is set; a failed pull is logged
    /// and does not stop the agent from starting.
    pub async fn start(&mut self) -> SyncResult<()> {
        let Some(replicator) = self.replicator.clone() else {
            info!("Sync is disabled (mode: offline)");
            return Ok(());
        };
        if self.is_running() {
            return Ok(());
        }

        info!(
            device_id = %self.config.device_id(),
            remote_url = self.config.remote_url().unwrap_or_default(),
            "Starting sync agent"
        );

        if self.config.sync.pull_on_start {
            if let Err(e) = self.pull_now().await {
                warn!(error = %e, "Initial pull failed");
            }
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(tokio::spawn(replicator.run(shutdown_rx)));

        info!("Sync agent started");
        Ok(())
    }

    pub async fn status(&self) -> SyncResult<SyncStatus> {
        let outbox = self.db.sync_outbox();
        let pending_count = outbox.count_pending().await?;
        let stuck_count = outbox.count_stuck(self.config.sync.max_attempts).await?;
        let needs_sync = self.db.settings().needs_sync().await?;
        let state = self.state.read().await.clone();

        Ok(SyncStatus {
            mode: self.config.mode(),
            running: self.is_running(),
            pending_count,
            stuck_count,
            needs_sync,
            last_push: state.last_push,
            last_pull: state.last_pull,
            last_error: state.last_error,
        })
    }

    /// Runs one push cycle immediately.
    pub async fn push_now(&self) -> SyncResult<PushOutcome> {
        match &self.replicator {
            Some(replicator) => replicator.push_pending().await,
            None => Err(SyncError::SyncDisabled),
        }
    }

    /// Pulls the replica's snapshot and reconciles.
    pub async fn pull_now(&self) -> SyncResult<PullOutcome> {
        let replica = self.replica.clone().ok_or(SyncError::SyncDisabled)?;
        let handler = InboundHandler::new(self.db.clone(), replica, self.config.push_timeout());

        let result = handler.pull_and_reconcile().await;
        let mut state = self.state.write().await;
        match &result {
            Ok(_) => state.last_pull = Some(Utc::now()),
            Err(e) => state.last_error = Some(e.to_string()),
        }
        result
    }

    /// Deletes acknowledged outbox entries older than `days_old` days.
    pub async fn cleanup_synced(&self, days_old: u32) -> SyncResult<u64> {
        let removed = self.db.sync_outbox().cleanup_synced(days_old).await?;
        if removed > 0 {
            info!(removed, days_old, "Cleaned up synced outbox entries");
        }
        Ok(removed)
    }

    /// Stops the replicator and waits for it to finish its current cycle.
    pub async fn shutdown(&mut self) -> SyncResult<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            // The loop may already have exited
            let _ = tx.send(()).await;
        }
        if let Some(task) = self.task.take() {
            info!("Shutting down sync agent");
            task.await
                .map_err(|e| SyncError::Internal(format!("Replicator task failed: {}", e)))?;
            info!("Sync agent stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replicator::tests::{db_with_writes, online_config, Behaviour, FakeReplica};
    use gaspro_db::DbConfig;

    #[tokio::test]
    async fn test_offline_agent_is_idle() {
        let db = db_with_writes(1).await;
        let mut agent = SyncAgent::new(SyncConfig::default(), db).unwrap();

        agent.start().await.unwrap();
        assert!(!agent.is_running());
        assert!(matches!(agent.push_now().await, Err(SyncError::SyncDisabled)));
        assert!(matches!(agent.pull_now().await, Err(SyncError::SyncDisabled)));

        let status = agent.status().await.unwrap();
        assert_eq!(status.mode, SyncMode::Offline);
        assert!(status.pending_count > 0);
        assert!(status.needs_sync);
        agent.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_online_requires_valid_config() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut config = SyncConfig::default();
        config.sync.mode = SyncMode::Online;

        let err = SyncAgent::new(config, db).err().unwrap();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_push_now_updates_status() {
        let db = db_with_writes(2).await;
        let replica = FakeReplica::new(Behaviour::Accept);
        let agent = SyncAgent::with_replica(online_config(), db, replica);

        let outcome = agent.push_now().await.unwrap();
        assert!(outcome.drained);

        let status = agent.status().await.unwrap();
        assert_eq!(status.pending_count, 0);
        assert!(!status.needs_sync);
        assert!(status.last_push.is_some());
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_failed_push_surfaces_in_status() {
        let db = db_with_writes(1).await;
        let replica = FakeReplica::new(Behaviour::Refuse);
        let agent = SyncAgent::with_replica(online_config(), db, replica);

        assert!(agent.push_now().await.is_err());
        let status = agent.status().await.unwrap();
        assert!(status.pending_count > 0);
        assert!(status.needs_sync);
        assert!(status.last_error.unwrap().contains("refused"));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let db = db_with_writes(1).await;
        let replica = FakeReplica::new(Behaviour::Accept);
        let mut config = online_config();
        config.sync.pull_on_start = true;
        let mut agent = SyncAgent::with_replica(config, db, replica.clone());

        agent.start().await.unwrap();
        assert!(agent.is_running());

        // Local changes are pending, so the start-up pull must not import
        let status = agent.status().await.unwrap();
        assert!(status.last_pull.is_some());

        for _ in 0..200 {
            if agent.status().await.unwrap().pending_count == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(agent.status().await.unwrap().pending_count, 0);
        assert!(replica.entries_received() > 0);

        agent.shutdown().await.unwrap();
        assert!(!agent.is_running());
    }
}
