//! # Replicator
//!
//! Drains the sync outbox into the remote replica.
//!
//! ## Push Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Replicator Loop                                │
//! │                                                                         │
//! │  wake on: change signal │ poll interval │ push_now()                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  get_pending(batch_size, max_attempts)  ── oldest first                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  timeout(push_timeout, replica.push(batch))                            │
//! │       │                                                                 │
//! │       ├── acked ───────► mark_synced                                   │
//! │       ├── failed ──────► mark_failed (attempts += 1, last_error)       │
//! │       └── error/timeout► mark_failed on the whole batch, needsSync     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  outbox drained? ──► needsSync = false                                 │
//! │                                                                         │
//! │  A failing cycle waits an exponential backoff before the next one;     │
//! │  the first healthy cycle resets it.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Local writes never wait on any of this: they only append to the outbox.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use gaspro_core::SyncOutboxEntry;
use gaspro_db::Database;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{FailedEntry, OutboxEntry, PushBatch, PROTOCOL_VERSION};
use crate::remote::Replica;

/// Bookkeeping shared with [`crate::agent::SyncAgent::status`].
#[derive(Debug, Clone, Default)]
pub struct ReplicationState {
    pub last_push: Option<DateTime<Utc>>,
    pub last_pull: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub pushed_total: u64,
}

/// Result of one push cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    pub pushed: usize,
    pub failed: usize,
    /// Entries left behind after exhausting `max_attempts`.
    pub stuck: i64,
    /// True when the outbox was empty at the end and `needsSync` was lowered.
    pub drained: bool,
}

pub struct Replicator {
    db: Database,
    replica: Arc<dyn Replica>,
    config: Arc<SyncConfig>,
    state: Arc<RwLock<ReplicationState>>,
    batch_seq: AtomicU64,
    /// Serializes the background loop with `push_now`.
    push_lock: Mutex<()>,
}

impl Replicator {
    pub fn new(db: Database, replica: Arc<dyn Replica>, config: Arc<SyncConfig>) -> Self {
        Replicator {
            db,
            replica,
            config,
            state: Arc::new(RwLock::new(ReplicationState::default())),
            batch_seq: AtomicU64::new(0),
            push_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> Arc<RwLock<ReplicationState>> {
        Arc::clone(&self.state)
    }

    /// Pushes every pending entry, batch by batch, until the outbox is empty
    /// or a batch fails.
    pub async fn push_pending(&self) -> SyncResult<PushOutcome> {
        let _lock = self.push_lock.lock().await;
        let result = self.push_batches().await;

        let mut state = self.state.write().await;
        match &result {
            Ok(outcome) => {
                if outcome.pushed > 0 {
                    state.last_push = Some(Utc::now());
                    state.pushed_total += outcome.pushed as u64;
                }
                if outcome.failed == 0 {
                    state.last_error = None;
                }
            }
            Err(e) => state.last_error = Some(e.to_string()),
        }
        result
    }

    async fn push_batches(&self) -> SyncResult<PushOutcome> {
        let outbox = self.db.sync_outbox();
        let batch_size = self.config.sync.batch_size as u32;
        let max_attempts = self.config.sync.max_attempts;
        let mut outcome = PushOutcome::default();

        loop {
            let entries = outbox.get_pending(batch_size, max_attempts).await?;
            if entries.is_empty() {
                break;
            }
            let full = entries.len() as u32 == batch_size;

            let (acked, failed) = self.push_batch(&entries).await?;
            outcome.pushed += acked;
            outcome.failed += failed;

            if failed > 0 || !full {
                break;
            }
        }

        outcome.stuck = outbox.count_stuck(max_attempts).await?;
        if outcome.stuck > 0 {
            warn!(
                stuck = outcome.stuck,
                max_attempts, "Skipping outbox entries that exceeded max attempts"
            );
        }

        outcome.drained = outbox.clear_needs_sync_if_drained().await?;
        if outcome.pushed > 0 {
            info!(
                pushed = outcome.pushed,
                failed = outcome.failed,
                drained = outcome.drained,
                "Push cycle complete"
            );
        }
        Ok(outcome)
    }

    /// Sends one batch. Returns (acked, failed) counts.
    async fn push_batch(&self, entries: &[SyncOutboxEntry]) -> SyncResult<(usize, usize)> {
        let batch = PushBatch {
            protocol_version: PROTOCOL_VERSION,
            device_id: self.config.device.id.clone(),
            device_name: self.config.device.name.clone(),
            batch_seq: self.batch_seq.fetch_add(1, Ordering::Relaxed),
            entries: entries.iter().map(OutboxEntry::from).collect(),
        };
        debug!(count = entries.len(), batch_seq = batch.batch_seq, "Sending outbox batch");

        let limit = self.config.push_timeout();
        let ack = match timeout(limit, self.replica.push(&batch)).await {
            Ok(Ok(ack)) => ack,
            Ok(Err(e)) => {
                self.fail_all(entries, &e.to_string()).await;
                return Err(e);
            }
            Err(_) => {
                let e = SyncError::Timeout(limit.as_secs());
                self.fail_all(entries, &e.to_string()).await;
                return Err(e);
            }
        };

        let acked_ids: HashSet<&str> = ack.acked_ids.iter().map(String::as_str).collect();
        let failures: HashMap<&str, &FailedEntry> =
            ack.failed.iter().map(|f| (f.id.as_str(), f)).collect();

        let outbox = self.db.sync_outbox();
        let (mut acked, mut failed) = (0, 0);
        for entry in entries {
            if acked_ids.contains(entry.id.as_str()) {
                outbox.mark_synced(&entry.id).await?;
                acked += 1;
                continue;
            }

            let message = match failures.get(entry.id.as_str()) {
                Some(f) => {
                    if !f.retryable {
                        warn!(
                            id = %entry.id,
                            entity_type = %entry.entity_type.as_str(),
                            entity_id = %entry.entity_id,
                            error = %f.error,
                            "Non-retryable sync failure"
                        );
                    }
                    format!("Sync failed: {} (retryable: {})", f.error, f.retryable)
                }
                None => "Not acknowledged by replica".to_string(),
            };
            outbox.mark_failed(&entry.id, &message).await?;
            failed += 1;
        }

        if failed > 0 {
            self.db.settings().set_needs_sync(true).await?;
        }
        Ok((acked, failed))
    }

    /// Records a transport failure against every entry of a batch.
    async fn fail_all(&self, entries: &[SyncOutboxEntry], error_msg: &str) {
        let outbox = self.db.sync_outbox();
        for entry in entries {
            if let Err(e) = outbox.mark_failed(&entry.id, error_msg).await {
                error!(error = %e, id = %entry.id, "Failed to mark entry as failed");
            }
        }
        if let Err(e) = self.db.settings().set_needs_sync(true).await {
            error!(error = %e, "Failed to raise needsSync");
        }
    }

    /// Runs the replicator loop until `shutdown_rx` fires.
    ///
    /// This should be spawned as a background task.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(device_id = %self.config.device_id(), "Replicator starting");

        let changes = self.db.changes();
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut backoff = self.create_backoff();

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = changes.notified() => {
                    debug!("Change signalled");
                }
                _ = shutdown_rx.recv() => {
                    info!("Replicator shutting down");
                    break;
                }
            }

            let healthy = match self.push_pending().await {
                Ok(outcome) => outcome.failed == 0,
                Err(e) => {
                    error!(error = %e, retryable = e.is_retryable(), "Push cycle failed");
                    false
                }
            };

            if healthy {
                backoff.reset();
                continue;
            }

            if let Some(delay) = backoff.next_backoff() {
                debug!(?delay, "Waiting before next push");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.recv() => {
                        info!("Shutdown during backoff");
                        break;
                    }
                }
            }
        }

        info!("Replicator stopped");
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: std::time::Duration::from_millis(self.config.sync.initial_backoff_ms),
            max_interval: std::time::Duration::from_secs(self.config.sync.max_backoff_secs),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
