//! # Sync Outbox Repository
//!
//! Manages the sync outbox queue that feeds replication.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LEDGER OPERATION (e.g., record_repayment)                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. INSERT INTO repayments ...                                 │   │
//! │  │  2. UPDATE customers SET balance = ? WHERE id = ?              │   │
//! │  │  3. INSERT INTO sync_outbox ('repayment', 'upsert', id, JSON)  │   │
//! │  │  4. INSERT INTO sync_outbox ('customer', 'upsert', id, JSON)   │   │
//! │  │  5. settings.needsSync = true                                  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← the change and its outbox rows land together                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            REPLICATOR (gaspro-sync, async)                      │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT * FROM sync_outbox WHERE synced_at IS NULL          │   │
//! │  │  2. Push the batch to the replica under a timeout              │   │
//! │  │     a. Acknowledged: synced_at = NOW()                         │   │
//! │  │     b. Failed: attempts += 1, last_error = ?                   │   │
//! │  │  3. Outbox empty? needsSync = false                            │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::settings::{SettingsRepository, NEEDS_SYNC};
use gaspro_core::{EntityKind, OutboxOperation, SyncOutboxEntry};

const OUTBOX_COLUMNS: &str = r#"
    id, entity_type, operation, entity_id, payload,
    attempts, last_error, created_at, attempted_at, synced_at
"#;

#[derive(Debug, FromRow)]
struct OutboxRow {
    id: String,
    entity_type: EntityKind,
    operation: OutboxOperation,
    entity_id: String,
    payload: String,
    attempts: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    attempted_at: Option<DateTime<Utc>>,
    synced_at: Option<DateTime<Utc>>,
}

impl From<OutboxRow> for SyncOutboxEntry {
    fn from(row: OutboxRow) -> Self {
        SyncOutboxEntry {
            id: row.id,
            entity_type: row.entity_type,
            operation: row.operation,
            entity_id: row.entity_id,
            payload: row.payload,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            attempted_at: row.attempted_at,
            synced_at: row.synced_at,
        }
    }
}

/// Repository for sync outbox operations.
#[derive(Debug, Clone)]
pub struct SyncOutboxRepository {
    pool: SqlitePool,
}

impl SyncOutboxRepository {
    /// Creates a new SyncOutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncOutboxRepository { pool }
    }

    /// Queues an entity for synchronization and raises the `needsSync` flag.
    ///
    /// Always called on the connection of the transaction that made the
    /// change, so the entry commits or rolls back with it.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let payload = serde_json::to_string(&repayment)?;
    /// SyncOutboxRepository::enqueue(&mut tx, EntityKind::Repayment,
    ///     OutboxOperation::Upsert, &repayment.id, &payload).await?;
    /// ```
    pub async fn enqueue(
        conn: &mut SqliteConnection,
        entity_type: EntityKind,
        operation: OutboxOperation,
        entity_id: &str,
        payload: &str,
    ) -> DbResult<SyncOutboxEntry> {
        debug!(
            entity_type = %entity_type.as_str(),
            operation = ?operation,
            entity_id = %entity_id,
            "Queuing for sync"
        );

        let entry = SyncOutboxEntry {
            id: Uuid::new_v4().to_string(),
            entity_type,
            operation,
            entity_id: entity_id.to_string(),
            payload: payload.to_string(),
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            attempted_at: None,
            synced_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO sync_outbox (
                id, entity_type, operation, entity_id, payload,
                attempts, last_error, created_at, attempted_at, synced_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.entity_type)
        .bind(entry.operation)
        .bind(&entry.entity_id)
        .bind(&entry.payload)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.attempted_at)
        .bind(entry.synced_at)
        .execute(&mut *conn)
        .await?;

        SettingsRepository::mark_needs_sync(conn, true).await?;
        Ok(entry)
    }

    /// Queues the full entity as an upsert.
    pub async fn enqueue_upsert<T: Serialize>(
        conn: &mut SqliteConnection,
        entity_type: EntityKind,
        entity_id: &str,
        entity: &T,
    ) -> DbResult<SyncOutboxEntry> {
        let payload = serde_json::to_string(entity)?;
        Self::enqueue(conn, entity_type, OutboxOperation::Upsert, entity_id, &payload).await
    }

    /// Queues a deletion. The payload is an empty object.
    pub async fn enqueue_delete(
        conn: &mut SqliteConnection,
        entity_type: EntityKind,
        entity_id: &str,
    ) -> DbResult<SyncOutboxEntry> {
        Self::enqueue(conn, entity_type, OutboxOperation::Delete, entity_id, "{}").await
    }

    /// Gets pending entries that need to be synced.
    ///
    /// ## Arguments
    /// * `limit` - Maximum entries to return
    /// * `max_attempts` - Entries that already failed this many times are skipped
    ///
    /// ## Returns
    /// Entries where `synced_at IS NULL`, ordered by created_at (oldest first).
    pub async fn get_pending(&self, limit: u32, max_attempts: u32) -> DbResult<Vec<SyncOutboxEntry>> {
        let sql = format!(
            r#"
            SELECT {OUTBOX_COLUMNS}
            FROM sync_outbox
            WHERE synced_at IS NULL AND attempts < ?2
            ORDER BY created_at ASC
            LIMIT ?1
            "#
        );
        let rows: Vec<OutboxRow> = sqlx::query_as(&sql)
            .bind(limit)
            .bind(max_attempts)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(SyncOutboxEntry::from).collect())
    }

    /// Marks an entry as successfully synced.
    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE sync_outbox SET
                synced_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a sync failure.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE sync_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts pending sync entries.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sync_outbox WHERE synced_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Pending entries that have exhausted their retries.
    pub async fn count_stuck(&self, max_attempts: u32) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sync_outbox WHERE synced_at IS NULL AND attempts >= ?1",
        )
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Lowers `needsSync` only if nothing is pending.
    ///
    /// One statement, so a write committing concurrently cannot have its
    /// raised flag overwritten. Returns true when the flag was lowered.
    pub async fn clear_needs_sync_if_drained(&self) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE settings SET value = 'false'
            WHERE key = ?1
            AND NOT EXISTS (SELECT 1 FROM sync_outbox WHERE synced_at IS NULL)
            "#,
        )
        .bind(NEEDS_SYNC)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Deletes synced entries older than `days_old` days.
    ///
    /// ## Returns
    /// Number of deleted entries.
    pub async fn cleanup_synced(&self, days_old: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_old));

        let result = sqlx::query(
            r#"
            DELETE FROM sync_outbox
            WHERE synced_at IS NOT NULL
            AND synced_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        debug!(deleted = result.rows_affected(), days_old, "Cleaned up synced outbox entries");
        Ok(result.rows_affected())
    }

    pub async fn delete_all(conn: &mut SqliteConnection) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sync_outbox").execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }
}
