//! # Replication Protocol
//!
//! Message bodies exchanged with the remote replica.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Replication Messages                               │
//! │                                                                         │
//! │  PUSH (device → replica)                                               │
//! │  ───────────────────────                                               │
//! │  POST /push      PushBatch { device_id, batch_seq, entries: [...] }    │
//! │                ◄ PushAck   { acked_ids: [...], failed: [...] }         │
//! │                                                                         │
//! │  PULL (replica → device)                                               │
//! │  ───────────────────────                                               │
//! │  GET  /snapshot                                                        │
//! │                ◄ PullResponse { protocol_version, snapshot }           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! JSON with camelCase fields. Each entry carries the full entity as a JSON
//! string, exactly as it was written to the outbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gaspro_core::{EntityKind, OutboxOperation, Snapshot, SyncOutboxEntry};

use crate::error::{SyncError, SyncResult};

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

// =============================================================================
// Push
// =============================================================================

/// One outbox entry on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub id: String,
    pub entity_type: EntityKind,
    pub operation: OutboxOperation,
    pub entity_id: String,
    /// Full entity payload as JSON string.
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl From<&SyncOutboxEntry> for OutboxEntry {
    fn from(e: &SyncOutboxEntry) -> Self {
        OutboxEntry {
            id: e.id.clone(),
            entity_type: e.entity_type,
            operation: e.operation,
            entity_id: e.entity_id.clone(),
            payload: e.payload.clone(),
            created_at: e.created_at,
        }
    }
}

/// Batch of outbox entries for upload, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBatch {
    pub protocol_version: u32,
    pub device_id: String,
    pub device_name: String,
    /// Batch sequence number (for ordering/deduplication).
    pub batch_seq: u64,
    pub entries: Vec<OutboxEntry>,
}

/// Acknowledgement for a push.
///
/// Entries in neither list are treated as failed by the sender.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushAck {
    pub acked_ids: Vec<String>,
    #[serde(default)]
    pub failed: Vec<FailedEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedEntry {
    pub id: String,
    pub error: String,
    #[serde(default)]
    pub retryable: bool,
}

// =============================================================================
// Pull
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub protocol_version: u32,
    pub snapshot: Snapshot,
}

impl PullResponse {
    /// Unwraps the snapshot after checking the protocol version.
    pub fn into_snapshot(self) -> SyncResult<Snapshot> {
        if self.protocol_version > PROTOCOL_VERSION {
            return Err(SyncError::UnsupportedVersion(self.protocol_version));
        }
        Ok(self.snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_batch_wire_shape() {
        let batch = PushBatch {
            protocol_version: PROTOCOL_VERSION,
            device_id: "depot-1".into(),
            device_name: "Depot".into(),
            batch_seq: 4,
            entries: vec![OutboxEntry {
                id: "o-1".into(),
                entity_type: EntityKind::CylinderTransaction,
                operation: OutboxOperation::Upsert,
                entity_id: "t-1".into(),
                payload: "{}".into(),
                created_at: Utc::now(),
            }],
        };
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["deviceId"], "depot-1");
        assert_eq!(json["batchSeq"], 4);
        assert_eq!(json["entries"][0]["entityType"], "cylinder_transaction");
        assert_eq!(json["entries"][0]["operation"], "upsert");
    }

    #[test]
    fn test_ack_defaults() {
        let ack: PushAck = serde_json::from_str(r#"{"ackedIds": ["a", "b"]}"#).unwrap();
        assert_eq!(ack.acked_ids.len(), 2);
        assert!(ack.failed.is_empty());
    }

    #[test]
    fn test_pull_version_check() {
        let newer = PullResponse {
            protocol_version: PROTOCOL_VERSION + 1,
            snapshot: Snapshot::default(),
        };
        assert!(matches!(
            newer.into_snapshot(),
            Err(SyncError::UnsupportedVersion(_))
        ));

        let current: PullResponse =
            serde_json::from_str(r#"{"protocolVersion": 1, "snapshot": {}}"#).unwrap();
        assert!(current.into_snapshot().is_ok());
    }
}
