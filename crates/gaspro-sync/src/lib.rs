//! # gaspro-sync: Replication for GasPro
//!
//! Ships the local sync outbox to a remote replica and pulls the replica's
//! snapshot back. Local writes never wait on the network: they only append
//! to the outbox inside their own transaction.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Replication Flow                                │
//! │                                                                         │
//! │   Ledger / Registry write                                              │
//! │          │  (same transaction)                                          │
//! │          ▼                                                              │
//! │   ┌─────────────┐   change signal   ┌─────────────┐    POST /push      │
//! │   │ sync_outbox │ ────────────────► │ Replicator  │ ─────────────────► │
//! │   │ needsSync=1 │ ◄──── ack ─────── │ (batches)   │                    │
//! │   └─────────────┘                   └─────────────┘     REPLICA        │
//! │                                                                         │
//! │   ┌─────────────────┐               GET /snapshot                      │
//! │   │ InboundHandler  │ ◄──────────────────────────────────────────────  │
//! │   │ import + reconcile (only when needsSync is clear)                  │
//! │   └─────────────────┘                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - `SyncAgent` orchestrator and status
//! - [`config`] - Sync configuration (mode, device ID, remote URL)
//! - [`error`] - Sync error types
//! - [`inbound`] - Snapshot pull and reconciliation
//! - [`protocol`] - Message bodies exchanged with the replica
//! - [`remote`] - `Replica` trait and its HTTP implementation
//! - [`replicator`] - Outbox push loop
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gaspro_sync::{SyncAgent, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let mut agent = SyncAgent::new(config, database)?;
//! agent.start().await?;
//!
//! let status = agent.status().await?;
//! println!("Pending: {}", status.pending_count);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod error;
pub mod inbound;
pub mod protocol;
pub mod remote;
pub mod replicator;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{SyncAgent, SyncStatus};
pub use config::{DeviceConfig, SyncConfig, SyncMode, SyncSettings};
pub use error::{SyncError, SyncResult};
pub use inbound::{InboundHandler, PullOutcome};
pub use protocol::{PushAck, PushBatch, PROTOCOL_VERSION};
pub use remote::{HttpReplica, Replica};
pub use replicator::{PushOutcome, Replicator};
