//! # gaspro-db: Entity Store and Ledger Engine for GasPro
//!
//! This crate owns the SQLite store and every write that changes a balance.
//! It uses sqlx for async access and takes its balance rules from
//! `gaspro-core`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        GasPro Data Flow                                 │
//! │                                                                         │
//! │  gaspro CLI (repay --customer ... --amount 200.00)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   gaspro-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐ │   │
//! │  │   │   Services   │  │ Repositories │  │   Database (pool)    │ │   │
//! │  │   │              │  │              │  │                      │ │   │
//! │  │   │ Ledger       │─►│ Customer     │─►│ SqlitePool           │ │   │
//! │  │   │ Registry     │  │ Invoice      │  │ LedgerLocks          │ │   │
//! │  │   │ Reconciler   │  │ Repayment    │  │ change Notify        │ │   │
//! │  │   │ Snapshots    │  │ Cylinder ... │  │ migrations           │ │   │
//! │  │   └──────────────┘  └──────────────┘  └──────────────────────┘ │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                   │                             │
//! │       ▼                                   ▼ changes()                   │
//! │  SQLite file (gaspro.db)             gaspro-sync replicator             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, configuration and service handles
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`locks`] - Per-customer locks and the reconciliation gate
//! - [`repository`] - Table-level access
//! - [`ledger`] - The Ledger Engine (invoices, repayments, cylinder movements)
//! - [`registry`] - Customers, products, customer types and settings
//! - [`reconcile`] - The Reconciliation Pass
//! - [`snapshot`] - Whole-store import, export and reset
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gaspro_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("gaspro.db")).await?;
//! db.reconciler().reconcile_all().await?;
//!
//! let customer = db.registry().add_customer(profile).await?;
//! db.ledger().record_repayment(repayment).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod locks;
pub mod migrations;
pub mod pool;
pub mod reconcile;
pub mod registry;
pub mod repository;
pub mod snapshot;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use ledger::{CustomerStatement, CylinderHolding, Ledger, LedgerPolicy};
pub use pool::{Database, DbConfig};
pub use reconcile::Reconciler;
pub use registry::Registry;
pub use snapshot::{ImportReport, SnapshotService};

// Repository re-exports for convenience
pub use repository::customer::CustomerRepository;
pub use repository::sync::SyncOutboxRepository;
