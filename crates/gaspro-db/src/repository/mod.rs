//! # Repository Module
//!
//! Table-level access for GasPro.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Ways In                                          │
//! │                                                                         │
//! │  Reads from callers                                                    │
//! │       │  db.customers().debtors()                                      │
//! │       ▼                                                                 │
//! │  XRepository { pool }  ── acquires its own connection                  │
//! │                                                                         │
//! │  Writes from Ledger / Registry / Snapshot                              │
//! │       │  let mut tx = db.begin_write().await?;   // BEGIN IMMEDIATE    │
//! │       │  InvoiceRepository::insert(&mut tx, &invoice).await?;          │
//! │       │  CustomerRepository::save_derived(&mut tx, &customer).await?;  │
//! │       │  SyncOutboxRepository::enqueue(&mut tx, ...).await?;           │
//! │       ▼  tx.commit().await?;                                           │
//! │  associated fns taking &mut SqliteConnection                           │
//! │                                                                         │
//! │  Writes are never reachable through a pool handle, so every write      │
//! │  happens inside a transaction owned by a service.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`customer::CustomerRepository`] - Customers and their cylinder holdings
//! - [`product::ProductRepository`] - Product catalog and customer-type labels
//! - [`invoice::InvoiceRepository`] - Invoices and their lines
//! - [`repayment::RepaymentRepository`] - Repayments
//! - [`cylinder::CylinderRepository`] - Cylinder movements
//! - [`settings::SettingsRepository`] - Key/value settings
//! - [`sync::SyncOutboxRepository`] - Sync queue management

pub mod customer;
pub mod cylinder;
pub mod invoice;
pub mod product;
pub mod repayment;
pub mod settings;
pub mod sync;
