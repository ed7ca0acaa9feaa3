//! # gaspro-core: Pure Ledger Logic for GasPro
//!
//! This crate is the **heart** of the GasPro ledger. It holds the rules that
//! keep a customer's cached monetary balance and cylinder holdings consistent
//! with the transaction log, as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        GasPro Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    gaspro CLI / other callers                   │   │
//! │  │    sale ──► repay ──► cylinder in/out ──► reconcile             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               gaspro-db (Ledger Engine, Entity Store)           │   │
//! │  │     one SQLite transaction per operation, per-customer locks    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ uses                                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ gaspro-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────────┐  │   │
//! │  │   │  types   │ │  ledger  │ │  guard   │ │    reconcile     │  │   │
//! │  │   │ Customer │ │ effects  │ │ returns  │ │ recompute truth  │  │   │
//! │  │   │ Invoice  │ │ reversal │ │ ≤ held   │ │ from history     │  │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Customer, Invoice, Repayment, CylinderTransaction, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//! - [`ledger`] - The balance effect of each transaction and its reversal
//! - [`guard`] - The cylinder-return Consistency Guard
//! - [`reconcile`] - Recomputing derived balances from the full history
//! - [`snapshot`] - Import/export document and legacy-record migration
//!
//! ## Example Usage
//!
//! ```rust
//! use gaspro_core::money::Money;
//! use gaspro_core::types::PaymentDetails;
//!
//! // Sale of 200.00, customer paid 50.00 cash
//! let payment = PaymentDetails::settle(
//!     Money::from_major_minor(200, 0),
//!     Money::from_major_minor(50, 0),
//!     Money::zero(),
//!     None,
//! );
//! assert_eq!(payment.debt, Money::from_major_minor(150, 0));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod guard;
pub mod ledger;
pub mod money;
pub mod reconcile;
pub mod snapshot;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::LedgerEffect;
pub use money::Money;
pub use snapshot::Snapshot;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Product id used on the single placeholder line of a manual-debt invoice.
pub const MANUAL_DEBT_PRODUCT_ID: &str = "manual-debt";

/// Required length of a customer phone number, when one is given.
pub const PHONE_DIGITS: usize = 10;

/// Maximum quantity on a single invoice line or cylinder movement.
///
/// ## Business Reason
/// Catches typing mistakes (1000 instead of 10) before they reach the ledger.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Customer-type labels seeded on a fresh install.
pub const DEFAULT_CUSTOMER_TYPES: &[&str] = &[
    "Unclassified",
    "Hospital",
    "Medical Center",
    "Clinic",
    "Individual",
    "Company",
    "Residential Complex",
    "Restaurant",
];
