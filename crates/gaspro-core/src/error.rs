//! # Error Types
//!
//! Domain-specific error types for gaspro-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  gaspro-core errors (this file)                                        │
//! │  ├── CoreError        - Ledger rule rejections                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  gaspro-db errors (separate crate)                                     │
//! │  └── DbError          - Database failures, wraps CoreError             │
//! │                                                                         │
//! │  CLI errors (in app)                                                   │
//! │  └── CliError         - What the operator sees (code + message)        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → CliError → stdout       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (customer id, holding, etc.)
//! 3. Errors are enum variants, never String
//! 4. A rejection happens before any mutation, so no partial state exists

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Ledger rule violations.
///
/// Every variant is a refusal: the operation that produced it changed nothing.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The transaction references a customer that does not exist.
    ///
    /// ## When This Occurs
    /// - Customer id typed wrong by the operator
    /// - Customer was deleted on another device before a sync
    /// - A snapshot import left an orphaned transaction
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Product cannot be found.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// A cylinder return was requested but the customer holds none.
    ///
    /// ## User Workflow
    /// ```text
    /// Return 2 × 12kg
    ///      │
    ///      ▼
    /// Check holding: 0
    ///      │
    ///      ▼
    /// NothingToReturn { product: "12kg", requested: 2 }
    /// ```
    #[error("Customer holds no {product} cylinders; cannot return {requested}")]
    NothingToReturn { product: String, requested: i64 },

    /// A cylinder return (or the undo of a loan) asks for more than is out.
    ///
    /// ## User Workflow
    /// ```text
    /// Return 4 × 12kg
    ///      │
    ///      ▼
    /// Check holding: 3
    ///      │
    ///      ▼
    /// InsufficientCylinders { product: "12kg", holding: 3, requested: 4 }
    ///      │
    ///      ▼
    /// Operator sees: "only 3 12kg cylinders are out"
    /// ```
    #[error("Cannot return {requested} {product} cylinders: customer holds only {holding}")]
    InsufficientCylinders {
        product: String,
        holding: i64,
        requested: i64,
    },

    /// The customer id passed with a delete does not own the transaction.
    #[error("{entity} {id} belongs to customer {owner}, not {given}")]
    CustomerMismatch {
        entity: String,
        id: String,
        owner: String,
        given: String,
    },

    /// A customer with invoices, repayments or cylinder movements cannot be removed.
    #[error("Customer {customer_id} has {transactions} transaction(s) and cannot be deleted")]
    CustomerHasHistory {
        customer_id: String,
        transactions: i64,
    },

    /// Monetary input is invalid (zero, negative, or inconsistent payment split).
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// Item quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Applying a transaction would overflow one of the customer's totals.
    #[error("Customer {customer_id}: {field} would overflow")]
    BalanceOverflow { customer_id: String, field: String },

    /// The admin password did not match.
    #[error("Admin password is incorrect")]
    WrongPassword,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Short machine-readable code, used by callers that report errors as data.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::CustomerNotFound(_) | CoreError::ProductNotFound(_) => "NOT_FOUND",
            CoreError::Validation(_)
            | CoreError::InvalidAmount { .. }
            | CoreError::QuantityTooLarge { .. } => "VALIDATION_ERROR",
            CoreError::WrongPassword => "UNAUTHORIZED",
            _ => "REJECTED",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before ledger logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., phone with letters, unparseable date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., duplicate customer-type label).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
