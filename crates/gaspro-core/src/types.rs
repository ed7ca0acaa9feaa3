//! # Domain Types
//!
//! Core domain types used throughout GasPro.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │    Customer     │   │     Invoice     │   │ CylinderTransaction │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  id (UUID)      │◄──│  customer_id    │   │  customer_id        │   │
//! │  │  serial_number  │   │  items[]        │   │  product_id         │   │
//! │  │  balance        │   │  total_amount   │   │  direction out/in   │   │
//! │  │  cylinder_bal.  │   │  payment_details│   │  quantity           │   │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────────┘   │
//! │           ▲                                                             │
//! │           │            ┌─────────────────┐   ┌─────────────────────┐   │
//! │           └────────────│    Repayment    │   │      Product        │   │
//! │                        │  amount, method │   │  name, size, active │   │
//! │                        └─────────────────┘   └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID where one exists (`serial_number` for customers) - human-readable
//!
//! ## Derived State
//! `Customer::balance`, `Customer::total_purchases` and
//! `Customer::cylinder_balance` are caches. Only the ledger mutates them, and
//! reconciliation can always rebuild them from the transaction history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

fn default_true() -> bool {
    true
}

// =============================================================================
// Customer
// =============================================================================

/// A customer of the distribution business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Dense human-facing number, assigned max+1 on creation.
    /// Legacy records may arrive without one (0) and are backfilled on import.
    #[serde(default)]
    pub serial_number: i64,

    pub name: String,

    /// Category label, one of the configured customer types.
    #[serde(rename = "type", default)]
    pub customer_type: String,

    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub village: String,
    #[serde(default)]
    pub neighborhood: String,

    /// Exactly 10 digits when present.
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub whatsapp: Option<String>,

    /// Running sum of invoice totals (informational).
    #[serde(default)]
    pub total_purchases: Money,

    /// Positive = customer owes us, negative = we owe the customer.
    #[serde(default)]
    pub balance: Money,

    /// Cylinders currently on loan, keyed by product id.
    #[serde(default)]
    pub cylinder_balance: CylinderBalance,
}

impl Customer {
    /// Builds a fresh customer with zeroed derived state.
    pub fn new(id: String, serial_number: i64, profile: CustomerProfile) -> Self {
        Customer {
            id,
            serial_number,
            name: profile.name,
            customer_type: profile.customer_type,
            city: profile.city,
            village: profile.village,
            neighborhood: profile.neighborhood,
            phone: profile.phone,
            whatsapp: profile.whatsapp,
            total_purchases: Money::zero(),
            balance: Money::zero(),
            cylinder_balance: CylinderBalance::default(),
        }
    }

    /// Overwrites the editable profile fields, leaving derived state alone.
    pub fn apply_profile(&mut self, profile: CustomerProfile) {
        self.name = profile.name;
        self.customer_type = profile.customer_type;
        self.city = profile.city;
        self.village = profile.village;
        self.neighborhood = profile.neighborhood;
        self.phone = profile.phone;
        self.whatsapp = profile.whatsapp;
    }

    /// True when the customer owes money.
    #[inline]
    pub fn is_debtor(&self) -> bool {
        self.balance.is_positive()
    }
}

/// The operator-editable part of a customer.
///
/// Used both for creation and for profile updates; never carries balances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    pub name: String,
    #[serde(rename = "type", default)]
    pub customer_type: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub village: String,
    #[serde(default)]
    pub neighborhood: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub whatsapp: Option<String>,
}

// =============================================================================
// Cylinder Balance
// =============================================================================

/// Per-product cylinder holdings of one customer.
///
/// Keyed by product id so that renaming a product never orphans a holding.
/// Zero entries are dropped, so an absent key and a zero holding are the same.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CylinderBalance(BTreeMap<String, i64>);

impl CylinderBalance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holding of a product (0 if absent).
    #[inline]
    pub fn get(&self, product_id: &str) -> i64 {
        self.0.get(product_id).copied().unwrap_or(0)
    }

    /// Adds a signed delta to one product's holding.
    pub fn apply(&mut self, product_id: &str, delta: i64) {
        let next = self.get(product_id) + delta;
        self.set(product_id, next);
    }

    /// Sets a holding outright, removing the key when it becomes zero.
    pub fn set(&mut self, product_id: &str, quantity: i64) {
        if quantity == 0 {
            self.0.remove(product_id);
        } else {
            self.0.insert(product_id.to_string(), quantity);
        }
    }

    /// Sum of all holdings.
    pub fn total(&self) -> i64 {
        self.0.values().sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Renames a key, merging into an existing entry if one is present.
    pub fn rekey(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        if let Some(quantity) = self.0.remove(from) {
            self.apply(to, quantity);
        }
    }
}

impl FromIterator<(String, i64)> for CylinderBalance {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        let mut balance = CylinderBalance::new();
        for (product_id, quantity) in iter {
            balance.apply(&product_id, quantity);
        }
        balance
    }
}

// =============================================================================
// Product
// =============================================================================

/// A cylinder product (e.g. "12kg", "48kg").
///
/// There is no price: the total of every sale is negotiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: String,
    /// Inactive products are hidden from new sales; history keeps referencing them.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Input for creating or renaming a product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub size: String,
}

// =============================================================================
// Invoice
// =============================================================================

/// The status of an invoice, derived from its payment split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Nothing left owing (debt ≤ 0).
    Paid,
    /// Some of the total was paid.
    Partial,
    /// Nothing of the total was paid.
    Debt,
}

impl InvoiceStatus {
    /// Derives the status from an invoice total and its outstanding debt.
    pub fn derive(total: Money, debt: Money) -> Self {
        if !debt.is_positive() {
            InvoiceStatus::Paid
        } else if debt == total {
            InvoiceStatus::Debt
        } else {
            InvoiceStatus::Partial
        }
    }
}

/// How a sale total was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub cash: Money,
    pub cheque: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cheque_number: Option<String>,
    /// `total − cash − cheque`. Negative means the customer overpaid.
    pub debt: Money,
}

impl PaymentDetails {
    /// Splits a total into cash, cheque and the remaining debt.
    ///
    /// ## User Workflow
    /// ```text
    /// Total 200.00, cash 50.00, cheque 0
    ///      │
    ///      ▼
    /// settle() ← THIS FUNCTION
    ///      │
    ///      ▼
    /// debt 150.00 → added to customer.balance
    /// ```
    pub fn settle(total: Money, cash: Money, cheque: Money, cheque_number: Option<String>) -> Self {
        PaymentDetails {
            cash,
            cheque,
            cheque_number,
            debt: total - cash - cheque,
        }
    }
}

/// A line on an invoice. The product name is frozen at sale time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
}

/// A sale transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: String,
    pub date: DateTime<Utc>,
    pub items: Vec<InvoiceItem>,
    pub total_amount: Money,
    pub payment_details: PaymentDetails,
    pub status: InvoiceStatus,
}

/// A line requested at sale time; the ledger resolves the product name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    pub product_id: String,
    pub quantity: i64,
}

/// Input for recording a sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInvoice {
    pub customer_id: String,
    pub items: Vec<SaleLine>,
    pub total_amount: Money,
    #[serde(default)]
    pub cash: Money,
    #[serde(default)]
    pub cheque: Money,
    #[serde(default)]
    pub cheque_number: Option<String>,
    /// Defaults to now.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

// =============================================================================
// Repayment
// =============================================================================

/// How a repayment was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum RepaymentMethod {
    Cash,
    Cheque,
}

impl Default for RepaymentMethod {
    fn default() -> Self {
        RepaymentMethod::Cash
    }
}

/// Money received against a customer's balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repayment {
    pub id: String,
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: String,
    /// Always positive.
    pub amount: Money,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub method: RepaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Input for recording a repayment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRepayment {
    pub customer_id: String,
    pub amount: Money,
    #[serde(default)]
    pub method: RepaymentMethod,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

// =============================================================================
// Cylinder Transaction
// =============================================================================

/// Direction of a cylinder movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum CylinderDirection {
    /// Given to the customer (loan).
    Out,
    /// Returned by the customer.
    In,
}

impl CylinderDirection {
    /// The signed change this direction makes to a holding.
    #[inline]
    pub fn delta(self, quantity: i64) -> i64 {
        match self {
            CylinderDirection::Out => quantity,
            CylinderDirection::In => -quantity,
        }
    }
}

/// A cylinder loan movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CylinderTransaction {
    pub id: String,
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: String,
    /// Legacy records carry only the name; filled in on import.
    #[serde(default)]
    pub product_id: String,
    /// Product name at the time of the movement (frozen).
    pub product_name: String,
    pub quantity: i64,
    #[serde(rename = "type")]
    pub direction: CylinderDirection,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CylinderTransaction {
    /// The signed change this movement made to the holding.
    #[inline]
    pub fn delta(&self) -> i64 {
        self.direction.delta(self.quantity)
    }
}

/// Input for recording a cylinder movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCylinderTransaction {
    pub customer_id: String,
    pub product_id: String,
    pub quantity: i64,
    #[serde(rename = "type")]
    pub direction: CylinderDirection,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

// =============================================================================
// Settings
// =============================================================================

/// Process-wide settings.
///
/// The admin password is stored as an argon2 hash and never exported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing)]
    pub admin_password_hash: Option<String>,
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub allowed_emails: Vec<String>,
    #[serde(default)]
    pub backup_whatsapp: Option<String>,
    #[serde(default)]
    pub last_backup_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_backup_enabled: bool,
    /// Sticky "local changes not yet replicated" flag.
    #[serde(default)]
    pub needs_sync: bool,
}

// =============================================================================
// Sync Outbox
// =============================================================================

/// Kind of entity carried by an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customer,
    Product,
    Invoice,
    Repayment,
    CylinderTransaction,
    CustomerTypes,
    Settings,
    Snapshot,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customer",
            EntityKind::Product => "product",
            EntityKind::Invoice => "invoice",
            EntityKind::Repayment => "repayment",
            EntityKind::CylinderTransaction => "cylinder_transaction",
            EntityKind::CustomerTypes => "customer_types",
            EntityKind::Settings => "settings",
            EntityKind::Snapshot => "snapshot",
        }
    }
}

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum OutboxOperation {
    Upsert,
    Delete,
}

/// An entry in the sync outbox queue.
/// Written in the same transaction as the change it describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutboxEntry {
    pub id: String,
    pub entity_type: EntityKind,
    pub operation: OutboxOperation,
    pub entity_id: String,
    /// The full entity as JSON (empty object for deletes).
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub synced_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================
