//! # Reconciliation Maths
//!
//! Recomputes every customer's derived state from the full transaction
//! history and reports where the cached value drifted.
//!
//! ## Derivation Rules
//! ```text
//! balance(c)            = Σ invoice.debt (c)  −  Σ repayment.amount (c)
//! cylinder_balance(c,p) = Σ out.quantity (c,p) − Σ in.quantity (c,p)
//! ```
//!
//! Drift is expected (partial syncs, crashed writes, hand-edited imports);
//! a correction is logged by the caller, never treated as an error.
//! Transactions whose customer no longer exists are ignored.

use std::collections::HashMap;

use serde::Serialize;

use crate::money::Money;
use crate::types::{Customer, CylinderBalance, CylinderTransaction, Invoice, Repayment};

// =============================================================================
// Corrections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceCorrection {
    pub customer_id: String,
    pub customer_name: String,
    pub cached: Money,
    pub correct: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CylinderCorrection {
    pub customer_id: String,
    pub customer_name: String,
    pub cached: CylinderBalance,
    pub correct: CylinderBalance,
}

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub customers_checked: usize,
    pub balances: Vec<BalanceCorrection>,
    pub cylinders: Vec<CylinderCorrection>,
}

impl ReconciliationReport {
    /// True when nothing needed correcting.
    pub fn is_clean(&self) -> bool {
        self.balances.is_empty() && self.cylinders.is_empty()
    }

    pub fn corrections(&self) -> usize {
        self.balances.len() + self.cylinders.len()
    }
}

// =============================================================================
// Planning
// =============================================================================

/// Computes the true balance of every customer id seen in the history.
pub fn derive_balances(invoices: &[Invoice], repayments: &[Repayment]) -> HashMap<String, Money> {
    let mut totals: HashMap<String, Money> = HashMap::new();
    for invoice in invoices {
        let total = totals.entry(invoice.customer_id.clone()).or_default();
        *total = total.saturating_add(invoice.payment_details.debt);
    }
    for repayment in repayments {
        let total = totals.entry(repayment.customer_id.clone()).or_default();
        *total = total.saturating_add(-repayment.amount);
    }
    totals
}

/// Computes the true cylinder holdings of every customer id seen in the history.
pub fn derive_cylinder_balances(
    transactions: &[CylinderTransaction],
) -> HashMap<String, CylinderBalance> {
    let mut holdings: HashMap<String, CylinderBalance> = HashMap::new();
    for tx in transactions {
        holdings
            .entry(tx.customer_id.clone())
            .or_default()
            .apply(&tx.product_id, tx.delta());
    }
    holdings
}

/// Lists customers whose cached balance disagrees with the history.
pub fn plan_balance_corrections(
    customers: &[Customer],
    invoices: &[Invoice],
    repayments: &[Repayment],
) -> Vec<BalanceCorrection> {
    let truth = derive_balances(invoices, repayments);
    customers
        .iter()
        .filter_map(|c| {
            let correct = truth.get(&c.id).copied().unwrap_or_default();
            (c.balance != correct).then(|| BalanceCorrection {
                customer_id: c.id.clone(),
                customer_name: c.name.clone(),
                cached: c.balance,
                correct,
            })
        })
        .collect()
}

/// Lists customers whose cached cylinder holdings disagree with the history.
pub fn plan_cylinder_corrections(
    customers: &[Customer],
    transactions: &[CylinderTransaction],
) -> Vec<CylinderCorrection> {
    let mut truth = derive_cylinder_balances(transactions);
    customers
        .iter()
        .filter_map(|c| {
            let correct = truth.remove(&c.id).unwrap_or_default();
            (c.cylinder_balance != correct).then(|| CylinderCorrection {
                customer_id: c.id.clone(),
                customer_name: c.name.clone(),
                cached: c.cylinder_balance.clone(),
                correct,
            })
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
