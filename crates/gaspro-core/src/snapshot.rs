//! # Snapshot
//!
//! The whole-store document used for backup export, restore import and the
//! remote replica's pull response.
//!
//! ## Legacy Migration
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Older files may be missing fields the store now requires.             │
//! │  normalize() fills them in before anything is written:                 │
//! │                                                                         │
//! │  customer.serialNumber missing/duplicate → max + 1 (file order)        │
//! │  customer.cylinderBalance missing        → {}                          │
//! │  product.isActive missing                → true                        │
//! │  cylinderBalance keyed by product NAME   → rekeyed to product id       │
//! │  cylinderTransaction.productId missing   → looked up by name, or a     │
//! │                                            placeholder inactive product│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Missing collections deserialize as empty.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Customer, CylinderTransaction, Invoice, Product, Repayment, Settings};

/// Current snapshot layout version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub format_version: u32,
    #[serde(default)]
    pub exported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub customers: Vec<Customer>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub invoices: Vec<Invoice>,
    #[serde(default)]
    pub repayments: Vec<Repayment>,
    #[serde(default)]
    pub cylinder_transactions: Vec<CylinderTransaction>,
    #[serde(default)]
    pub customer_types: Vec<String>,
    #[serde(default)]
    pub settings: Settings,
}

/// What [`Snapshot::normalize`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeReport {
    pub serials_assigned: usize,
    pub balances_rekeyed: usize,
    pub transactions_linked: usize,
    pub placeholder_products: usize,
}

impl Snapshot {
    /// Forward-migrates legacy records in place.
    pub fn normalize(&mut self) -> NormalizeReport {
        let mut report = NormalizeReport::default();

        // Serial numbers: keep the first holder of each positive serial.
        let mut max_serial = self
            .customers
            .iter()
            .map(|c| c.serial_number)
            .max()
            .unwrap_or(0)
            .max(0);
        let mut seen = HashSet::new();
        for customer in &mut self.customers {
            if customer.serial_number <= 0 || !seen.insert(customer.serial_number) {
                max_serial += 1;
                customer.serial_number = max_serial;
                seen.insert(max_serial);
                report.serials_assigned += 1;
            }
        }

        // Transactions without a product id: resolve by name, else placeholder.
        let mut by_name: HashMap<String, String> = self
            .products
            .iter()
            .map(|p| (p.name.clone(), p.id.clone()))
            .collect();
        for tx in &mut self.cylinder_transactions {
            if !tx.product_id.is_empty() {
                continue;
            }
            let id = match by_name.get(&tx.product_name) {
                Some(id) => id.clone(),
                None => {
                    let placeholder = Product {
                        id: uuid::Uuid::new_v4().to_string(),
                        name: tx.product_name.clone(),
                        size: String::new(),
                        is_active: false,
                    };
                    by_name.insert(placeholder.name.clone(), placeholder.id.clone());
                    let id = placeholder.id.clone();
                    self.products.push(placeholder);
                    report.placeholder_products += 1;
                    id
                }
            };
            tx.product_id = id;
            report.transactions_linked += 1;
        }

        // Name-keyed holdings: rekey when the key is not an id but names a product.
        let ids: HashSet<&str> = self.products.iter().map(|p| p.id.as_str()).collect();
        for customer in &mut self.customers {
            let stale: Vec<(String, String)> = customer
                .cylinder_balance
                .iter()
                .filter(|(key, _)| !ids.contains(key))
                .filter_map(|(key, _)| by_name.get(key).map(|id| (key.to_string(), id.clone())))
                .collect();
            for (name, id) in stale {
                customer.cylinder_balance.rekey(&name, &id);
                report.balances_rekeyed += 1;
            }
        }

        self.format_version = SNAPSHOT_FORMAT_VERSION;
        report
    }

    /// Number of ledger transactions in the snapshot.
    pub fn transaction_count(&self) -> usize {
        self.invoices.len() + self.repayments.len() + self.cylinder_transactions.len()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"{
        "customers": [
            {"id": "1700000000001", "name": "Al-Shifa Hospital", "type": "Hospital",
             "balance": 12000, "totalPurchases": 40000,
             "cylinderBalance": {"12kg": 4}},
            {"id": "1700000000002", "serialNumber": 5, "name": "Abu Salem"},
            {"id": "1700000000003", "serialNumber": 5, "name": "Umm Khaled"}
        ],
        "products": [
            {"id": "p12", "name": "12kg", "size": "12"}
        ],
        "cylinderTransactions": [
            {"id": "t1", "customerId": "1700000000001", "productName": "12kg",
             "quantity": 4, "type": "out", "date": "2024-03-01T08:00:00Z"},
            {"id": "t2", "customerId": "1700000000002", "productName": "Oxygen 40L",
             "quantity": 1, "type": "out", "date": "2024-03-02T08:00:00Z"}
        ]
    }"#;

    #[test]
    fn test_normalize_legacy_file() {
        let mut snap: Snapshot = serde_json::from_str(LEGACY).unwrap();
        assert!(snap.products[0].is_active);
        assert!(snap.customers[1].cylinder_balance.is_empty());

        let report = snap.normalize();

        // first customer had no serial, third duplicated 5
        assert_eq!(report.serials_assigned, 2);
        let serials: Vec<i64> = snap.customers.iter().map(|c| c.serial_number).collect();
        assert_eq!(serials, vec![6, 5, 7]);

        assert_eq!(report.transactions_linked, 2);
        assert_eq!(snap.cylinder_transactions[0].product_id, "p12");
        assert_eq!(report.placeholder_products, 1);
        let oxygen = snap.products.iter().find(|p| p.name == "Oxygen 40L").unwrap();
        assert!(!oxygen.is_active);
        assert_eq!(snap.cylinder_transactions[1].product_id, oxygen.id);

        assert_eq!(report.balances_rekeyed, 1);
        assert_eq!(snap.customers[0].cylinder_balance.get("p12"), 4);
        assert_eq!(snap.customers[0].cylinder_balance.get("12kg"), 0);
        assert_eq!(snap.format_version, SNAPSHOT_FORMAT_VERSION);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut snap: Snapshot = serde_json::from_str(LEGACY).unwrap();
        snap.normalize();
        let second = snap.normalize();
        assert_eq!(second, NormalizeReport::default());
    }

    #[test]
    fn test_empty_document() {
        let snap: Snapshot = serde_json::from_str("{}").unwrap();
        assert_eq!(snap.transaction_count(), 0);
        assert!(snap.customer_types.is_empty());
    }
}
