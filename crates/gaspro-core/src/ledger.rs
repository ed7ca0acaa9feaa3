//! # Ledger Effects
//!
//! The balance change each transaction kind makes to its customer, and the
//! exact inverse applied when that transaction is deleted.
//!
//! ## Effect Table
//! ```text
//! ┌──────────────────────┬────────────────────┬─────────────┬────────────────────┐
//! │ Transaction          │ total_purchases    │ balance     │ cylinder_balance   │
//! ├──────────────────────┼────────────────────┼─────────────┼────────────────────┤
//! │ Invoice              │ + total            │ + debt      │                    │
//! │ Repayment            │                    │ − amount    │                    │
//! │ Cylinder out         │                    │             │ [product] + qty    │
//! │ Cylinder in          │                    │             │ [product] − qty    │
//! ├──────────────────────┼────────────────────┼─────────────┼────────────────────┤
//! │ delete (any)         │ − same, floor 0    │ − same      │ − same             │
//! └──────────────────────┴────────────────────┴─────────────┴────────────────────┘
//! ```
//!
//! Date edits have no effect: they only change ordering.
//!
//! The store applies an effect inside the same database transaction that
//! writes or removes the transaction row. This module only computes.

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{
    Customer, CylinderTransaction, Invoice, InvoiceItem, InvoiceStatus, NewCylinderTransaction,
    NewInvoice, NewRepayment, PaymentDetails, Product, Repayment,
};
use crate::MANUAL_DEBT_PRODUCT_ID;

// =============================================================================
// Ledger Effect
// =============================================================================

/// A change to one customer's derived state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEffect {
    pub customer_id: String,
    pub purchases: Money,
    pub balance: Money,
    /// `(product_id, signed delta)`
    pub cylinders: Option<(String, i64)>,
}

impl LedgerEffect {
    /// Recording an invoice: purchases grow by the total, balance by the debt.
    ///
    /// A negative debt (overpayment) lowers the balance.
    pub fn of_invoice(invoice: &Invoice) -> Self {
        LedgerEffect {
            customer_id: invoice.customer_id.clone(),
            purchases: invoice.total_amount,
            balance: invoice.payment_details.debt,
            cylinders: None,
        }
    }

    pub fn of_repayment(repayment: &Repayment) -> Self {
        LedgerEffect {
            customer_id: repayment.customer_id.clone(),
            purchases: Money::zero(),
            balance: -repayment.amount,
            cylinders: None,
        }
    }

    pub fn of_cylinder(tx: &CylinderTransaction) -> Self {
        LedgerEffect {
            customer_id: tx.customer_id.clone(),
            purchases: Money::zero(),
            balance: Money::zero(),
            cylinders: Some((tx.product_id.clone(), tx.delta())),
        }
    }

    /// The effect that undoes this one.
    pub fn reversed(&self) -> Self {
        LedgerEffect {
            customer_id: self.customer_id.clone(),
            purchases: -self.purchases,
            balance: -self.balance,
            cylinders: self
                .cylinders
                .as_ref()
                .map(|(product_id, delta)| (product_id.clone(), -delta)),
        }
    }

    /// Applies the effect to a customer record.
    ///
    /// `total_purchases` is floored at zero so out-of-order deletes cannot
    /// drive it negative. `balance` is signed and never clamped.
    ///
    /// On overflow the customer is left untouched.
    pub fn apply(&self, customer: &mut Customer) -> CoreResult<()> {
        let overflow = |field: &str| CoreError::BalanceOverflow {
            customer_id: customer.id.clone(),
            field: field.to_string(),
        };
        let purchases = customer
            .total_purchases
            .checked_add(self.purchases)
            .ok_or_else(|| overflow("totalPurchases"))?;
        let balance = customer
            .balance
            .checked_add(self.balance)
            .ok_or_else(|| overflow("balance"))?;

        customer.total_purchases = purchases.floor_zero();
        customer.balance = balance;
        if let Some((product_id, delta)) = &self.cylinders {
            customer.cylinder_balance.apply(product_id, *delta);
        }
        Ok(())
    }

    /// True when applying would change nothing.
    pub fn is_noop(&self) -> bool {
        self.purchases.is_zero()
            && self.balance.is_zero()
            && self.cylinders.as_ref().map_or(true, |(_, d)| *d == 0)
    }
}

// =============================================================================
// Transaction Builders
// =============================================================================

/// Builds an invoice from a validated sale.
///
/// `items` must already carry resolved product names, one per sale line.
pub fn build_invoice(
    id: String,
    customer_name: String,
    input: NewInvoice,
    items: Vec<InvoiceItem>,
    now: DateTime<Utc>,
) -> Invoice {
    let payment = PaymentDetails::settle(
        input.total_amount,
        input.cash,
        input.cheque,
        input.cheque_number,
    );
    Invoice {
        id,
        customer_id: input.customer_id,
        customer_name,
        date: input.date.unwrap_or(now),
        items,
        total_amount: input.total_amount,
        status: InvoiceStatus::derive(input.total_amount, payment.debt),
        payment_details: payment,
    }
}

/// Resolves a sale line against its product, freezing the name.
pub fn invoice_item(product: &Product, quantity: i64) -> InvoiceItem {
    InvoiceItem {
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        quantity,
    }
}

/// Builds the synthetic invoice used to inject an opening balance.
///
/// ## Shape
/// ```text
/// items:   [{ productId: "manual-debt", productName: "Manual debt: <note>", quantity: 1 }]
/// total:   amount
/// payment: cash 0, cheque 0, debt amount
/// status:  debt
/// ```
pub fn manual_debt_invoice(
    id: String,
    customer_id: String,
    customer_name: String,
    amount: Money,
    note: &str,
    now: DateTime<Utc>,
) -> Invoice {
    let label = if note.trim().is_empty() {
        "Manual debt".to_string()
    } else {
        format!("Manual debt: {}", note.trim())
    };
    let payment = PaymentDetails::settle(amount, Money::zero(), Money::zero(), None);
    Invoice {
        id,
        customer_id,
        customer_name,
        date: now,
        items: vec![InvoiceItem {
            product_id: MANUAL_DEBT_PRODUCT_ID.to_string(),
            product_name: label,
            quantity: 1,
        }],
        total_amount: amount,
        status: InvoiceStatus::derive(amount, payment.debt),
        payment_details: payment,
    }
}

pub fn build_repayment(
    id: String,
    customer_name: String,
    input: NewRepayment,
    now: DateTime<Utc>,
) -> Repayment {
    Repayment {
        id,
        customer_id: input.customer_id,
        customer_name,
        amount: input.amount,
        date: input.date.unwrap_or(now),
        method: input.method,
        note: input.note.filter(|n| !n.trim().is_empty()),
    }
}

pub fn build_cylinder_transaction(
    id: String,
    customer_name: String,
    product: &Product,
    input: NewCylinderTransaction,
    now: DateTime<Utc>,
) -> CylinderTransaction {
    CylinderTransaction {
        id,
        customer_id: input.customer_id,
        customer_name,
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        quantity: input.quantity,
        direction: input.direction,
        date: input.date.unwrap_or(now),
        note: input.note.filter(|n| !n.trim().is_empty()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CustomerProfile, CylinderDirection, RepaymentMethod, SaleLine};

    fn customer() -> Customer {
        Customer::new(
            "c1".into(),
            1,
            CustomerProfile {
                name: "Hamad".into(),
                ..Default::default()
            },
        )
    }

    fn product() -> Product {
        Product {
            id: "p12".into(),
            name: "12kg".into(),
            size: "12".into(),
            is_active: true,
        }
    }

    fn sale(total: i64, cash: i64) -> Invoice {
        let p = product();
        build_invoice(
            "inv1".into(),
            "Hamad".into(),
            NewInvoice {
                customer_id: "c1".into(),
                items: vec![SaleLine {
                    product_id: p.id.clone(),
                    quantity: 2,
                }],
                total_amount: Money::from_minor(total),
                cash: Money::from_minor(cash),
                cheque: Money::zero(),
                cheque_number: None,
                date: None,
            },
            vec![invoice_item(&p, 2)],
            Utc::now(),
        )
    }

    #[test]
    fn test_invoice_effect_and_reversal() {
        let mut c = customer();
        let inv = sale(20_000, 5_000);
        assert_eq!(inv.status, InvoiceStatus::Partial);

        let effect = LedgerEffect::of_invoice(&inv);
        effect.apply(&mut c).unwrap();
        assert_eq!(c.balance.minor(), 15_000);
        assert_eq!(c.total_purchases.minor(), 20_000);

        effect.reversed().apply(&mut c).unwrap();
        assert_eq!(c.balance, Money::zero());
        assert_eq!(c.total_purchases, Money::zero());
    }

    #[test]
    fn test_overpayment_lowers_balance() {
        let mut c = customer();
        let inv = sale(10_000, 12_000);
        assert_eq!(inv.status, InvoiceStatus::Paid);
        LedgerEffect::of_invoice(&inv).apply(&mut c).unwrap();
        assert_eq!(c.balance.minor(), -2_000);
    }

    #[test]
    fn test_purchases_floor_at_zero_on_revert() {
        let mut c = customer();
        let inv = sale(20_000, 0);
        // Reverting an invoice that was never applied
        LedgerEffect::of_invoice(&inv).reversed().apply(&mut c).unwrap();
        assert_eq!(c.total_purchases, Money::zero());
        assert_eq!(c.balance.minor(), -20_000);
    }

    #[test]
    fn test_overflowing_balance_is_refused() {
        let mut c = customer();
        c.balance = Money::from_minor(i64::MAX - 100);
        let before = c.clone();

        let err = LedgerEffect::of_invoice(&sale(20_000, 0))
            .apply(&mut c)
            .unwrap_err();
        assert!(matches!(err, CoreError::BalanceOverflow { ref field, .. } if field == "balance"));
        assert_eq!(c, before);
    }

    #[test]
    fn test_repayment_effect() {
        let mut c = customer();
        let rep = build_repayment(
            "r1".into(),
            "Hamad".into(),
            NewRepayment {
                customer_id: "c1".into(),
                amount: Money::from_minor(10_000),
                method: RepaymentMethod::Cheque,
                note: Some("  ".into()),
                date: None,
            },
            Utc::now(),
        );
        assert!(rep.note.is_none());
        let effect = LedgerEffect::of_repayment(&rep);
        effect.apply(&mut c).unwrap();
        assert_eq!(c.balance.minor(), -10_000);
        effect.reversed().apply(&mut c).unwrap();
        assert_eq!(c.balance, Money::zero());
    }

    #[test]
    fn test_cylinder_effect_round_trip() {
        let p = product();
        for direction in [CylinderDirection::Out, CylinderDirection::In] {
            let mut c = customer();
            c.cylinder_balance.set("p12", 5);
            let tx = build_cylinder_transaction(
                "t1".into(),
                "Hamad".into(),
                &p,
                NewCylinderTransaction {
                    customer_id: "c1".into(),
                    product_id: "p12".into(),
                    quantity: 2,
                    direction,
                    note: None,
                    date: None,
                },
                Utc::now(),
            );
            let effect = LedgerEffect::of_cylinder(&tx);
            effect.apply(&mut c).unwrap();
            assert_eq!(c.cylinder_balance.get("p12"), 5 + direction.delta(2));
            effect.reversed().apply(&mut c).unwrap();
            assert_eq!(c.cylinder_balance.get("p12"), 5);
        }
    }

    #[test]
    fn test_manual_debt_invoice_shape() {
        let inv = manual_debt_invoice(
            "m1".into(),
            "c1".into(),
            "Hamad".into(),
            Money::from_minor(50_000),
            "opening balance",
            Utc::now(),
        );
        assert_eq!(inv.items.len(), 1);
        assert_eq!(inv.items[0].product_id, MANUAL_DEBT_PRODUCT_ID);
        assert_eq!(inv.items[0].product_name, "Manual debt: opening balance");
        assert_eq!(inv.payment_details.debt, inv.total_amount);
        assert_eq!(inv.status, InvoiceStatus::Debt);
    }

    #[test]
    fn test_noop_effect() {
        let effect = LedgerEffect {
            customer_id: "c1".into(),
            purchases: Money::zero(),
            balance: Money::zero(),
            cylinders: None,
        };
        assert!(effect.is_noop());
        assert!(!LedgerEffect::of_invoice(&sale(100, 0)).is_noop());
    }
}
