//! # Validation Module
//!
//! Input validation for GasPro.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: CLI (clap)                                                   │
//! │  └── Type validation (argument parsing)                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Required names, phone format                                      │
//! │  └── Positive amounts and quantities                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Ledger (gaspro-db)                                           │
//! │  ├── Customer exists, product exists                                   │
//! │  └── Consistency Guard on cylinder returns                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: SQLite constraints (NOT NULL, UNIQUE, FK)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here runs before a transaction is opened, so a failure never
//! leaves partial state behind.

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{CustomerProfile, NewCylinderTransaction, NewInvoice, NewRepayment};
use crate::{MAX_ITEM_QUANTITY, PHONE_DIGITS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a required display name (customer or product).
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 200 characters
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates an optional phone number.
///
/// ## Rules
/// - Absent or blank is fine
/// - Otherwise exactly 10 ASCII digits
///
/// ## Example
/// ```rust
/// use gaspro_core::validation::validate_phone;
///
/// assert!(validate_phone("phone", None).is_ok());
/// assert!(validate_phone("phone", Some("0591234567")).is_ok());
/// assert!(validate_phone("phone", Some("059123")).is_err());
/// ```
pub fn validate_phone(field: &str, phone: Option<&str>) -> ValidationResult<()> {
    let Some(phone) = phone.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(());
    };

    if phone.len() != PHONE_DIGITS || !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: format!("must be exactly {PHONE_DIGITS} digits"),
        });
    }

    Ok(())
}

/// Validates a search term.
///
/// ## Returns
/// The trimmed term.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line or movement quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an amount that must be strictly positive (totals, repayments).
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed [`Money::MAX_TRANSACTION`]
pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    validate_amount_ceiling(field, amount)
}

/// Validates an amount that may be zero but not negative (cash, cheque).
pub fn validate_non_negative_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    validate_amount_ceiling(field, amount)
}

fn validate_amount_ceiling(field: &str, amount: Money) -> ValidationResult<()> {
    if amount > Money::MAX_TRANSACTION {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: Money::MAX_TRANSACTION.major(),
        });
    }
    Ok(())
}

// =============================================================================
// Input Validators
// =============================================================================

/// Validates a customer profile for create or update.
pub fn validate_customer_profile(profile: &CustomerProfile) -> ValidationResult<()> {
    validate_name("name", &profile.name)?;
    validate_phone("phone", profile.phone.as_deref())?;
    validate_phone("whatsapp", profile.whatsapp.as_deref())?;
    Ok(())
}

/// Validates a sale before it reaches the ledger.
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Complete Sale                                                          │
/// │                                                                         │
/// │  items: [12kg × 2], total 200, cash 50                                 │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_new_invoice ← THIS FUNCTION                                  │
/// │       │                                                                 │
/// │       ├── no items?        → "items is required"                       │
/// │       ├── total ≤ 0?       → "total must be positive"                  │
/// │       ├── cash/cheque < 0? → "cash must not be negative"               │
/// │       ├── above MAX?       → "total must be between 0 and ..."         │
/// │       │                                                                 │
/// │       └── OK → Ledger::record_invoice                                  │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
///
/// Cash plus cheque may exceed the total: the negative debt is an
/// overpayment and lowers the customer's balance.
pub fn validate_new_invoice(input: &NewInvoice) -> ValidationResult<()> {
    if input.items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }
    for line in &input.items {
        validate_quantity(line.quantity)?;
    }
    validate_positive_amount("total", input.total_amount)?;
    validate_non_negative_amount("cash", input.cash)?;
    validate_non_negative_amount("cheque", input.cheque)?;
    Ok(())
}

pub fn validate_new_repayment(input: &NewRepayment) -> ValidationResult<()> {
    validate_positive_amount("amount", input.amount)
}

pub fn validate_new_cylinder_transaction(input: &NewCylinderTransaction) -> ValidationResult<()> {
    if input.product_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "product".to_string(),
        });
    }
    validate_quantity(input.quantity)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CylinderDirection, SaleLine};

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "Al-Noor Restaurant").is_ok());
        assert!(validate_name("name", "").is_err());
        assert!(validate_name("name", "   ").is_err());
        assert!(validate_name("name", &"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("phone", None).is_ok());
        assert!(validate_phone("phone", Some("")).is_ok());
        assert!(validate_phone("phone", Some("0591234567")).is_ok());

        assert!(validate_phone("phone", Some("059123456")).is_err());
        assert!(validate_phone("phone", Some("05912345678")).is_err());
        assert!(validate_phone("phone", Some("05912345a7")).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_new_invoice() {
        let mut input = NewInvoice {
            customer_id: "c1".into(),
            items: vec![SaleLine {
                product_id: "p1".into(),
                quantity: 2,
            }],
            total_amount: Money::from_minor(20_000),
            cash: Money::from_minor(5_000),
            cheque: Money::zero(),
            cheque_number: None,
            date: None,
        };
        assert!(validate_new_invoice(&input).is_ok());

        input.cash = Money::from_minor(-1);
        assert!(validate_new_invoice(&input).is_err());

        input.cash = Money::zero();
        input.total_amount = Money::zero();
        assert!(validate_new_invoice(&input).is_err());

        input.total_amount = Money::from_minor(100);
        input.items.clear();
        assert!(validate_new_invoice(&input).is_err());
    }

    #[test]
    fn test_overpayment_is_accepted() {
        let input = NewInvoice {
            customer_id: "c1".into(),
            items: vec![SaleLine {
                product_id: "p1".into(),
                quantity: 1,
            }],
            total_amount: Money::from_minor(10_000),
            cash: Money::from_minor(8_000),
            cheque: Money::from_minor(5_000),
            cheque_number: Some("000123".into()),
            date: None,
        };
        assert!(validate_new_invoice(&input).is_ok());
    }

    #[test]
    fn test_amounts_above_ceiling_are_rejected() {
        let huge = Money::parse("92233720368547758.07").unwrap();
        assert!(matches!(
            validate_positive_amount("total", huge),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(validate_non_negative_amount("cash", huge).is_err());
        assert!(validate_positive_amount("total", Money::MAX_TRANSACTION).is_ok());

        let input = NewInvoice {
            customer_id: "c1".into(),
            items: vec![SaleLine {
                product_id: "p1".into(),
                quantity: 1,
            }],
            total_amount: Money::from_minor(100),
            cash: Money::zero(),
            cheque: huge,
            cheque_number: None,
            date: None,
        };
        assert!(validate_new_invoice(&input).is_err());
    }

    #[test]
    fn test_validate_new_cylinder_transaction() {
        let input = NewCylinderTransaction {
            customer_id: "c1".into(),
            product_id: "".into(),
            quantity: 1,
            direction: CylinderDirection::Out,
            note: None,
            date: None,
        };
        assert!(validate_new_cylinder_transaction(&input).is_err());
    }

    #[test]
    fn test_validate_new_repayment() {
        let input = NewRepayment {
            customer_id: "c1".into(),
            amount: Money::zero(),
            method: Default::default(),
            note: None,
            date: None,
        };
        assert!(validate_new_repayment(&input).is_err());
    }
}
