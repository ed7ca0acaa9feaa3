//! # Consistency Guard
//!
//! Pre-commit rules that keep every cylinder holding at or above zero.
//!
//! ## Holding State Machine (one customer, one product)
//! ```text
//!              out(q): always allowed
//!          ┌──────────────────────────┐
//!          │                          ▼
//!     ┌─────────┐                ┌─────────┐
//!     │ holding │                │ holding │
//!     │   = h   │                │  = h+q  │
//!     └─────────┘                └─────────┘
//!          │
//!          │ in(q)
//!          ├── h ≤ 0  → NothingToReturn        (no state change)
//!          ├── q > h  → InsufficientCylinders  (no state change)
//!          └── else   → holding = h − q
//! ```
//!
//! The holding passed in must be the authoritative value read inside the
//! committing transaction. Checking against an earlier read lets two returns
//! each pass and jointly overdraw.

use crate::error::{CoreError, CoreResult};
use crate::types::CylinderDirection;

/// Checks a cylinder return against the customer's current holding.
///
/// ## Example
/// ```rust
/// use gaspro_core::guard::check_return;
///
/// assert!(check_return("12kg", 3, 3).is_ok());
/// assert!(check_return("12kg", 3, 4).is_err());
/// assert!(check_return("12kg", 0, 1).is_err());
/// ```
pub fn check_return(product_name: &str, holding: i64, requested: i64) -> CoreResult<()> {
    if holding <= 0 {
        return Err(CoreError::NothingToReturn {
            product: product_name.to_string(),
            requested,
        });
    }
    if requested > holding {
        return Err(CoreError::InsufficientCylinders {
            product: product_name.to_string(),
            holding,
            requested,
        });
    }
    Ok(())
}

/// Checks a new movement. Loans always pass; returns go through [`check_return`].
pub fn check_movement(
    product_name: &str,
    direction: CylinderDirection,
    holding: i64,
    quantity: i64,
) -> CoreResult<()> {
    match direction {
        CylinderDirection::Out => Ok(()),
        CylinderDirection::In => check_return(product_name, holding, quantity),
    }
}

/// Checks the removal of a recorded movement.
///
/// Removing a loan (`out`) takes cylinders back off the customer, so it must
/// not leave the holding negative. Removing a return (`in`) only adds.
pub fn check_removal(
    product_name: &str,
    direction: CylinderDirection,
    holding: i64,
    quantity: i64,
) -> CoreResult<()> {
    match direction {
        CylinderDirection::In => Ok(()),
        CylinderDirection::Out if quantity <= holding => Ok(()),
        CylinderDirection::Out => Err(CoreError::InsufficientCylinders {
            product: product_name.to_string(),
            holding,
            requested: quantity,
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_sequence() {
        // holding 3: returning 4 fails, 3 succeeds, then 1 more fails
        let err = check_return("12kg", 3, 4).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientCylinders {
                holding: 3,
                requested: 4,
                ..
            }
        ));
        assert!(check_return("12kg", 3, 3).is_ok());
        let err = check_return("12kg", 0, 1).unwrap_err();
        assert!(matches!(err, CoreError::NothingToReturn { requested: 1, .. }));
    }

    #[test]
    fn test_negative_holding_is_nothing_to_return() {
        assert!(matches!(
            check_return("48kg", -2, 1),
            Err(CoreError::NothingToReturn { .. })
        ));
    }

    #[test]
    fn test_loans_always_pass() {
        assert!(check_movement("12kg", CylinderDirection::Out, 0, 50).is_ok());
        assert!(check_movement("12kg", CylinderDirection::In, 0, 1).is_err());
    }

    #[test]
    fn test_removal_rules() {
        assert!(check_removal("12kg", CylinderDirection::In, 0, 5).is_ok());
        assert!(check_removal("12kg", CylinderDirection::Out, 5, 5).is_ok());
        assert!(matches!(
            check_removal("12kg", CylinderDirection::Out, 1, 2),
            Err(CoreError::InsufficientCylinders {
                holding: 1,
                requested: 2,
                ..
            })
        ));
    }
}
