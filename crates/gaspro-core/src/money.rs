//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A balance is the sum of hundreds of debts and repayments. Any          │
//! │  rounding error accumulates and reconciliation would "correct" drift   │
//! │  that is really float noise.                                           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units (agorot, 1/100 of a shekel)          │
//! │    Σ debt − Σ repayment is exact, every time                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use gaspro_core::money::Money;
//!
//! let total = Money::from_major_minor(200, 0);
//! let cash = Money::from_major_minor(50, 0);
//! assert_eq!((total - cash).minor(), 15_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A signed monetary value in minor units.
///
/// ## Sign Convention
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  customer.balance   > 0  → customer owes the business ("debt")          │
/// │  customer.balance   < 0  → business owes the customer ("credit")        │
/// │  invoice.debt       < 0  → the customer overpaid on that sale           │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
///
/// Serializes as a plain integer, so the persisted shape stays numeric.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use gaspro_core::money::Money;
    ///
    /// let price = Money::from_minor(1099);
    /// assert_eq!(price.minor(), 1099);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ## Note
    /// For negative amounts, only the major unit should be negative.
    /// `from_major_minor(-5, 50)` = -5.50, not -4.50
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Clamps negative values to zero.
    ///
    /// ## Where It's Used
    /// ```text
    /// deleteInvoice
    ///      │
    ///      ▼
    /// totalPurchases = (totalPurchases − invoice.total).floor_zero()
    /// ```
    /// Out-of-order deletes (e.g. after a partial sync) must never leave a
    /// negative purchase total.
    #[inline]
    pub const fn floor_zero(self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            self
        }
    }

    /// Largest amount a single transaction may carry (1,000,000,000.00).
    ///
    /// Keeps `total − cash − cheque` and any running balance far inside
    /// the i64 range.
    pub const MAX_TRANSACTION: Money = Money(100_000_000_000);

    #[inline]
    pub const fn checked_add(self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    #[inline]
    pub const fn checked_sub(self, other: Money) -> Option<Money> {
        match self.0.checked_sub(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    #[inline]
    pub const fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    /// Parses an operator-entered decimal string such as `"150"`, `"150.5"`
    /// or `"-20.75"` without going through floating point.
    ///
    /// ## Example
    /// ```rust
    /// use gaspro_core::money::Money;
    ///
    /// assert_eq!(Money::parse("150.5").unwrap().minor(), 15_050);
    /// assert_eq!(Money::parse("-20.75").unwrap().minor(), -2_075);
    /// assert!(Money::parse("12.345").is_none());
    /// ```
    pub fn parse(input: &str) -> Option<Money> {
        let s = input.trim();
        let (negative, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (major, minor) = match s.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (s, ""),
        };
        if major.is_empty() && minor.is_empty() {
            return None;
        }
        if !major.chars().all(|c| c.is_ascii_digit()) || !minor.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }
        if minor.len() > 2 {
            return None;
        }

        let major: i64 = if major.is_empty() { 0 } else { major.parse().ok()? };
        let minor: i64 = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().ok()? * 10,
            _ => minor.parse().ok()?,
        };
        let value = major.checked_mul(100)?.checked_add(minor)?;
        Some(Money(if negative { -value } else { value }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows the amount with two decimals and no currency symbol.
///
/// ## Note
/// This is for logs and CLI output. Currency formatting is a presentation
/// concern.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor_part())
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_minor() {
        let money = Money::from_minor(1099);
        assert_eq!(money.minor(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor_part(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).minor(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).minor(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(1099).to_string(), "10.99");
        assert_eq!(Money::from_minor(500).to_string(), "5.00");
        assert_eq!(Money::from_minor(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_minor(1000);
        let b = Money::from_minor(500);

        assert_eq!((a + b).minor(), 1500);
        assert_eq!((a - b).minor(), 500);
        assert_eq!((-a).minor(), -1000);
        assert_eq!((b - a).floor_zero(), Money::zero());
        assert_eq!((a - b).floor_zero(), b);
    }

    #[test]
    fn test_sum() {
        let debts = [Money::from_minor(150), Money::from_minor(-20), Money::from_minor(70)];
        let total: Money = debts.iter().sum();
        assert_eq!(total.minor(), 200);
        let total: Money = debts.into_iter().sum();
        assert_eq!(total.minor(), 200);
    }

    #[test]
    fn test_parse() {
        assert_eq!(Money::parse("200"), Some(Money::from_minor(20_000)));
        assert_eq!(Money::parse("0.5"), Some(Money::from_minor(50)));
        assert_eq!(Money::parse(".05"), Some(Money::from_minor(5)));
        assert_eq!(Money::parse(" 12.30 "), Some(Money::from_minor(1230)));
        assert_eq!(Money::parse("-3"), Some(Money::from_minor(-300)));
        assert_eq!(Money::parse(""), None);
        assert_eq!(Money::parse("."), None);
        assert_eq!(Money::parse("1.234"), None);
        assert_eq!(Money::parse("12a"), None);
    }

    #[test]
    fn test_serializes_as_integer() {
        let json = serde_json::to_string(&Money::from_minor(15_000)).unwrap();
        assert_eq!(json, "15000");
        let back: Money = serde_json::from_str("-250").unwrap();
        assert_eq!(back.minor(), -250);
    }
}
