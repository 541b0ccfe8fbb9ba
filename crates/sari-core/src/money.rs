//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  In many retail systems:                                                │
//! │    ₱10.00 / 3 = ₱3.33 (×3 = ₱9.99)  → Lost ₱0.01!                      │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Centavos                                         │
//! │    1000 centavos / 3 = 333 centavos (×3 = 999 centavos)                │
//! │    We KNOW we lost 1 centavo, and handle it explicitly                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use sari_core::money::Money;
//!
//! // Create from centavos (preferred)
//! let price = Money::from_cents(1099); // ₱10.99
//!
//! // Arithmetic operations
//! let doubled = price * 2;            // ₱21.98
//! let total = price + Money::from_cents(500); // ₱15.99
//! ```
//!
//! The server speaks decimal pesos on the wire; [`Money::from_pesos`] and
//! [`Money::to_pesos`] exist for that DTO boundary and nowhere else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit
/// (centavos for PHP).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for refunds, corrections
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
///
/// ## User Workflow Context
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                    Where Money is Used                                  │
/// │                                                                         │
/// │  Product.sell_price ──► Order quantity × price ──► Transaction total   │
/// │                                                                         │
/// │  CheckoutDialog cash_received ──► change due ──► Transaction record    │
/// │                                                                         │
/// │  EVERY monetary value in the system flows through this type            │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from centavos (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use sari_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // Represents ₱10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    ///
    /// ## Why Centavos?
    /// Using the smallest unit eliminates all floating-point concerns.
    /// The database, calculations, and queue payloads all use centavos.
    /// Only the wire DTOs convert to decimal pesos for the server.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units (pesos and centavos).
    ///
    /// ## Example
    /// ```rust
    /// use sari_core::money::Money;
    ///
    /// let price = Money::from_major_minor(10, 99); // ₱10.99
    /// assert_eq!(price.cents(), 1099);
    ///
    /// let negative = Money::from_major_minor(-5, 50); // -₱5.50 (refund)
    /// assert_eq!(negative.cents(), -550);
    /// ```
    ///
    /// ## Note
    /// For negative amounts, only the major unit should be negative.
    /// `from_major_minor(-5, 50)` = -₱5.50, not -₱4.50
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        // Handle sign: if major is negative, minor should subtract
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Converts a decimal peso amount (as the server sends it) to Money.
    ///
    /// Rounds to the nearest centavo, so the float noise a JSON number
    /// carries cannot leak into stored amounts.
    ///
    /// ## Example
    /// ```rust
    /// use sari_core::money::Money;
    ///
    /// assert_eq!(Money::from_pesos(50.0).cents(), 5000);
    /// assert_eq!(Money::from_pesos(10.99).cents(), 1099);
    /// // Classic float noise collapses back to the intended amount
    /// assert_eq!(Money::from_pesos(0.1 + 0.2).cents(), 30);
    /// ```
    ///
    /// ## Boundary Only
    /// This is for the REST DTO layer. Internal code never constructs
    /// Money from floats.
    #[inline]
    pub fn from_pesos(pesos: f64) -> Self {
        Money((pesos * 100.0).round() as i64)
    }

    /// Converts to a decimal peso amount for the wire.
    ///
    /// ## Example
    /// ```rust
    /// use sari_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert!((price.to_pesos() - 10.99).abs() < 1e-9);
    /// ```
    #[inline]
    pub fn to_pesos(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Returns the value in centavos (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (pesos) portion.
    ///
    /// ## Example
    /// ```rust
    /// use sari_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.pesos(), 10);
    ///
    /// let negative = Money::from_cents(-550);
    /// assert_eq!(negative.pesos(), -5);
    /// ```
    #[inline]
    pub const fn pesos(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit (centavos) portion (always 0-99).
    ///
    /// ## Example
    /// ```rust
    /// use sari_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents_part(), 99);
    ///
    /// let negative = Money::from_cents(-550);
    /// assert_eq!(negative.cents_part(), 50); // Absolute value
    /// ```
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    ///
    /// ## Example
    /// ```rust
    /// use sari_core::money::Money;
    ///
    /// let zero = Money::zero();
    /// assert_eq!(zero.cents(), 0);
    /// assert!(zero.is_zero());
    /// ```
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    ///
    /// ## Example
    /// ```rust
    /// use sari_core::money::Money;
    ///
    /// let refund = Money::from_cents(-550);
    /// assert_eq!(refund.abs().cents(), 550);
    /// ```
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use sari_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299); // ₱2.99
    /// let line_total = unit_price.multiply_quantity(3);
    /// assert_eq!(line_total.cents(), 897); // ₱8.97
    /// ```
    ///
    /// ## User Workflow
    /// ```text
    /// Product: Coca-Cola ₱2.99
    /// Quantity: 3
    ///      │
    ///      ▼
    /// multiply_quantity(3) ← THIS FUNCTION
    ///      │
    ///      ▼
    /// Line Total: ₱8.97
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
///
/// ## Note
/// This is for debugging and logs. Use frontend formatting for actual UI
/// display to handle localization properly.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}₱{}.{:02}", sign, self.pesos().abs(), self.cents_part())
    }
}

/// Default money is zero.
impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

/// Addition of two Money values.
impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

/// Addition assignment (+=).
impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

/// Subtraction of two Money values.
impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

/// Subtraction assignment (-=).
impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Multiplication by integer (for quantity calculations).
impl Mul<i32> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i32) -> Self {
        Money(self.0 * qty as i64)
    }
}

/// Multiplication by i64.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
