//! # Error Types
//!
//! Domain-specific error types for sari-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  sari-core errors (this file)                                          │
//! │  ├── CoreError        - Cart/checkout rule violations                  │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  sari-db errors (separate crate)                                       │
//! │  └── DbError          - Local store I/O failures                       │
//! │                                                                         │
//! │  sari-sync errors (separate crate)                                     │
//! │  └── SyncError        - Remote API / queue replay failures             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → PosError → embedding app          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product code, order id, amounts)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a user-facing message
//!
//! Every `CoreError` is a validation failure: it aborts the triggering
//! operation, leaves all state unchanged, and is surfaced to the UI for
//! correction. Nothing here is retried automatically.

use thiserror::Error;

use crate::money::Money;
use crate::types::TransactionStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or domain logic failures.
/// They should be caught and translated to user-friendly messages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No product in the local cache matches the scanned/entered code.
    ///
    /// ## When This Occurs
    /// - Barcode scan of a product the device has never cached
    /// - Typo in a manually entered code
    /// - Product exists on the server but the cache is stale
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Cached stock for the product is zero (or below).
    ///
    /// This is a soft client-side check; the server enforces stock
    /// authoritatively when the sale syncs.
    ///
    /// ## User Workflow
    /// ```text
    /// Scan "COKE-330"
    ///      │
    ///      ▼
    /// Cached stock: 0
    ///      │
    ///      ▼
    /// OutOfStock { code: "COKE-330" }
    ///      │
    ///      ▼
    /// UI shows: "COKE-330 is out of stock"
    /// ```
    #[error("Product {code} is out of stock")]
    OutOfStock { code: String },

    /// The order id does not belong to the active transaction.
    #[error("Order not found on active transaction: {0}")]
    OrderNotFound(String),

    /// Transaction cannot be found.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// The payment method id is not in the local reference table.
    #[error("Payment method not found: {0}")]
    PaymentMethodNotFound(i64),

    /// Checkout was attempted with no line items on the active transaction
    /// (or with no active transaction at all).
    #[error("Cannot finalize an empty cart")]
    EmptyCart,

    /// Cash tendered is less than the transaction total.
    ///
    /// Only raised for cash-equivalent payment methods; methods that carry a
    /// reference number (e-wallets) are exempt from this check.
    #[error("Insufficient payment: received {received}, required {required}")]
    InsufficientPayment { received: Money, required: Money },

    /// Transaction is not in a state that allows the requested transition.
    ///
    /// ## When This Occurs
    /// - Refunding a transaction that is still active
    /// - Refunding an already fully refunded transaction
    #[error("Transaction {transaction_id} is {from:?}, cannot become {to:?}")]
    InvalidStatusTransition {
        transaction_id: String,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Cart has exceeded maximum allowed distinct items.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Item quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
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

    /// Invalid format (e.g., disallowed characters in a product code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
