//! # Domain Types
//!
//! Core domain types used throughout Sari POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │   Transaction   │   │     Order       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (server)    │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  code (scan)    │   │  server_id?     │   │  transaction_id │       │
//! │  │  sell_price     │   │  status         │   │  product_id     │       │
//! │  │  stock (cache)  │   │  total_price    │   │  quantity       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ PaymentMethod   │   │TransactionStatus│   │ SyncQueueEntry  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (server)    │   │  Active         │   │  id (FIFO)      │       │
//! │  │  name           │   │  Completed      │   │  kind           │       │
//! │  │  requires_ref   │   │  PartiallyRef.. │   │  payload        │       │
//! │  └─────────────────┘   │  Refunded       │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identifier Policy
//! - Device-born rows (Transaction, Order): UUID v4 strings, generated
//!   offline without coordination. A transaction additionally learns its
//!   `server_id` after the first successful sync; that is the
//!   "already synced" marker the reconciler keys idempotence on.
//! - Server-born rows cached locally (Product, PaymentMethod): the server's
//!   integer id, unchanged.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Transaction Status
// =============================================================================

/// The lifecycle status of a transaction.
///
/// Exactly one transaction may be `Active` at a time on a device; the local
/// store enforces this with a partial unique index. Once `Completed`, the
/// only permitted changes are refund-status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// The open cart: items are being added.
    Active,
    /// Paid and finalized.
    Completed,
    /// Some line items were refunded.
    PartiallyRefunded,
    /// Fully refunded.
    Refunded,
}

impl TransactionStatus {
    /// Whether a status change from `self` to `next` is permitted.
    ///
    /// ```text
    /// Active ──finalize──► Completed ──► PartiallyRefunded ──► Refunded
    ///                           └────────────────────────────────┘
    /// ```
    /// `Active → Completed` is the finalizer's transition; everything after
    /// `Completed` is a refund transition. All other moves are rejected.
    pub fn can_become(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Active, Completed)
                | (Completed, PartiallyRefunded)
                | (Completed, Refunded)
                | (PartiallyRefunded, Refunded)
        )
    }

    /// True for the refund end-states.
    pub fn is_refund(self) -> bool {
        matches!(
            self,
            TransactionStatus::PartiallyRefunded | TransactionStatus::Refunded
        )
    }
}

impl Default for TransactionStatus {
    fn default() -> Self {
        TransactionStatus::Active
    }
}

// =============================================================================
// Refund Kind
// =============================================================================

/// How much of a completed transaction is being refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundKind {
    /// The whole sale comes back.
    Full,
    /// Only part of the sale comes back.
    Partial,
}

impl RefundKind {
    /// The transaction status this refund moves the record to.
    #[inline]
    pub fn target_status(self) -> TransactionStatus {
        match self {
            RefundKind::Full => TransactionStatus::Refunded,
            RefundKind::Partial => TransactionStatus::PartiallyRefunded,
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product in the local cache.
///
/// Products are born on the server; the device holds a read-mostly copy so
/// scanning and cart building work offline. `stock` is authoritative on the
/// server, and the cached value is a soft signal only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Server-assigned identifier.
    pub id: i64,

    /// Scannable business code (barcode contents). Unique.
    pub code: String,

    /// Display name shown to the clerk and on receipts.
    pub name: String,

    /// Optional description for product details.
    pub description: Option<String>,

    /// Acquisition cost in centavos (for margin reports).
    pub buy_price_cents: i64,

    /// Selling price in centavos. Cart totals always read the *current*
    /// value; prices are never frozen at add-to-cart time.
    pub sell_price_cents: i64,

    /// Cached stock level. Server-authoritative.
    pub stock: i64,

    /// Threshold below which the UI flags the product for reorder.
    pub low_stock_level: i64,

    /// Expiry date for perishables.
    pub expiration_date: Option<NaiveDate>,

    /// Optional category reference (server-side taxonomy).
    pub category_id: Option<i64>,

    /// When this row was last refreshed from the server.
    pub cached_at: DateTime<Utc>,
}

impl Product {
    /// Returns the selling price as a Money type.
    #[inline]
    pub fn sell_price(&self) -> Money {
        Money::from_cents(self.sell_price_cents)
    }

    /// Returns the acquisition cost as a Money type.
    #[inline]
    pub fn buy_price(&self) -> Money {
        Money::from_cents(self.buy_price_cents)
    }

    /// Soft availability check against the cached stock level.
    #[inline]
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }

    /// Whether the cached stock has fallen to the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.low_stock_level
    }

    /// Whether the product is past its expiry date on `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        match self.expiration_date {
            Some(expires) => expires < today,
            None => false,
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A sale transaction: the active cart while open, a completed sale after
/// checkout, a refund record after a refund transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Transaction {
    /// Device-generated UUID. The local identity of the sale, temporary in
    /// the sense that the server assigns its own id on first sync.
    pub id: String,

    /// Server-assigned id, present once the sale has synced. Its presence is
    /// the idempotence marker: a queue replay for a transaction that already
    /// has one is a no-op.
    pub server_id: Option<i64>,

    /// Lifecycle status.
    pub status: TransactionStatus,

    /// Stamped at creation, re-stamped at finalize.
    pub date_of_transaction: DateTime<Utc>,

    /// Payment method chosen at checkout.
    pub payment_method_id: Option<i64>,

    /// Cash tendered in centavos (for change calculation).
    pub cash_received_cents: Option<i64>,

    /// External reference for e-wallet payments (GCash receipt number etc.).
    pub reference_number: Option<String>,

    /// Authoritative total in centavos, computed at finalize time.
    pub total_price_cents: i64,
}

impl Transaction {
    /// Returns the total as Money.
    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }

    /// Returns the cash tendered as Money, if recorded.
    #[inline]
    pub fn cash_received(&self) -> Option<Money> {
        self.cash_received_cents.map(Money::from_cents)
    }

    /// Whether the server knows about this transaction yet.
    #[inline]
    pub fn is_synced(&self) -> bool {
        self.server_id.is_some()
    }

    /// Change due to the customer, when cash was tendered.
    pub fn change_due(&self) -> Option<Money> {
        self.cash_received().map(|cash| cash - self.total_price())
    }
}

// =============================================================================
// Order (line item)
// =============================================================================

/// A line item on a transaction.
///
/// Owned exclusively by its transaction. At most one order per
/// `(transaction_id, product_id)` pair: adding the same product again
/// increments `quantity` instead of inserting a second row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    /// Device-generated UUID.
    pub id: String,

    /// Owning transaction.
    pub transaction_id: String,

    /// Product reference (server id, via the local cache).
    pub product_id: i64,

    /// Units of the product. Always ≥ 1; setting it to 0 deletes the row.
    pub quantity: i64,
}

// =============================================================================
// Cart Line (display view)
// =============================================================================

/// An order joined with its product, the shape cart screens render.
///
/// Unlike a frozen line-item snapshot, `unit_price_cents` here is the
/// *current* cached price. Re-querying after a price refresh yields the new
/// amount, matching how totals are computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CartLine {
    /// Order row id (what update/remove operations take).
    pub order_id: String,

    /// Product server id.
    pub product_id: i64,

    /// Scannable code, for display and re-scan matching.
    pub code: String,

    /// Product display name.
    pub name: String,

    /// Units on this line.
    pub quantity: i64,

    /// Current cached unit price in centavos.
    pub unit_price_cents: i64,
}

impl CartLine {
    /// Returns the current unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Line total at the current cached price.
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// A payment method from the server's reference table, cached locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PaymentMethod {
    /// Server-assigned identifier.
    pub id: i64,

    /// Display name ("Cash", "Mobile Payment", ...).
    pub name: String,

    /// Policy flag: this method settles through an external reference number
    /// (e-wallets). Such methods are exempt from the cash-sufficiency check
    /// at checkout and require `reference_number` instead.
    pub requires_reference: bool,
}

// =============================================================================
// Sync Queue
// =============================================================================

/// What kind of remote write a queue item replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// `POST /transactions`: a completed sale the server has not confirmed.
    Transaction,
    /// `PUT /transactions/:id`: a refund status change.
    Refund,
}

/// An entry in the offline sync queue.
///
/// Durable before the operation that created it returns; removed only when
/// the server confirms (or the target is already confirmed). A failed replay
/// leaves the row pending; there is no persisted terminal "failed" state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SyncQueueEntry {
    /// Autoincrement id, doubling as the FIFO replay key.
    pub id: i64,

    /// What to replay.
    pub kind: QueueKind,

    /// Local transaction this item belongs to (the retry lineage key:
    /// a refund never replays before its transaction's own create).
    pub transaction_id: String,

    /// The remote call body, pre-serialized JSON in the server's wire shape.
    pub payload: String,

    /// When the item was appended.
    pub enqueued_at: DateTime<Utc>,

    /// Number of replay attempts so far. Bookkeeping only; never gates
    /// replay.
    pub attempts: i64,

    /// Last replay error message, if any.
    pub last_error: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================
