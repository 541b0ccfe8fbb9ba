//! # Wire Data Transfer Objects
//!
//! Request and response bodies for the POS API, `snake_case` JSON.
//!
//! ## Money at the Boundary
//! The server speaks decimal pesos (`10.50`); everything local is integer
//! centavos. This module is the only place the two meet: inbound amounts go
//! through [`Money::from_pesos`], outbound through [`Money::to_pesos`].
//! Nothing outside `dto` touches floating-point money.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use sari_core::{Money, Order, Product, Transaction, TransactionStatus};

// =============================================================================
// Inbound: catalog and reference data
// =============================================================================

/// A product as the server sends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProduct {
    pub id: i64,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Acquisition cost in decimal pesos.
    pub buy_price: f64,
    /// Selling price in decimal pesos.
    pub sell_price: f64,
    pub stock: i64,
    pub low_stock_level: i64,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
    #[serde(default)]
    pub category_id: Option<i64>,
}

impl RemoteProduct {
    /// Converts to a local cache row, stamping when it was fetched.
    pub fn into_product(self, cached_at: DateTime<Utc>) -> Product {
        Product {
            id: self.id,
            code: self.code,
            name: self.name,
            description: self.description,
            buy_price_cents: Money::from_pesos(self.buy_price).cents(),
            sell_price_cents: Money::from_pesos(self.sell_price).cents(),
            stock: self.stock,
            low_stock_level: self.low_stock_level,
            expiration_date: self.expiration_date,
            category_id: self.category_id,
            cached_at,
        }
    }
}

/// A payment method as the server sends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePaymentMethod {
    pub id: i64,
    pub name: String,
}

// =============================================================================
// Inbound: transaction history
// =============================================================================

/// A transaction as the server reports it.
///
/// Most fields are optional: older server versions omit them, and the
/// listing endpoint elides detail the POS client does not need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTransaction {
    /// Server-assigned id (what refunds are keyed on).
    pub id: i64,
    #[serde(default)]
    pub status: Option<TransactionStatus>,
    pub date_of_transaction: DateTime<Utc>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<i64>,
    /// Cash tendered in decimal pesos.
    #[serde(default)]
    pub cash_received: Option<f64>,
    #[serde(default)]
    pub reference_number: Option<String>,
    /// Total in decimal pesos.
    pub total_price: f64,
}

impl RemoteTransaction {
    /// Returns the total as Money.
    pub fn total(&self) -> Money {
        Money::from_pesos(self.total_price)
    }
}

// =============================================================================
// Outbound: transaction sync
// =============================================================================

/// Body for `POST /transactions`, built once at enqueue time and stored
/// frozen in the sync queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub payment_method_id: i64,
    pub date_of_transaction: DateTime<Utc>,
    /// Cash tendered in decimal pesos. Omitted for e-wallet payments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_received: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    /// Total in decimal pesos.
    pub total_price: f64,
    pub items: Vec<TransactionItem>,
}

/// One line of an outbound transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionItem {
    pub product_id: i64,
    pub quantity: i64,
}

impl TransactionPayload {
    /// Builds the wire body from a finalized local transaction.
    ///
    /// Finalized transactions always carry a payment method; `0` only
    /// appears if a caller bypasses checkout validation.
    pub fn from_local(transaction: &Transaction, orders: &[Order]) -> Self {
        Self {
            payment_method_id: transaction.payment_method_id.unwrap_or_default(),
            date_of_transaction: transaction.date_of_transaction,
            cash_received: transaction.cash_received().map(|m| m.to_pesos()),
            reference_number: transaction.reference_number.clone(),
            total_price: transaction.total_price().to_pesos(),
            items: orders
                .iter()
                .map(|o| TransactionItem {
                    product_id: o.product_id,
                    quantity: o.quantity,
                })
                .collect(),
        }
    }
}

/// Body for `PUT /transactions/{server_id}`, marking a refund.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundPayload {
    pub status: TransactionStatus,
}

// =============================================================================
// Outbound: payment method management
// =============================================================================

/// Body for creating or renaming a payment method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodPayload {
    pub name: String,
}
