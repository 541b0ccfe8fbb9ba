//! # Sari POS
//!
//! Offline-first point-of-sale engine for a sari-sari store counter.
//!
//! The store's single device rings up sales against a local SQLite store and
//! reconciles with the central POS server whenever the connection allows.
//! All money is Philippine pesos, held as integer centavos.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                             Pos                                         │
//! │                                                                         │
//! │   ┌────────────┐   ┌────────────┐   ┌───────────────────────────┐      │
//! │   │ CartEngine │   │  Checkout  │   │ Reconciler (sari-sync)    │      │
//! │   │ scan, edit │   │ pay, refund│   │ queue drain, cache refresh│      │
//! │   └─────┬──────┘   └─────┬──────┘   └────────────┬──────────────┘      │
//! │         │   shared write lock │                  │                      │
//! │         ▼                 ▼                      ▼                      │
//! │   ┌─────────────────────────────────┐   ┌─────────────────┐            │
//! │   │   Database (sari-db, SQLite)    │   │  POS server API │            │
//! │   │   products · transactions ·     │   │  (REST, JSON)   │            │
//! │   │   orders · sync queue           │   └─────────────────┘            │
//! │   └─────────────────────────────────┘                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//! ```rust,ignore
//! use sari_pos::{Money, Pos, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let pos = Pos::open(config).await?;
//!
//! pos.cart().add_item("4800016644931", 2).await?;
//! let sale = pos
//!     .checkout()
//!     .finalize(1, Some(Money::from_pesos(50.0)), None)
//!     .await?;
//! println!("change due: {}", sale.change_due().unwrap());
//!
//! // Later, when the store's connection is back:
//! let summary = pos.sync().drain().await?;
//! println!("pushed {} sales", summary.success_count);
//! ```

pub mod cart;
pub mod checkout;
pub mod error;

pub use cart::CartEngine;
pub use checkout::Checkout;
pub use error::{PosError, PosResult};

// The types an embedding app works with day to day.
pub use sari_core::{
    CartLine, CoreError, Money, Order, PaymentMethod, Product, RefundKind, Transaction,
    TransactionStatus,
};
pub use sari_db::{Database, DbConfig};
pub use sari_sync::{CancelToken, DrainSummary, Reconciler, RestClient, SyncConfig};

use std::sync::Arc;
use tokio::sync::Mutex;

/// The assembled POS: local store, cart, checkout, and sync wired together.
///
/// One `Pos` per device. Clones of the inner handles stay consistent with
/// each other; the cart and checkout share a write lock so their mutations
/// serialize.
#[derive(Debug)]
pub struct Pos {
    db: Database,
    reconciler: Reconciler,
    cart: CartEngine,
    checkout: Checkout,
}

impl Pos {
    /// Opens (creating and migrating as needed) the database named by the
    /// configuration and wires up all components.
    pub async fn open(config: SyncConfig) -> PosResult<Self> {
        let db = Database::new(DbConfig::new(config.database_path.clone())).await?;
        Self::with_database(db, &config)
    }

    /// Wires components around an already-opened database.
    ///
    /// Useful for embedding with a custom [`DbConfig`] (or an in-memory
    /// store in tests and demos).
    pub fn with_database(db: Database, config: &SyncConfig) -> PosResult<Self> {
        let client = RestClient::new(config)?;
        let reconciler = Reconciler::new(db.clone(), client);
        let write_lock = Arc::new(Mutex::new(()));
        Ok(Self {
            cart: CartEngine::new(db.clone(), Arc::clone(&write_lock)),
            checkout: Checkout::new(db.clone(), reconciler.clone(), write_lock),
            reconciler,
            db,
        })
    }

    /// Cart operations (scan, edit, clear).
    pub fn cart(&self) -> &CartEngine {
        &self.cart
    }

    /// Checkout operations (finalize, refund).
    pub fn checkout(&self) -> &Checkout {
        &self.checkout
    }

    /// Sync operations (drain, cache refresh, pending count).
    pub fn sync(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Direct access to the local store.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Closes the underlying connection pool.
    pub async fn close(&self) {
        self.db.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_and_migrates_a_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SyncConfig::new();
        config.database_path = dir.path().join("pos.db");

        let pos = Pos::open(config).await.unwrap();
        assert!(pos.cart().active_transaction().await.unwrap().is_none());
        assert_eq!(pos.sync().pending_count().await.unwrap(), 0);

        // Seeded reference data is in place.
        let methods = pos.database().payment_methods().list().await.unwrap();
        assert_eq!(methods.len(), 4);

        pos.close().await;
    }

    #[tokio::test]
    async fn facade_shares_one_cart_between_components() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let pos = Pos::with_database(db, &SyncConfig::new()).unwrap();

        let active = pos.cart().ensure_active_transaction().await.unwrap();
        let err = pos
            .checkout()
            .refund(&active.id, RefundKind::Full)
            .await
            .unwrap_err();
        // Checkout sees the cart engine's transaction: still active, so the
        // transition is rejected rather than the id being unknown.
        assert!(matches!(
            err,
            PosError::Core(CoreError::InvalidStatusTransition { .. })
        ));
    }
}
