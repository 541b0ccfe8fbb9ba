//! # sari-db: Local Store for Sari POS
//!
//! This crate provides on-device persistence for the Sari POS client.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sari POS Data Flow                               │
//! │                                                                         │
//! │  Cart engine / finalizer (sari-pos)     Reconciler (sari-sync)         │
//! │       │                                      │                          │
//! │       ▼                                      ▼                          │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     sari-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐ │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │ │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │ │   │
//! │  │   │               │    │ ProductRepo    │    │              │ │   │
//! │  │   │ SqlitePool    │◄───│ TransactionRepo│    │ 001_initial  │ │   │
//! │  │   │ begin()       │    │ PaymentMethods │    │ 002_payment  │ │   │
//! │  │   │ WAL mode      │    │ SyncQueueRepo  │    │     _methods │ │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘ │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   e.g. ~/.local/share/sari-pos/sari.db  (one file per device)  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (product, transaction, ...)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sari_db::{Database, DbConfig};
//!
//! // Create database with default config (runs migrations)
//! let config = DbConfig::new("path/to/sari.db");
//! let db = Database::new(config).await?;
//!
//! // Use repositories
//! let product = db.products().get_by_code("LM-PC-001").await?;
//!
//! // Compose several writes atomically
//! let mut txn = db.begin().await?;
//! // ... TransactionRepository::create_active_in(&mut txn).await? ...
//! txn.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::payment_method::PaymentMethodRepository;
pub use repository::product::ProductRepository;
pub use repository::queue::SyncQueueRepository;
pub use repository::transaction::TransactionRepository;
