//! # Repository Module
//!
//! Local store repository implementations for Sari POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Cart engine / reconciler                                              │
//! │       │                                                                 │
//! │       │  db.products().get_by_code("LM-PC-001")                        │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  ProductRepository                                                     │
//! │  ├── get_by_code(&self, code)          ← pool-level, self-contained   │
//! │  └── get_by_code_in(conn, code)        ← composes in a caller's       │
//! │       │                                   storage transaction          │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  The `*_in` associated functions take `&mut SqliteConnection` so that  │
//! │  multi-step mutations (find-or-create cart, finalize + enqueue) run    │
//! │  atomically inside one transaction held by the caller.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Product cache reads and upserts
//! - [`transaction::TransactionRepository`] - Transactions and their orders
//! - [`payment_method::PaymentMethodRepository`] - Payment method reference data
//! - [`queue::SyncQueueRepository`] - Offline sync queue

pub mod payment_method;
pub mod product;
pub mod queue;
pub mod transaction;
