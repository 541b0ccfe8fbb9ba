//! # sari-sync: Offline Sync for Sari POS
//!
//! This crate keeps the device and the remote server of record eventually
//! consistent: every completed sale and every refund reaches the server
//! exactly once, no matter how long the store was offline.
//!
//! ## Sync Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         sari-sync Data Flow                             │
//! │                                                                         │
//! │   finalize / refund (sari-pos)                                          │
//! │         │                                                               │
//! │         │ 1. queue row written in the SAME storage transaction          │
//! │         ▼    as the status change (outbox pattern)                      │
//! │  ┌─────────────┐        ┌──────────────┐        ┌───────────────────┐  │
//! │  │ sync_queue  │  FIFO  │  Reconciler  │  HTTP  │   Remote Server   │  │
//! │  │ (sari-db)   │───────►│ drain()      │───────►│ POST /transactions│  │
//! │  │             │        │ try_push()   │        │ PUT  /transactions│  │
//! │  └─────────────┘        └──────┬───────┘        └─────────┬─────────┘  │
//! │         ▲                      │ 3. on success:           │            │
//! │         │                      │    server_id recorded +  │ 2. server  │
//! │         │ failure: item        │    row removed (one unit │    assigns │
//! │         │ stays pending        │    of work)              │    its id  │
//! │         └──────────────────────┘                          │            │
//! │                                                           ▼            │
//! │                              idempotence: a transaction that already   │
//! │                              carries a server_id is never POSTed again │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`client`] - REST client (reqwest) carrying the clerk identity headers
//! - [`config`] - TOML + environment configuration pointing at the server
//! - [`dto`] - Wire shapes: snake_case JSON, decimal pesos at this boundary
//! - [`error`] - [`SyncError`] with retryability classification
//! - [`reconciler`] - Queue drain, immediate push, cache refresh
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sari_db::{Database, DbConfig};
//! use sari_sync::{CancelToken, Reconciler, RestClient, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new(&config.database_path)).await?;
//! let reconciler = Reconciler::new(db, RestClient::new(&config)?);
//!
//! // "Sync now" button
//! let summary = reconciler.drain().await?;
//! println!("{} synced, {} still pending", summary.success_count, summary.error_count);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod client;
pub mod config;
pub mod dto;
pub mod error;
pub mod reconciler;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::RestClient;
pub use config::{ApiSettings, SyncConfig};
pub use dto::{
    PaymentMethodPayload, RefundPayload, RemotePaymentMethod, RemoteProduct, RemoteTransaction,
    TransactionItem, TransactionPayload,
};
pub use error::{SyncError, SyncResult};
pub use reconciler::{CancelToken, DrainSummary, Reconciler};
