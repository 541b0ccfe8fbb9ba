//! # POS Error Type
//!
//! The one error type an embedding app handles. Every layer below folds
//! into it:
//!
//! ```text
//! CoreError  (business rule broken, show the clerk a message)
//! DbError    (local store I/O, something is wrong with the device)
//! SyncError  (remote sync, usually just means "offline")
//!      │
//!      ▼
//!   PosError
//! ```
//!
//! The split that matters at the counter is [`PosError::is_validation`]:
//! validation failures are corrected by the clerk (scan again, add cash,
//! enter the reference number) and never indicate a broken device.

use thiserror::Error;

use sari_core::CoreError;
use sari_db::DbError;
use sari_sync::SyncError;

/// Result type alias for POS operations.
pub type PosResult<T> = Result<T, PosError>;

/// Top-level error for cart, checkout, and sync operations.
#[derive(Debug, Error)]
pub enum PosError {
    /// A business rule rejected the operation; state is unchanged.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The local store failed.
    #[error(transparent)]
    Db(#[from] DbError),

    /// The sync layer failed.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl From<sqlx::Error> for PosError {
    fn from(err: sqlx::Error) -> Self {
        PosError::Db(DbError::from(err))
    }
}

impl PosError {
    /// True when the clerk can fix this by correcting their input.
    pub fn is_validation(&self) -> bool {
        matches!(self, PosError::Core(_))
    }
}
