//! # Sync Queue Repository
//!
//! Persistence for the offline sync queue (outbox).
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LOCAL OPERATION (finalize / refund)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE STORAGE TRANSACTION                    │   │
//! │  │                                                                 │   │
//! │  │  1. UPDATE transactions SET status = 'completed' WHERE id = ?  │   │
//! │  │                                                                 │   │
//! │  │  2. INSERT INTO sync_queue (kind, transaction_id, payload)     │   │
//! │  │     VALUES ('transaction', ?, <wire body JSON>)                │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← Both succeed or both fail; a process kill between commit     │
//! │       │   and push can no longer lose the remote write                 │
//! │       ▼                                                                 │
//! │  Reconciler drains the queue in id order:                              │
//! │     success            → DELETE the row                                │
//! │     already synced     → DELETE the row (no duplicate POST)            │
//! │     failure            → attempts += 1, last_error = ?, row stays     │
//! │                                                                         │
//! │  No terminal "failed" state is persisted; a failed item simply waits   │
//! │  for the next drain.                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use sari_core::{QueueKind, SyncQueueEntry};

const QUEUE_COLUMNS: &str = r#"
    id,
    kind,
    transaction_id,
    payload,
    enqueued_at,
    attempts,
    last_error
"#;

/// Repository for sync queue operations.
#[derive(Debug, Clone)]
pub struct SyncQueueRepository {
    pool: SqlitePool,
}

impl SyncQueueRepository {
    /// Creates a new SyncQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncQueueRepository { pool }
    }

    /// Appends a queue item inside a caller-held transaction.
    ///
    /// Called from the finalize/refund unit of work so the queue row and
    /// the status change commit together.
    ///
    /// ## Arguments
    /// * `kind` - What remote call this item replays
    /// * `transaction_id` - Local transaction the payload belongs to
    /// * `payload` - Pre-serialized JSON wire body
    pub async fn enqueue_in(
        conn: &mut SqliteConnection,
        kind: QueueKind,
        transaction_id: &str,
        payload: &str,
    ) -> DbResult<SyncQueueEntry> {
        let now = Utc::now();

        debug!(?kind, transaction_id = %transaction_id, "Queuing for sync");

        let result = sqlx::query(
            r#"
            INSERT INTO sync_queue (kind, transaction_id, payload, enqueued_at, attempts)
            VALUES (?1, ?2, ?3, ?4, 0)
            "#,
        )
        .bind(kind)
        .bind(transaction_id)
        .bind(payload)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(SyncQueueEntry {
            id: result.last_insert_rowid(),
            kind,
            transaction_id: transaction_id.to_string(),
            payload: payload.to_string(),
            enqueued_at: now,
            attempts: 0,
            last_error: None,
        })
    }

    /// Gets all pending items in enqueue (FIFO) order.
    ///
    /// The autoincrement id is the replay order; a refund enqueued after
    /// its transaction is always drained after it.
    pub async fn pending(&self) -> DbResult<Vec<SyncQueueEntry>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM sync_queue ORDER BY id ASC");

        let entries = sqlx::query_as::<_, SyncQueueEntry>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Removes a confirmed item.
    pub async fn remove(&self, id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Removes a confirmed item inside a caller-held transaction.
    ///
    /// The reconciler removes the row and records the server id in one
    /// unit, so a kill between the two cannot strand a synced item.
    pub async fn remove_in(conn: &mut SqliteConnection, id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Records a failed replay attempt. The item stays pending.
    pub async fn mark_failed(&self, id: i64, error: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE sync_queue SET
                attempts = attempts + 1,
                last_error = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts pending items (the UI sync badge).
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Deletes every queue item unconditionally.
    ///
    /// ## Danger
    /// Items that never reached the server are gone for good; the sales
    /// they carried will not exist remotely. Only call after a full resync
    /// when every item is known synced or deliberately discarded.
    ///
    /// ## Returns
    /// Number of deleted items.
    pub async fn clear(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sync_queue").execute(&self.pool).await?;

        Ok(result.rows_affected())
    }
}
