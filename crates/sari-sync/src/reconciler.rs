//! # Queue Reconciler
//!
//! Replays the durable sync queue against the POS server and keeps the local
//! reference caches fresh.
//!
//! ## Drain Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          drain()                                        │
//! │                                                                         │
//! │  sync_queue (FIFO by insertion order)                                   │
//! │       │                                                                 │
//! │       ▼  per item                                                       │
//! │  cancelled? ──────────────────────────► stop, rest stays queued         │
//! │       │                                                                 │
//! │  earlier item for same transaction failed? ──► skip (keeps order)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  transaction row                                                        │
//! │   ├── create + server_id already set ──► drop item (idempotent)         │
//! │   ├── create ──► POST /transactions ──► store server_id + remove item   │
//! │   │                                      (one local write transaction)  │
//! │   └── refund ──► PUT /transactions/:server_id ──► remove item           │
//! │                                                                         │
//! │  on failure: attempts += 1, last_error recorded, item stays queued      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering Guarantee
//! Items replay strictly in enqueue order per transaction: a refund never
//! reaches the server before the sale it refunds. When an item fails, every
//! later item for the same transaction is skipped for the rest of the drain;
//! items for other transactions continue normally.
//!
//! ## Idempotence
//! `transactions.server_id` is the synced marker. A create item whose
//! transaction already carries a server id is removed without touching the
//! network, so a crash between the POST and the local bookkeeping can never
//! produce a duplicate sale on the server.
//!
//! Queue consumers also serialize on one lock: a checkout's immediate push
//! overlapping a manual drain (or two overlapping drains) runs after it, so
//! no item is ever in flight with two consumers at once.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use sqlx::SqliteConnection;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use sari_core::{Order, PaymentMethod, QueueKind, SyncQueueEntry, Transaction, TransactionStatus};
use sari_db::{Database, DbError, SyncQueueRepository, TransactionRepository};

use crate::client::RestClient;
use crate::dto::{RefundPayload, RemoteTransaction, TransactionPayload};
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Cancellation
// =============================================================================

/// Cooperative cancellation handle for a running drain.
///
/// Cancellation is observed at item boundaries only: the in-flight item
/// finishes (or fails) normally, then the drain stops and everything still
/// queued waits for the next run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Drain Summary
// =============================================================================

/// Per-drain counters, the numbers a sync button reports.
///
/// `error_count` includes items skipped behind a failed item for the same
/// transaction; each queue item accounts for exactly one counter bump,
/// except items dropped as stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Items confirmed by the server (or resolved as already synced).
    pub success_count: usize,
    /// Items that failed or were skipped and remain queued.
    pub error_count: usize,
}

/// Outcome of replaying a single queue item.
enum Replay {
    /// Server confirmed (or the item was already satisfied); item removed.
    Confirmed,
    /// Not ready yet (refund before its sale synced); item stays, lineage
    /// blocked for the rest of this drain.
    Deferred,
    /// Stale item referencing a missing transaction; removed, not counted.
    Dropped,
}

// =============================================================================
// Reconciler
// =============================================================================

/// Drives the sync queue and the local reference caches.
///
/// Cheap to clone; holds the shared database handle and an HTTP client.
/// Clones share one queue lock: [`Self::drain`], [`Self::try_push`], and
/// [`Self::clear_queue`] run one at a time across all clones.
#[derive(Debug, Clone)]
pub struct Reconciler {
    db: Database,
    client: RestClient,
    queue_lock: Arc<Mutex<()>>,
}

impl Reconciler {
    pub fn new(db: Database, client: RestClient) -> Self {
        Self {
            db,
            client,
            queue_lock: Arc::new(Mutex::new(())),
        }
    }

    // =========================================================================
    // Enqueue (outbox writes)
    // =========================================================================

    /// Queues a finalized transaction for sync, inside the caller's write
    /// transaction.
    ///
    /// Must run in the same transaction as the finalize itself: either the
    /// sale and its queue item both commit, or neither does. The wire body
    /// is serialized now and stored frozen, so later price or cart changes
    /// cannot alter what the server receives.
    pub async fn enqueue_transaction_in(
        conn: &mut SqliteConnection,
        transaction: &Transaction,
        orders: &[Order],
    ) -> SyncResult<SyncQueueEntry> {
        let payload = serde_json::to_string(&TransactionPayload::from_local(transaction, orders))?;
        let entry = SyncQueueRepository::enqueue_in(
            conn,
            QueueKind::Transaction,
            &transaction.id,
            &payload,
        )
        .await?;
        Ok(entry)
    }

    /// Queues a refund status change, inside the caller's write transaction.
    ///
    /// Same atomicity contract as [`Self::enqueue_transaction_in`]: commits
    /// with the local status flip or not at all.
    pub async fn enqueue_refund_in(
        conn: &mut SqliteConnection,
        transaction_id: &str,
        target: TransactionStatus,
    ) -> SyncResult<SyncQueueEntry> {
        let payload = serde_json::to_string(&RefundPayload { status: target })?;
        let entry =
            SyncQueueRepository::enqueue_in(conn, QueueKind::Refund, transaction_id, &payload)
                .await?;
        Ok(entry)
    }

    // =========================================================================
    // Drain
    // =========================================================================

    /// Replays every pending queue item in order.
    pub async fn drain(&self) -> SyncResult<DrainSummary> {
        self.drain_with_cancel(&CancelToken::new()).await
    }

    /// Replays pending queue items until done or `cancel` fires.
    ///
    /// Network and server failures are absorbed into the summary; only a
    /// local store failure aborts the drain with an error.
    ///
    /// Holds the queue lock for the whole pass: an overlapping push or a
    /// second drain waits, then finds the queue already emptied of whatever
    /// this pass confirmed.
    pub async fn drain_with_cancel(&self, cancel: &CancelToken) -> SyncResult<DrainSummary> {
        let _consumer = self.queue_lock.lock().await;
        let pending = self.db.sync_queue().pending().await?;
        if pending.is_empty() {
            debug!("Sync queue empty, nothing to drain");
            return Ok(DrainSummary::default());
        }

        info!(items = pending.len(), "Draining sync queue");
        let mut summary = DrainSummary::default();
        let mut failed_lineages: HashSet<String> = HashSet::new();

        for entry in pending {
            if cancel.is_cancelled() {
                info!(
                    pushed = summary.success_count,
                    "Drain cancelled, remaining items stay queued"
                );
                break;
            }

            if failed_lineages.contains(&entry.transaction_id) {
                debug!(
                    item_id = entry.id,
                    transaction_id = %entry.transaction_id,
                    "Skipping item queued behind a failed one"
                );
                summary.error_count += 1;
                continue;
            }

            match self.replay_item(&entry).await {
                Ok(Replay::Confirmed) => summary.success_count += 1,
                Ok(Replay::Dropped) => {}
                Ok(Replay::Deferred) => {
                    failed_lineages.insert(entry.transaction_id.clone());
                    summary.error_count += 1;
                }
                Err(SyncError::Db(e)) => return Err(e.into()),
                Err(e) => {
                    warn!(
                        item_id = entry.id,
                        error = %e,
                        "Replay failed, item stays queued"
                    );
                    self.record_failure(entry.id, &e).await;
                    failed_lineages.insert(entry.transaction_id.clone());
                    summary.error_count += 1;
                }
            }
        }

        info!(
            pushed = summary.success_count,
            failed = summary.error_count,
            "Drain finished"
        );
        Ok(summary)
    }

    /// Best-effort immediate push of one transaction's queued items.
    ///
    /// Called right after checkout or refund so a sale reaches the server
    /// while the connection is up. All failures are absorbed: the items are
    /// already durably queued and the next drain retries them.
    ///
    /// Waits for any in-flight drain before reading the queue; an item the
    /// drain already confirmed is gone by then and is not pushed again.
    ///
    /// Returns true when every item for the transaction was flushed.
    pub async fn try_push(&self, transaction_id: &str) -> bool {
        let _consumer = self.queue_lock.lock().await;
        let pending = match self.db.sync_queue().pending().await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Could not read sync queue for push");
                return false;
            }
        };

        for entry in pending.iter().filter(|e| e.transaction_id == transaction_id) {
            match self.replay_item(entry).await {
                Ok(Replay::Confirmed) | Ok(Replay::Dropped) => {}
                Ok(Replay::Deferred) => return false,
                Err(e) => {
                    debug!(
                        item_id = entry.id,
                        error = %e,
                        "Immediate push failed, item stays queued"
                    );
                    self.record_failure(entry.id, &e).await;
                    return false;
                }
            }
        }
        true
    }

    // =========================================================================
    // Queue inspection
    // =========================================================================

    /// Number of items waiting to sync (the badge on a sync button).
    pub async fn pending_count(&self) -> SyncResult<i64> {
        Ok(self.db.sync_queue().count_pending().await?)
    }

    /// Drops every pending queue item.
    ///
    /// ## Danger
    /// Queue items are the only record that a sale or refund still needs to
    /// reach the server. Clearing abandons that work permanently; the
    /// transactions stay local forever. Meant for operator recovery after a
    /// poison item, nothing else. Waits for any in-flight drain first.
    pub async fn clear_queue(&self) -> SyncResult<u64> {
        let _consumer = self.queue_lock.lock().await;
        let dropped = self.db.sync_queue().clear().await?;
        if dropped > 0 {
            warn!(dropped, "Cleared sync queue, unsynced work is abandoned");
        }
        Ok(dropped)
    }

    // =========================================================================
    // Reference cache refresh
    // =========================================================================

    /// Pulls the product catalog and upserts it into the local cache.
    ///
    /// Server wins on every field; products the server no longer returns
    /// are left in place (a missing product must not brick an offline
    /// cart that already references it).
    pub async fn refresh_products(&self) -> SyncResult<usize> {
        let remote = self.client.get_products().await?;
        let count = remote.len();
        let fetched_at = Utc::now();

        let repo = self.db.products();
        for product in remote {
            repo.upsert(&product.into_product(fetched_at)).await?;
        }

        info!(count, "Refreshed product cache");
        Ok(count)
    }

    /// Pulls the payment method table and upserts it into the local cache.
    ///
    /// Only names travel on the wire; the locally configured
    /// `requires_reference` policy survives the refresh.
    pub async fn refresh_payment_methods(&self) -> SyncResult<usize> {
        let remote = self.client.get_payment_methods().await?;
        let count = remote.len();

        let repo = self.db.payment_methods();
        for method in remote {
            repo.upsert(method.id, &method.name).await?;
        }

        info!(count, "Refreshed payment methods");
        Ok(count)
    }

    /// Fetches the server-side transaction history.
    ///
    /// A passthrough for history screens; nothing is merged into the local
    /// store, which only ever tracks this device's own sales.
    pub async fn fetch_remote_transactions(&self) -> SyncResult<Vec<RemoteTransaction>> {
        self.client.get_transactions().await
    }

    // =========================================================================
    // Payment method management (online only)
    // =========================================================================

    /// Creates a payment method on the server and caches it locally.
    pub async fn create_payment_method(&self, name: &str) -> SyncResult<PaymentMethod> {
        let created = self.client.create_payment_method(name).await?;
        self.db
            .payment_methods()
            .upsert(created.id, &created.name)
            .await?;
        self.local_method(created.id).await
    }

    /// Renames a payment method on the server and in the local cache.
    pub async fn update_payment_method(&self, id: i64, name: &str) -> SyncResult<PaymentMethod> {
        self.client.update_payment_method(id, name).await?;
        self.db.payment_methods().upsert(id, name).await?;
        self.local_method(id).await
    }

    /// Deletes a payment method on the server and from the local cache.
    pub async fn delete_payment_method(&self, id: i64) -> SyncResult<()> {
        self.client.delete_payment_method(id).await?;
        self.db.payment_methods().delete(id).await?;
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn replay_item(&self, entry: &SyncQueueEntry) -> SyncResult<Replay> {
        let transaction = match self.db.transactions().get_by_id(&entry.transaction_id).await? {
            Some(t) => t,
            None => {
                warn!(
                    item_id = entry.id,
                    transaction_id = %entry.transaction_id,
                    "Queue item references a missing transaction, dropping it"
                );
                self.db.sync_queue().remove(entry.id).await?;
                return Ok(Replay::Dropped);
            }
        };

        match entry.kind {
            QueueKind::Transaction => self.replay_create(entry, &transaction).await,
            QueueKind::Refund => self.replay_refund(entry, &transaction).await,
        }
    }

    async fn replay_create(
        &self,
        entry: &SyncQueueEntry,
        transaction: &Transaction,
    ) -> SyncResult<Replay> {
        if let Some(server_id) = transaction.server_id {
            debug!(
                transaction_id = %transaction.id,
                server_id,
                "Transaction already synced, dropping duplicate queue item"
            );
            self.db.sync_queue().remove(entry.id).await?;
            return Ok(Replay::Confirmed);
        }

        let created = self.client.create_transaction(&entry.payload).await?;

        // Record the server id and retire the queue item in one write
        // transaction; a crash leaves either both or the idempotence check
        // to clean up the leftover item on the next drain.
        let mut db_txn = self.db.begin().await?;
        TransactionRepository::set_server_id_in(&mut db_txn, &transaction.id, created.id).await?;
        SyncQueueRepository::remove_in(&mut db_txn, entry.id).await?;
        db_txn.commit().await.map_err(DbError::from)?;

        info!(
            transaction_id = %transaction.id,
            server_id = created.id,
            "Transaction synced"
        );
        Ok(Replay::Confirmed)
    }

    async fn replay_refund(
        &self,
        entry: &SyncQueueEntry,
        transaction: &Transaction,
    ) -> SyncResult<Replay> {
        let server_id = match transaction.server_id {
            Some(id) => id,
            None => {
                debug!(
                    transaction_id = %transaction.id,
                    "Refund waits for its transaction's first sync"
                );
                return Ok(Replay::Deferred);
            }
        };

        self.client
            .update_transaction_status(server_id, &entry.payload)
            .await?;
        self.db.sync_queue().remove(entry.id).await?;

        info!(transaction_id = %transaction.id, server_id, "Refund synced");
        Ok(Replay::Confirmed)
    }

    async fn record_failure(&self, item_id: i64, error: &SyncError) {
        if let Err(db_err) = self
            .db
            .sync_queue()
            .mark_failed(item_id, &error.to_string())
            .await
        {
            error!(item_id, error = %db_err, "Failed to record sync failure");
        }
    }

    async fn local_method(&self, id: i64) -> SyncResult<PaymentMethod> {
        Ok(self
            .db
            .payment_methods()
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("payment_method", id.to_string()))?)
    }
}
