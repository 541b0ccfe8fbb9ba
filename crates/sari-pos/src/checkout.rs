//! # Checkout
//!
//! Turns the active cart into a completed sale, and completed sales into
//! refunds.
//!
//! ## Finalize Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        finalize()                                       │
//! │                                                                         │
//! │  active cart with ≥1 line?  ──no──► EmptyCart                           │
//! │  payment method known?      ──no──► PaymentMethodNotFound               │
//! │  cash method: tendered ≥ live total?  ──no──► InsufficientPayment       │
//! │  e-wallet: reference number present?  ──no──► validation error          │
//! │       │                                                                 │
//! │       ▼  one SQLite transaction                                         │
//! │  status = completed, total frozen, payment recorded                     │
//! │  + sync queue item (frozen wire payload)                                │
//! │       │ commit                                                          │
//! │       ▼                                                                 │
//! │  best-effort push (failure absorbed, sale stays queued)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The total is computed live inside the write transaction, never taken
//! from the caller. After the commit the sale exists locally no matter what
//! the network does.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use sari_core::validation::validate_reference_number;
use sari_core::{
    CoreError, Money, RefundKind, Transaction, ValidationError, LOCAL_STOCK_DECREMENT_AT_FINALIZE,
};
use sari_db::{
    Database, DbError, PaymentMethodRepository, ProductRepository, TransactionRepository,
};
use sari_sync::Reconciler;

use crate::error::PosResult;

/// Finalize and refund operations.
///
/// Shares the cart engine's write lock: a finalize never interleaves with a
/// cart mutation. The lock is released at commit; the network push after it
/// runs without blocking cart work.
#[derive(Debug, Clone)]
pub struct Checkout {
    db: Database,
    reconciler: Reconciler,
    write_lock: Arc<Mutex<()>>,
}

impl Checkout {
    pub(crate) fn new(db: Database, reconciler: Reconciler, write_lock: Arc<Mutex<()>>) -> Self {
        Self {
            db,
            reconciler,
            write_lock,
        }
    }

    /// Completes the active transaction.
    ///
    /// Cash-equivalent methods require `cash_received` to cover the total;
    /// reference-bearing methods (e-wallets) skip the sufficiency check but
    /// require `reference_number`. A supplied reference is trimmed and
    /// capped at 64 characters whatever the method. Returns the completed
    /// transaction, with `server_id` already set when the immediate push
    /// got through.
    pub async fn finalize(
        &self,
        payment_method_id: i64,
        cash_received: Option<Money>,
        reference_number: Option<&str>,
    ) -> PosResult<Transaction> {
        let reference = match reference_number {
            Some(raw) => Some(validate_reference_number(raw).map_err(CoreError::Validation)?),
            None => None,
        };

        let guard = self.write_lock.lock().await;
        let mut db_txn = self.db.begin().await?;

        let active = TransactionRepository::active_in(&mut db_txn)
            .await?
            .ok_or(CoreError::EmptyCart)?;
        if TransactionRepository::count_orders_in(&mut db_txn, &active.id).await? == 0 {
            return Err(CoreError::EmptyCart.into());
        }

        let method = PaymentMethodRepository::get_by_id_in(&mut db_txn, payment_method_id)
            .await?
            .ok_or(CoreError::PaymentMethodNotFound(payment_method_id))?;

        let total_cents = TransactionRepository::total_in(&mut db_txn, &active.id).await?;
        let total = Money::from_cents(total_cents);

        if method.requires_reference {
            if reference.is_none() {
                return Err(CoreError::Validation(ValidationError::Required {
                    field: "reference_number".into(),
                })
                .into());
            }
        } else {
            let received = cash_received.unwrap_or_else(Money::zero);
            if received < total {
                return Err(CoreError::InsufficientPayment {
                    received,
                    required: total,
                }
                .into());
            }
        }

        let orders = TransactionRepository::orders_in(&mut db_txn, &active.id).await?;

        TransactionRepository::finalize_in(
            &mut db_txn,
            &active.id,
            payment_method_id,
            cash_received.map(|m| m.cents()),
            reference,
            total_cents,
        )
        .await?;

        if LOCAL_STOCK_DECREMENT_AT_FINALIZE {
            for order in &orders {
                ProductRepository::adjust_stock_in(&mut db_txn, order.product_id, -order.quantity)
                    .await?;
            }
        }

        let finalized = TransactionRepository::get_by_id_in(&mut db_txn, &active.id)
            .await?
            .ok_or_else(|| DbError::not_found("transaction", active.id.clone()))?;
        Reconciler::enqueue_transaction_in(&mut db_txn, &finalized, &orders).await?;

        db_txn.commit().await?;
        info!(
            transaction_id = %finalized.id,
            total = %finalized.total_price(),
            method = %method.name,
            "Sale finalized"
        );

        // The sale is committed; the push happens outside the cart lock.
        drop(guard);

        // Best-effort push; on success the row gained a server id.
        if self.reconciler.try_push(&finalized.id).await {
            if let Some(fresh) = self.db.transactions().get_by_id(&finalized.id).await? {
                return Ok(fresh);
            }
        }
        Ok(finalized)
    }

    /// Marks a completed sale refunded (fully or partially).
    ///
    /// The status flip and the refund queue item commit together; the push
    /// afterward is best-effort. A refund of a sale the server has not seen
    /// yet stays queued behind the sale's own create.
    pub async fn refund(&self, transaction_id: &str, kind: RefundKind) -> PosResult<Transaction> {
        let guard = self.write_lock.lock().await;
        let mut db_txn = self.db.begin().await?;

        let transaction = TransactionRepository::get_by_id_in(&mut db_txn, transaction_id)
            .await?
            .ok_or_else(|| CoreError::TransactionNotFound(transaction_id.to_string()))?;

        let target = kind.target_status();
        if !transaction.status.can_become(target) {
            return Err(CoreError::InvalidStatusTransition {
                transaction_id: transaction.id,
                from: transaction.status,
                to: target,
            }
            .into());
        }

        TransactionRepository::set_status_in(&mut db_txn, transaction_id, transaction.status, target)
            .await?;
        Reconciler::enqueue_refund_in(&mut db_txn, transaction_id, target).await?;

        db_txn.commit().await?;
        info!(transaction_id = %transaction_id, status = ?target, "Refund recorded");

        drop(guard);
        self.reconciler.try_push(transaction_id).await;

        Ok(self
            .db
            .transactions()
            .get_by_id(transaction_id)
            .await?
            .ok_or_else(|| DbError::not_found("transaction", transaction_id.to_string()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartEngine;
    use crate::error::PosError;
    use chrono::Utc;
    use sari_core::{Product, QueueKind, TransactionStatus};
    use sari_db::DbConfig;
    use sari_sync::{RestClient, SyncConfig};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        db: Database,
        cart: CartEngine,
        checkout: Checkout,
    }

    /// Wires cart and checkout the way `Pos` does, against a mock server.
    /// Tests that want "offline" simply mount no routes: the push gets a
    /// 404 and is absorbed, like any other push failure.
    async fn harness(server: &MockServer) -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut config = SyncConfig::new();
        config.api.base_url = server.uri();
        config.api.clerk_id = "clerk-7".into();
        let reconciler = Reconciler::new(db.clone(), RestClient::new(&config).unwrap());
        let lock = Arc::new(Mutex::new(()));
        Harness {
            cart: CartEngine::new(db.clone(), Arc::clone(&lock)),
            checkout: Checkout::new(db.clone(), reconciler, lock),
            db,
        }
    }

    async fn seed_product(db: &Database, id: i64, code: &str, price_cents: i64, stock: i64) {
        db.products()
            .upsert(&Product {
                id,
                code: code.into(),
                name: format!("Product {id}"),
                description: None,
                buy_price_cents: price_cents / 2,
                sell_price_cents: price_cents,
                stock,
                low_stock_level: 5,
                expiration_date: None,
                category_id: None,
                cached_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_cart_cannot_finalize() {
        let server = MockServer::start().await;
        let h = harness(&server).await;

        let err = h.checkout.finalize(1, None, None).await.unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::EmptyCart)));

        // An active transaction with zero lines is still an empty cart.
        h.cart.ensure_active_transaction().await.unwrap();
        let err = h.checkout.finalize(1, None, None).await.unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::EmptyCart)));
    }

    #[tokio::test]
    async fn cash_must_cover_the_live_total() {
        let server = MockServer::start().await;
        let h = harness(&server).await;
        seed_product(&h.db, 7, "COKE-330", 1000, 24).await;
        h.cart.add_item("COKE-330", 2).await.unwrap();

        let err = h
            .checkout
            .finalize(1, Some(Money::from_cents(1500)), None)
            .await
            .unwrap_err();
        match err {
            PosError::Core(CoreError::InsufficientPayment { received, required }) => {
                assert_eq!(received, Money::from_cents(1500));
                assert_eq!(required, Money::from_cents(2000));
            }
            other => panic!("expected InsufficientPayment, got {other:?}"),
        }

        // Nothing changed: cart still active, nothing queued.
        assert!(h.cart.active_transaction().await.unwrap().is_some());
        assert_eq!(h.db.sync_queue().count_pending().await.unwrap(), 0);

        // Absent cash counts as zero.
        let err = h.checkout.finalize(1, None, None).await.unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::InsufficientPayment { .. })
        ));

        // Exact payment passes.
        let sale = h
            .checkout
            .finalize(1, Some(Money::from_cents(2000)), None)
            .await
            .unwrap();
        assert_eq!(sale.status, TransactionStatus::Completed);
        assert_eq!(sale.change_due(), Some(Money::zero()));
    }

    #[tokio::test]
    async fn unknown_payment_method_is_rejected() {
        let server = MockServer::start().await;
        let h = harness(&server).await;
        seed_product(&h.db, 7, "COKE-330", 1000, 24).await;
        h.cart.add_item("COKE-330", 1).await.unwrap();

        let err = h
            .checkout
            .finalize(999, Some(Money::from_cents(1000)), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::PaymentMethodNotFound(999))
        ));
    }

    #[tokio::test]
    async fn ewallet_needs_a_reference_but_no_cash() {
        let server = MockServer::start().await;
        let h = harness(&server).await;
        seed_product(&h.db, 7, "COKE-330", 1000, 24).await;
        h.cart.add_item("COKE-330", 2).await.unwrap();

        // Seeded method 4 (Mobile Payment) carries requires_reference = 1.
        let err = h.checkout.finalize(4, None, None).await.unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::Validation(ValidationError::Required { .. }))
        ));

        let sale = h
            .checkout
            .finalize(4, None, Some("GC-778812"))
            .await
            .unwrap();
        assert_eq!(sale.reference_number.as_deref(), Some("GC-778812"));
        assert_eq!(sale.cash_received_cents, None);
        assert_eq!(sale.total_price(), Money::from_cents(2000));
    }

    #[tokio::test]
    async fn reference_numbers_are_trimmed_and_capped() {
        let server = MockServer::start().await;
        let h = harness(&server).await;
        seed_product(&h.db, 7, "COKE-330", 1000, 24).await;
        h.cart.add_item("COKE-330", 1).await.unwrap();

        let overlong = "9".repeat(65);
        let err = h
            .checkout
            .finalize(4, None, Some(&overlong))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::Validation(ValidationError::TooLong { .. }))
        ));
        // The cap applies to a reference on a cash sale too.
        let err = h
            .checkout
            .finalize(1, Some(Money::from_cents(1000)), Some(&overlong))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::Validation(ValidationError::TooLong { .. }))
        ));
        // Nothing finalized, nothing queued.
        assert!(h.cart.active_transaction().await.unwrap().is_some());
        assert_eq!(h.db.sync_queue().count_pending().await.unwrap(), 0);

        let sale = h
            .checkout
            .finalize(4, None, Some("  GC-778812  "))
            .await
            .unwrap();
        assert_eq!(sale.reference_number.as_deref(), Some("GC-778812"));
    }

    #[tokio::test]
    async fn finalize_commits_sale_and_queue_item_together() {
        let server = MockServer::start().await;
        let h = harness(&server).await;
        seed_product(&h.db, 7, "COKE-330", 1000, 24).await;
        seed_product(&h.db, 8, "PANCIT-80", 800, 48).await;
        h.cart.add_item("COKE-330", 2).await.unwrap();
        h.cart.add_item("PANCIT-80", 1).await.unwrap();

        let sale = h
            .checkout
            .finalize(1, Some(Money::from_cents(5000)), None)
            .await
            .unwrap();

        assert_eq!(sale.status, TransactionStatus::Completed);
        assert_eq!(sale.total_price(), Money::from_cents(2800));
        assert_eq!(sale.change_due(), Some(Money::from_cents(2200)));
        // Push failed (no route mounted), sale stays local and queued.
        assert!(sale.server_id.is_none());
        assert!(h.cart.active_transaction().await.unwrap().is_none());

        let pending = h.db.sync_queue().pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, QueueKind::Transaction);
        assert_eq!(pending[0].transaction_id, sale.id);

        let payload: serde_json::Value = serde_json::from_str(&pending[0].payload).unwrap();
        assert_eq!(payload["total_price"], json!(28.0));
        assert_eq!(payload["cash_received"], json!(50.0));
        assert_eq!(payload["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn finalized_total_is_frozen_against_price_changes() {
        let server = MockServer::start().await;
        let h = harness(&server).await;
        seed_product(&h.db, 7, "COKE-330", 1000, 24).await;
        h.cart.add_item("COKE-330", 2).await.unwrap();

        let sale = h
            .checkout
            .finalize(1, Some(Money::from_cents(2000)), None)
            .await
            .unwrap();
        assert_eq!(sale.total_price(), Money::from_cents(2000));

        // A catalog refresh after the sale must not rewrite history.
        seed_product(&h.db, 7, "COKE-330", 1200, 24).await;

        let reloaded = h
            .db
            .transactions()
            .get_by_id(&sale.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.total_price_cents, 2000);

        let pending = h.db.sync_queue().pending().await.unwrap();
        let payload: serde_json::Value = serde_json::from_str(&pending[0].payload).unwrap();
        assert_eq!(payload["total_price"], json!(20.0));
    }

    #[tokio::test]
    async fn stock_is_not_decremented_locally_at_finalize() {
        let server = MockServer::start().await;
        let h = harness(&server).await;
        seed_product(&h.db, 7, "COKE-330", 1000, 50).await;
        h.cart.add_item("COKE-330", 3).await.unwrap();

        h.checkout
            .finalize(1, Some(Money::from_cents(3000)), None)
            .await
            .unwrap();

        // Stock is server-authoritative; the cache changes only on refresh.
        let product = h.db.products().get_by_id(7).await.unwrap().unwrap();
        assert_eq!(product.stock, 50);
    }

    #[tokio::test]
    async fn finalize_pushes_to_the_server_when_online() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transactions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 4242,
                "status": "completed",
                "date_of_transaction": "2024-06-15T08:30:00Z",
                "total_price": 20.0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server).await;
        seed_product(&h.db, 7, "COKE-330", 1000, 24).await;
        h.cart.add_item("COKE-330", 2).await.unwrap();

        let sale = h
            .checkout
            .finalize(1, Some(Money::from_cents(2000)), None)
            .await
            .unwrap();

        assert_eq!(sale.server_id, Some(4242));
        assert_eq!(h.db.sync_queue().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn refund_flips_status_and_queues_behind_the_sale() {
        let server = MockServer::start().await;
        let h = harness(&server).await;
        seed_product(&h.db, 7, "COKE-330", 1000, 24).await;
        h.cart.add_item("COKE-330", 1).await.unwrap();
        let sale = h
            .checkout
            .finalize(1, Some(Money::from_cents(1000)), None)
            .await
            .unwrap();

        let refunded = h.checkout.refund(&sale.id, RefundKind::Full).await.unwrap();
        assert_eq!(refunded.status, TransactionStatus::Refunded);

        let pending = h.db.sync_queue().pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].kind, QueueKind::Transaction);
        assert_eq!(pending[1].kind, QueueKind::Refund);

        // Fully refunded is terminal.
        let err = h
            .checkout
            .refund(&sale.id, RefundKind::Full)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::InvalidStatusTransition { .. })
        ));
    }

    #[tokio::test]
    async fn partial_refund_may_become_full() {
        let server = MockServer::start().await;
        let h = harness(&server).await;
        seed_product(&h.db, 7, "COKE-330", 1000, 24).await;
        h.cart.add_item("COKE-330", 2).await.unwrap();
        let sale = h
            .checkout
            .finalize(1, Some(Money::from_cents(2000)), None)
            .await
            .unwrap();

        let partial = h
            .checkout
            .refund(&sale.id, RefundKind::Partial)
            .await
            .unwrap();
        assert_eq!(partial.status, TransactionStatus::PartiallyRefunded);

        let full = h.checkout.refund(&sale.id, RefundKind::Full).await.unwrap();
        assert_eq!(full.status, TransactionStatus::Refunded);

        // One create plus two status changes queued, in order.
        assert_eq!(h.db.sync_queue().count_pending().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn refund_rejects_unknown_and_active_transactions() {
        let server = MockServer::start().await;
        let h = harness(&server).await;

        let err = h
            .checkout
            .refund("no-such-id", RefundKind::Full)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::TransactionNotFound(_))
        ));

        let active = h.cart.ensure_active_transaction().await.unwrap();
        let err = h
            .checkout
            .refund(&active.id, RefundKind::Full)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::InvalidStatusTransition { .. })
        ));
    }
}
