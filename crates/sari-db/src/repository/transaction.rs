//! # Transaction Repository
//!
//! Local store operations for transactions and their order line items.
//!
//! ## Transaction Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Transaction Lifecycle                                │
//! │                                                                         │
//! │  1. OPEN CART (at most one)                                            │
//! │     └── create_active_in() → Transaction { status: Active }            │
//! │                                                                         │
//! │  2. MUTATE ORDERS                                                      │
//! │     └── insert_order_in() / set_order_quantity_in() / delete_order_in()│
//! │     └── total_in() → live SUM(quantity × current sell price)           │
//! │                                                                         │
//! │  3. FINALIZE                                                           │
//! │     └── finalize_in() → status: Completed, payment fields set          │
//! │         (queue row inserted in the same storage transaction)           │
//! │                                                                         │
//! │  4. (LATER) REFUND                                                     │
//! │     └── set_status_in(Completed → Refunded / PartiallyRefunded)        │
//! │                                                                         │
//! │  Totals are always computed from the *current* cached product price;   │
//! │  nothing is frozen at add-to-cart time. A price refresh between scan   │
//! │  and checkout is reflected in the amount charged.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use sari_core::{CartLine, Order, Transaction, TransactionStatus};

const TRANSACTION_COLUMNS: &str = r#"
    id,
    server_id,
    status,
    date_of_transaction,
    payment_method_id,
    cash_received_cents,
    reference_number,
    total_price_cents
"#;

const ORDER_COLUMNS: &str = r#"
    id,
    transaction_id,
    product_id,
    quantity
"#;

/// Repository for transaction and order operations.
///
/// Pool-level methods serve reads; the `*_in` associated functions compose
/// inside a caller-held storage transaction so that multi-step cart
/// mutations commit or roll back as one unit.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    /// Creates a new TransactionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Returns the active transaction, if any.
    ///
    /// The open cart is a query, never an in-memory singleton; it survives
    /// process restarts. Absence is a normal `None`.
    pub async fn active(&self) -> DbResult<Option<Transaction>> {
        let sql =
            format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE status = 'active'");

        let txn = sqlx::query_as::<_, Transaction>(&sql)
            .fetch_optional(&self.pool)
            .await?;

        Ok(txn)
    }

    /// Active-transaction lookup inside a caller-held transaction.
    pub async fn active_in(conn: &mut SqliteConnection) -> DbResult<Option<Transaction>> {
        let sql =
            format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE status = 'active'");

        let txn = sqlx::query_as::<_, Transaction>(&sql)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(txn)
    }

    /// Gets a transaction by its local id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Transaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1");

        let txn = sqlx::query_as::<_, Transaction>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(txn)
    }

    /// Transaction lookup inside a caller-held transaction.
    pub async fn get_by_id_in(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Transaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1");

        let txn = sqlx::query_as::<_, Transaction>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(txn)
    }

    /// Creates a new active transaction (an empty open cart).
    ///
    /// Caller is responsible for checking that no active transaction exists
    /// first (the cart engine serializes this check-then-insert); the
    /// partial unique index on `status = 'active'` is the backstop and
    /// turns a race into a `UniqueViolation` instead of a second cart.
    pub async fn create_active_in(conn: &mut SqliteConnection) -> DbResult<Transaction> {
        let txn = Transaction {
            id: Uuid::new_v4().to_string(),
            server_id: None,
            status: TransactionStatus::Active,
            date_of_transaction: Utc::now(),
            payment_method_id: None,
            cash_received_cents: None,
            reference_number: None,
            total_price_cents: 0,
        };

        debug!(id = %txn.id, "Opening cart");

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, server_id, status, date_of_transaction,
                payment_method_id, cash_received_cents, reference_number,
                total_price_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&txn.id)
        .bind(txn.server_id)
        .bind(txn.status)
        .bind(txn.date_of_transaction)
        .bind(txn.payment_method_id)
        .bind(txn.cash_received_cents)
        .bind(&txn.reference_number)
        .bind(txn.total_price_cents)
        .execute(&mut *conn)
        .await?;

        Ok(txn)
    }

    /// Completes the active transaction, attaching payment metadata.
    ///
    /// The `status = 'active'` guard makes this safe against double
    /// finalize: the second call matches zero rows and the caller turns
    /// that into an error without having changed anything.
    ///
    /// ## Returns
    /// Number of rows updated (0 or 1).
    pub async fn finalize_in(
        conn: &mut SqliteConnection,
        id: &str,
        payment_method_id: i64,
        cash_received_cents: Option<i64>,
        reference_number: Option<&str>,
        total_price_cents: i64,
    ) -> DbResult<u64> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE transactions SET
                status = 'completed',
                date_of_transaction = ?2,
                payment_method_id = ?3,
                cash_received_cents = ?4,
                reference_number = ?5,
                total_price_cents = ?6
            WHERE id = ?1 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(payment_method_id)
        .bind(cash_received_cents)
        .bind(reference_number)
        .bind(total_price_cents)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Moves a transaction from one status to another.
    ///
    /// The `from` guard keeps refund transitions honest: a concurrent
    /// writer that already moved the row makes this match zero rows.
    ///
    /// ## Returns
    /// Number of rows updated (0 or 1).
    pub async fn set_status_in(
        conn: &mut SqliteConnection,
        id: &str,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> DbResult<u64> {
        debug!(id = %id, ?from, ?to, "Updating transaction status");

        let result =
            sqlx::query("UPDATE transactions SET status = ?3 WHERE id = ?1 AND status = ?2")
                .bind(id)
                .bind(from)
                .bind(to)
                .execute(&mut *conn)
                .await?;

        Ok(result.rows_affected())
    }

    /// Records the server-assigned id after a successful sync.
    ///
    /// Presence of `server_id` is the "already synced" marker the
    /// reconciler checks before replaying a queue item.
    pub async fn set_server_id_in(
        conn: &mut SqliteConnection,
        id: &str,
        server_id: i64,
    ) -> DbResult<()> {
        sqlx::query("UPDATE transactions SET server_id = ?2 WHERE id = ?1")
            .bind(id)
            .bind(server_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Gets all orders for a transaction, in insertion order.
    pub async fn orders(&self, transaction_id: &str) -> DbResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE transaction_id = ?1 ORDER BY rowid"
        );

        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(transaction_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(orders)
    }

    /// In-transaction variant of [`Self::orders`].
    ///
    /// Checkout uses it to snapshot the lines inside the finalize write
    /// transaction, so the queued wire payload matches exactly what was
    /// finalized.
    pub async fn orders_in(
        conn: &mut SqliteConnection,
        transaction_id: &str,
    ) -> DbResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE transaction_id = ?1 ORDER BY rowid"
        );

        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(transaction_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(orders)
    }

    /// Finds the order for a given product on a transaction, if any.
    ///
    /// At most one row exists per (transaction, product); re-adding a
    /// product goes through this lookup and bumps quantity instead.
    pub async fn find_order_in(
        conn: &mut SqliteConnection,
        transaction_id: &str,
        product_id: i64,
    ) -> DbResult<Option<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE transaction_id = ?1 AND product_id = ?2"
        );

        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(transaction_id)
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(order)
    }

    /// Inserts a new order row.
    pub async fn insert_order_in(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        debug!(
            transaction_id = %order.transaction_id,
            product_id = order.product_id,
            quantity = order.quantity,
            "Adding order"
        );

        sqlx::query(
            r#"
            INSERT INTO orders (id, transaction_id, product_id, quantity)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&order.id)
        .bind(&order.transaction_id)
        .bind(order.product_id)
        .bind(order.quantity)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Sets an order's quantity, scoped to one transaction.
    ///
    /// The transaction guard means a stale order id (or one belonging to a
    /// previous sale) matches zero rows rather than mutating a foreign cart.
    ///
    /// ## Returns
    /// Number of rows updated (0 or 1).
    pub async fn set_order_quantity_in(
        conn: &mut SqliteConnection,
        order_id: &str,
        transaction_id: &str,
        quantity: i64,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE orders SET quantity = ?3 WHERE id = ?1 AND transaction_id = ?2",
        )
        .bind(order_id)
        .bind(transaction_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes an order, scoped to one transaction.
    ///
    /// ## Returns
    /// Number of rows deleted (0 or 1). Zero is not an error at this
    /// layer; the cart engine treats remove-of-absent as a no-op.
    pub async fn delete_order_in(
        conn: &mut SqliteConnection,
        order_id: &str,
        transaction_id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM orders WHERE id = ?1 AND transaction_id = ?2")
            .bind(order_id)
            .bind(transaction_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    /// Deletes every order on a transaction (cart clear).
    pub async fn clear_orders_in(
        conn: &mut SqliteConnection,
        transaction_id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM orders WHERE transaction_id = ?1")
            .bind(transaction_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    /// Counts distinct order lines on a transaction.
    pub async fn count_orders_in(
        conn: &mut SqliteConnection,
        transaction_id: &str,
    ) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE transaction_id = ?1")
                .bind(transaction_id)
                .fetch_one(&mut *conn)
                .await?;

        Ok(count)
    }

    // =========================================================================
    // Totals and display
    // =========================================================================

    /// Computes a transaction's total in centavos from live cached prices.
    ///
    /// `SUM(quantity × current sell price)` over the join; an empty cart
    /// totals to zero via COALESCE. Nothing here reads a stored total.
    pub async fn total(&self, transaction_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(o.quantity * p.sell_price_cents), 0)
            FROM orders o
            JOIN products p ON p.id = o.product_id
            WHERE o.transaction_id = ?1
            "#,
        )
        .bind(transaction_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Live total inside a caller-held transaction.
    ///
    /// The finalizer charges this amount, computed in the same storage
    /// transaction that flips the status, never a total carried from the UI.
    pub async fn total_in(conn: &mut SqliteConnection, transaction_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(o.quantity * p.sell_price_cents), 0)
            FROM orders o
            JOIN products p ON p.id = o.product_id
            WHERE o.transaction_id = ?1
            "#,
        )
        .bind(transaction_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(total)
    }

    /// Orders joined with their products for cart display.
    pub async fn cart_lines(&self, transaction_id: &str) -> DbResult<Vec<CartLine>> {
        let lines = sqlx::query_as::<_, CartLine>(
            r#"
            SELECT
                o.id AS order_id,
                o.product_id,
                p.code,
                p.name,
                o.quantity,
                p.sell_price_cents AS unit_price_cents
            FROM orders o
            JOIN products p ON p.id = o.product_id
            WHERE o.transaction_id = ?1
            ORDER BY o.rowid
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }
}

/// Generates a new order ID.
pub fn generate_order_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::ProductRepository;
    use sari_core::Product;

    async fn seed_product(db: &Database, id: i64, code: &str, sell_price_cents: i64) {
        db.products()
            .upsert(&Product {
                id,
                code: code.to_string(),
                name: format!("Product {code}"),
                description: None,
                buy_price_cents: 0,
                sell_price_cents,
                stock: 10,
                low_stock_level: 0,
                expiration_date: None,
                category_id: None,
                cached_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    async fn open_cart(db: &Database) -> Transaction {
        let mut txn = db.begin().await.unwrap();
        let cart = TransactionRepository::create_active_in(&mut txn).await.unwrap();
        txn.commit().await.unwrap();
        cart
    }

    fn order(transaction_id: &str, product_id: i64, quantity: i64) -> Order {
        Order {
            id: generate_order_id(),
            transaction_id: transaction_id.to_string(),
            product_id,
            quantity,
        }
    }

    #[tokio::test]
    async fn create_active_then_query_it_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.transactions().active().await.unwrap().is_none());

        let cart = open_cart(&db).await;

        let found = db.transactions().active().await.unwrap().unwrap();
        assert_eq!(found.id, cart.id);
        assert_eq!(found.status, TransactionStatus::Active);
        assert!(found.server_id.is_none());
    }

    #[tokio::test]
    async fn second_active_transaction_violates_unique_index() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        open_cart(&db).await;

        let mut txn = db.begin().await.unwrap();
        let err = TransactionRepository::create_active_in(&mut txn)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn duplicate_product_order_violates_unique_index() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, 1, "LM-PC-001", 1500).await;
        let cart = open_cart(&db).await;

        let mut txn = db.begin().await.unwrap();
        TransactionRepository::insert_order_in(&mut txn, &order(&cart.id, 1, 1))
            .await
            .unwrap();
        let err = TransactionRepository::insert_order_in(&mut txn, &order(&cart.id, 1, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn order_updates_are_scoped_to_their_transaction() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, 1, "C2-SOLO", 2000).await;
        let cart = open_cart(&db).await;

        let line = order(&cart.id, 1, 1);
        let mut txn = db.begin().await.unwrap();
        TransactionRepository::insert_order_in(&mut txn, &line).await.unwrap();

        // Wrong transaction id: matches nothing, mutates nothing.
        let hit =
            TransactionRepository::set_order_quantity_in(&mut txn, &line.id, "other-cart", 5)
                .await
                .unwrap();
        assert_eq!(hit, 0);

        let hit = TransactionRepository::set_order_quantity_in(&mut txn, &line.id, &cart.id, 5)
            .await
            .unwrap();
        assert_eq!(hit, 1);

        let hit = TransactionRepository::delete_order_in(&mut txn, &line.id, &cart.id)
            .await
            .unwrap();
        assert_eq!(hit, 1);

        // Deleting again is a zero-row no-op.
        let hit = TransactionRepository::delete_order_in(&mut txn, &line.id, &cart.id)
            .await
            .unwrap();
        assert_eq!(hit, 0);
    }

    #[tokio::test]
    async fn total_reads_current_cached_prices() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, 1, "KOPIKO-78", 2500).await;
        let cart = open_cart(&db).await;

        let mut txn = db.begin().await.unwrap();
        TransactionRepository::insert_order_in(&mut txn, &order(&cart.id, 1, 2))
            .await
            .unwrap();
        txn.commit().await.unwrap();

        assert_eq!(db.transactions().total(&cart.id).await.unwrap(), 5000);

        // Price refresh between scan and checkout shows up in the total.
        seed_product(&db, 1, "KOPIKO-78", 3000).await;
        assert_eq!(db.transactions().total(&cart.id).await.unwrap(), 6000);
    }

    #[tokio::test]
    async fn empty_cart_totals_zero() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cart = open_cart(&db).await;

        assert_eq!(db.transactions().total(&cart.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn finalize_only_touches_the_active_row() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, 1, "ROYAL-8OZ", 2000).await;
        let cart = open_cart(&db).await;

        let mut txn = db.begin().await.unwrap();
        TransactionRepository::insert_order_in(&mut txn, &order(&cart.id, 1, 1))
            .await
            .unwrap();
        let hit = TransactionRepository::finalize_in(&mut txn, &cart.id, 1, Some(2000), None, 2000)
            .await
            .unwrap();
        assert_eq!(hit, 1);
        txn.commit().await.unwrap();

        let done = db.transactions().get_by_id(&cart.id).await.unwrap().unwrap();
        assert_eq!(done.status, TransactionStatus::Completed);
        assert_eq!(done.total_price_cents, 2000);
        assert_eq!(done.cash_received_cents, Some(2000));

        // Double finalize matches zero rows.
        let mut txn = db.begin().await.unwrap();
        let hit = TransactionRepository::finalize_in(&mut txn, &cart.id, 1, Some(2000), None, 2000)
            .await
            .unwrap();
        assert_eq!(hit, 0);
    }

    #[tokio::test]
    async fn status_transitions_are_guarded_by_from_state() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cart = open_cart(&db).await;

        let mut txn = db.begin().await.unwrap();
        TransactionRepository::finalize_in(&mut txn, &cart.id, 1, Some(0), None, 0)
            .await
            .unwrap();

        let hit = TransactionRepository::set_status_in(
            &mut txn,
            &cart.id,
            TransactionStatus::Completed,
            TransactionStatus::Refunded,
        )
        .await
        .unwrap();
        assert_eq!(hit, 1);

        // Already refunded: the Completed guard no longer matches.
        let hit = TransactionRepository::set_status_in(
            &mut txn,
            &cart.id,
            TransactionStatus::Completed,
            TransactionStatus::Refunded,
        )
        .await
        .unwrap();
        assert_eq!(hit, 0);
    }

    #[tokio::test]
    async fn cart_lines_join_products_in_insertion_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, 1, "PIATTOS", 3500).await;
        seed_product(&db, 2, "NOVA", 3000).await;
        let cart = open_cart(&db).await;

        let mut txn = db.begin().await.unwrap();
        TransactionRepository::insert_order_in(&mut txn, &order(&cart.id, 2, 1))
            .await
            .unwrap();
        TransactionRepository::insert_order_in(&mut txn, &order(&cart.id, 1, 3))
            .await
            .unwrap();
        txn.commit().await.unwrap();

        let lines = db.transactions().cart_lines(&cart.id).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].code, "NOVA");
        assert_eq!(lines[1].code, "PIATTOS");
        assert_eq!(lines[1].line_total(), sari_core::Money::from_cents(10_500));
    }

    #[tokio::test]
    async fn server_id_is_recorded_once_synced() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cart = open_cart(&db).await;

        let mut txn = db.begin().await.unwrap();
        TransactionRepository::set_server_id_in(&mut txn, &cart.id, 99).await.unwrap();
        txn.commit().await.unwrap();

        let found = db.transactions().get_by_id(&cart.id).await.unwrap().unwrap();
        assert_eq!(found.server_id, Some(99));
        assert!(found.is_synced());
    }
}
