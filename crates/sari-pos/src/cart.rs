//! # Cart Engine
//!
//! Maintains the single active transaction and its line items.
//!
//! ## Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Cart Engine                                      │
//! │                                                                         │
//! │  scan / search ──► add_item(code, qty)                                  │
//! │                        │                                                │
//! │                        ▼                                                │
//! │             ┌─ no active transaction? create one                        │
//! │             ├─ product already on the cart? bump quantity               │
//! │             └─ otherwise insert a new line                              │
//! │                                                                         │
//! │  One active transaction per device. One line per product.               │
//! │  Totals always read the *current* cached price.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//! Mutations take a shared write lock and run as one SQLite transaction, so
//! check-then-act sequences (find-or-create transaction, find-or-increment
//! line) never interleave under overlapping scans or double-taps. Reads
//! (`active_transaction`, `total`, `items`) take no lock.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use sari_core::validation::{validate_product_code, validate_quantity};
use sari_core::{CartLine, CoreError, Money, Order, Transaction, MAX_CART_ITEMS, MAX_ITEM_QUANTITY};
use sari_db::repository::transaction::generate_order_id;
use sari_db::{Database, ProductRepository, TransactionRepository};

use crate::error::PosResult;

/// Cart operations over the single active transaction.
///
/// Cheap to clone; clones share the database handle and the write lock.
#[derive(Debug, Clone)]
pub struct CartEngine {
    db: Database,
    write_lock: Arc<Mutex<()>>,
}

impl CartEngine {
    pub(crate) fn new(db: Database, write_lock: Arc<Mutex<()>>) -> Self {
        Self { db, write_lock }
    }

    /// Returns the active transaction, if the device has one.
    pub async fn active_transaction(&self) -> PosResult<Option<Transaction>> {
        Ok(self.db.transactions().active().await?)
    }

    /// Returns the active transaction, creating it first when absent.
    pub async fn ensure_active_transaction(&self) -> PosResult<Transaction> {
        let _guard = self.write_lock.lock().await;
        let mut db_txn = self.db.begin().await?;

        let transaction = match TransactionRepository::active_in(&mut db_txn).await? {
            Some(t) => t,
            None => TransactionRepository::create_active_in(&mut db_txn).await?,
        };

        db_txn.commit().await?;
        Ok(transaction)
    }

    /// Adds a product to the cart by its scannable code.
    ///
    /// Re-adding a product already on the cart increments its line instead
    /// of creating a second one, so a scanner firing twice sells two units,
    /// not two lines. Creates the active transaction on demand.
    ///
    /// The code is trimmed and format-checked before the lookup; the
    /// quantity must fall in `1..=MAX_ITEM_QUANTITY`.
    ///
    /// The stock check is soft: only a cached stock of zero rejects the add.
    /// The server enforces stock authoritatively when the sale syncs.
    pub async fn add_item(&self, product_code: &str, quantity: i64) -> PosResult<Order> {
        let product_code = validate_product_code(product_code).map_err(CoreError::Validation)?;
        validate_quantity(quantity).map_err(CoreError::Validation)?;

        let _guard = self.write_lock.lock().await;
        let mut db_txn = self.db.begin().await?;

        let product = ProductRepository::get_by_code_in(&mut db_txn, product_code)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_code.to_string()))?;
        if !product.in_stock() {
            return Err(CoreError::OutOfStock { code: product.code }.into());
        }

        let transaction = match TransactionRepository::active_in(&mut db_txn).await? {
            Some(t) => t,
            None => TransactionRepository::create_active_in(&mut db_txn).await?,
        };

        let order = match TransactionRepository::find_order_in(
            &mut db_txn,
            &transaction.id,
            product.id,
        )
        .await?
        {
            Some(mut existing) => {
                let new_quantity = existing.quantity + quantity;
                if new_quantity > MAX_ITEM_QUANTITY {
                    return Err(CoreError::QuantityTooLarge {
                        requested: new_quantity,
                        max: MAX_ITEM_QUANTITY,
                    }
                    .into());
                }
                TransactionRepository::set_order_quantity_in(
                    &mut db_txn,
                    &existing.id,
                    &transaction.id,
                    new_quantity,
                )
                .await?;
                existing.quantity = new_quantity;
                existing
            }
            None => {
                let lines = TransactionRepository::count_orders_in(&mut db_txn, &transaction.id)
                    .await?;
                if lines >= MAX_CART_ITEMS as i64 {
                    return Err(CoreError::CartTooLarge {
                        max: MAX_CART_ITEMS,
                    }
                    .into());
                }
                let order = Order {
                    id: generate_order_id(),
                    transaction_id: transaction.id.clone(),
                    product_id: product.id,
                    quantity,
                };
                TransactionRepository::insert_order_in(&mut db_txn, &order).await?;
                order
            }
        };

        db_txn.commit().await?;
        debug!(
            product_id = order.product_id,
            quantity = order.quantity,
            "Cart line updated"
        );
        Ok(order)
    }

    /// Sets a line's quantity; zero or less removes the line.
    ///
    /// Fails with `OrderNotFound` when the id is not on the active
    /// transaction.
    pub async fn update_item_quantity(&self, order_id: &str, new_quantity: i64) -> PosResult<()> {
        if new_quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: new_quantity,
                max: MAX_ITEM_QUANTITY,
            }
            .into());
        }

        let _guard = self.write_lock.lock().await;
        let mut db_txn = self.db.begin().await?;

        let transaction = TransactionRepository::active_in(&mut db_txn)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;

        let hit = if new_quantity <= 0 {
            TransactionRepository::delete_order_in(&mut db_txn, order_id, &transaction.id).await?
        } else {
            TransactionRepository::set_order_quantity_in(
                &mut db_txn,
                order_id,
                &transaction.id,
                new_quantity,
            )
            .await?
        };
        if hit == 0 {
            return Err(CoreError::OrderNotFound(order_id.to_string()).into());
        }

        db_txn.commit().await?;
        Ok(())
    }

    /// Removes a line from the cart.
    ///
    /// Idempotent: an id that is already gone (or never was on the active
    /// transaction) is a no-op, tolerating UI double-taps.
    pub async fn remove_item(&self, order_id: &str) -> PosResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut db_txn = self.db.begin().await?;

        let transaction = match TransactionRepository::active_in(&mut db_txn).await? {
            Some(t) => t,
            None => return Ok(()),
        };

        let hit =
            TransactionRepository::delete_order_in(&mut db_txn, order_id, &transaction.id).await?;
        if hit == 0 {
            debug!(order_id = %order_id, "remove_item found nothing to remove");
        }

        db_txn.commit().await?;
        Ok(())
    }

    /// Live cart total at current cached prices. Zero when the cart is
    /// empty or absent.
    pub async fn total(&self) -> PosResult<Money> {
        let repo = self.db.transactions();
        match repo.active().await? {
            Some(transaction) => Ok(Money::from_cents(repo.total(&transaction.id).await?)),
            None => Ok(Money::zero()),
        }
    }

    /// The cart's lines joined with their products, in insertion order.
    pub async fn items(&self) -> PosResult<Vec<CartLine>> {
        let repo = self.db.transactions();
        match repo.active().await? {
            Some(transaction) => Ok(repo.cart_lines(&transaction.id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Empties the cart but keeps the active transaction row.
    pub async fn clear(&self) -> PosResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut db_txn = self.db.begin().await?;

        let transaction = match TransactionRepository::active_in(&mut db_txn).await? {
            Some(t) => t,
            None => return Ok(()),
        };

        let removed = TransactionRepository::clear_orders_in(&mut db_txn, &transaction.id).await?;
        db_txn.commit().await?;
        debug!(removed, "Cleared cart");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PosError;
    use chrono::Utc;
    use sari_core::{Product, ValidationError};
    use sari_db::DbConfig;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn engine(db: &Database) -> CartEngine {
        CartEngine::new(db.clone(), Arc::new(Mutex::new(())))
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
    async fn add_item_creates_the_active_transaction_on_demand() {
        let db = test_db().await;
        seed_product(&db, 7, "COKE-330", 2500, 24).await;
        let cart = engine(&db);

        assert!(cart.active_transaction().await.unwrap().is_none());

        let order = cart.add_item("COKE-330", 1).await.unwrap();
        assert_eq!(order.quantity, 1);
        assert_eq!(order.product_id, 7);

        let active = cart.active_transaction().await.unwrap().unwrap();
        assert_eq!(active.id, order.transaction_id);
    }

    #[tokio::test]
    async fn ensure_active_transaction_reuses_the_existing_one() {
        let db = test_db().await;
        let cart = engine(&db);

        let first = cart.ensure_active_transaction().await.unwrap();
        let second = cart.ensure_active_transaction().await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn re_adding_a_product_increments_its_line() {
        let db = test_db().await;
        seed_product(&db, 7, "COKE-330", 2500, 24).await;
        let cart = engine(&db);

        let first = cart.add_item("COKE-330", 1).await.unwrap();
        let second = cart.add_item("COKE-330", 2).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, 3);

        let items = cart.items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3);
    }

    #[tokio::test]
    async fn unknown_code_is_rejected() {
        let db = test_db().await;
        let cart = engine(&db);

        let err = cart.add_item("NOPE-000", 1).await.unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::ProductNotFound(_))
        ));
        assert!(err.is_validation());
        assert!(cart.active_transaction().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scanned_codes_are_trimmed_and_format_checked() {
        let db = test_db().await;
        seed_product(&db, 7, "COKE-330", 2500, 24).await;
        let cart = engine(&db);

        // A scanner that pads the code still hits the product.
        let order = cart.add_item("  COKE-330  ", 1).await.unwrap();
        assert_eq!(order.product_id, 7);

        let err = cart.add_item("bad code!", 1).await.unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::Validation(ValidationError::InvalidFormat { .. }))
        ));

        let err = cart.add_item("   ", 1).await.unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::Validation(ValidationError::Required { .. }))
        ));
    }

    #[tokio::test]
    async fn zero_stock_is_rejected_but_low_stock_is_not() {
        let db = test_db().await;
        seed_product(&db, 7, "GONE-1", 1000, 0).await;
        seed_product(&db, 8, "LAST-1", 1000, 1).await;
        let cart = engine(&db);

        let err = cart.add_item("GONE-1", 1).await.unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::OutOfStock { .. })));

        // Soft check: quantity may exceed the cached stock as long as the
        // cache says any stock remains.
        let order = cart.add_item("LAST-1", 3).await.unwrap();
        assert_eq!(order.quantity, 3);
    }

    #[tokio::test]
    async fn quantity_bounds_are_enforced() {
        let db = test_db().await;
        seed_product(&db, 7, "COKE-330", 2500, 24).await;
        let cart = engine(&db);

        let err = cart.add_item("COKE-330", 0).await.unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));

        let err = cart.add_item("COKE-330", MAX_ITEM_QUANTITY + 1).await.unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));

        // Increments may not cross the cap either.
        cart.add_item("COKE-330", MAX_ITEM_QUANTITY - 1).await.unwrap();
        let err = cart.add_item("COKE-330", 2).await.unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::QuantityTooLarge { .. })
        ));

        let items = cart.items().await.unwrap();
        assert_eq!(items[0].quantity, MAX_ITEM_QUANTITY - 1);
    }

    #[tokio::test]
    async fn distinct_line_cap_is_enforced() {
        let db = test_db().await;
        let cart = engine(&db);

        for i in 1..=(MAX_CART_ITEMS as i64) {
            seed_product(&db, i, &format!("P-{i}"), 100, 10).await;
            cart.add_item(&format!("P-{i}"), 1).await.unwrap();
        }

        seed_product(&db, 999, "P-999", 100, 10).await;
        let err = cart.add_item("P-999", 1).await.unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::CartTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn update_item_quantity_sets_and_removes() {
        let db = test_db().await;
        seed_product(&db, 7, "COKE-330", 2500, 24).await;
        let cart = engine(&db);

        let order = cart.add_item("COKE-330", 1).await.unwrap();
        cart.update_item_quantity(&order.id, 5).await.unwrap();
        assert_eq!(cart.items().await.unwrap()[0].quantity, 5);

        cart.update_item_quantity(&order.id, 0).await.unwrap();
        assert!(cart.items().await.unwrap().is_empty());

        let err = cart.update_item_quantity(&order.id, 2).await.unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn remove_item_tolerates_double_taps() {
        let db = test_db().await;
        seed_product(&db, 7, "COKE-330", 2500, 24).await;
        let cart = engine(&db);

        let order = cart.add_item("COKE-330", 1).await.unwrap();
        cart.remove_item(&order.id).await.unwrap();
        cart.remove_item(&order.id).await.unwrap();
        assert!(cart.items().await.unwrap().is_empty());

        // No cart at all is also a no-op.
        cart.clear().await.unwrap();
        let fresh = engine(&db);
        fresh.remove_item("not-an-order").await.unwrap();
    }

    #[tokio::test]
    async fn totals_track_the_current_cached_price() {
        let db = test_db().await;
        seed_product(&db, 7, "COKE-330", 1000, 24).await;
        let cart = engine(&db);

        assert_eq!(cart.total().await.unwrap(), Money::zero());

        cart.add_item("COKE-330", 2).await.unwrap();
        assert_eq!(cart.total().await.unwrap(), Money::from_cents(2000));

        // Price refresh before checkout: the cart follows the new price.
        seed_product(&db, 7, "COKE-330", 1200, 24).await;
        assert_eq!(cart.total().await.unwrap(), Money::from_cents(2400));
        assert_eq!(
            cart.items().await.unwrap()[0].line_total(),
            Money::from_cents(2400)
        );
    }

    #[tokio::test]
    async fn clear_keeps_the_active_transaction() {
        let db = test_db().await;
        seed_product(&db, 7, "COKE-330", 2500, 24).await;
        let cart = engine(&db);

        cart.add_item("COKE-330", 2).await.unwrap();
        let active = cart.active_transaction().await.unwrap().unwrap();

        cart.clear().await.unwrap();
        assert!(cart.items().await.unwrap().is_empty());
        assert_eq!(cart.total().await.unwrap(), Money::zero());

        let still_active = cart.active_transaction().await.unwrap().unwrap();
        assert_eq!(still_active.id, active.id);
    }

    #[tokio::test]
    async fn concurrent_adds_merge_into_one_line() {
        let db = test_db().await;
        seed_product(&db, 7, "COKE-330", 2500, 24).await;

        let lock = Arc::new(Mutex::new(()));
        let a = CartEngine::new(db.clone(), Arc::clone(&lock));
        let b = CartEngine::new(db.clone(), lock);

        let (first, second) = tokio::join!(a.add_item("COKE-330", 1), b.add_item("COKE-330", 1));
        first.unwrap();
        second.unwrap();

        let items = a.items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
        assert!(a.active_transaction().await.unwrap().is_some());
    }
}
