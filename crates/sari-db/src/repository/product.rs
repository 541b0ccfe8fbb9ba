//! # Product Repository
//!
//! Local store operations for the cached product catalog.
//!
//! ## Cache Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Product Rows Are a Cache                             │
//! │                                                                         │
//! │  Server (authoritative)                Device (this table)             │
//! │  ─────────────────────                 ───────────────────             │
//! │  owns ids, prices, stock    ──sync──►  upsert(), server values win     │
//! │                                                                         │
//! │  • get_by_code() resolves a barcode scan to a product                  │
//! │  • stock here is advisory: add-to-cart checks it softly, the server   │
//! │    enforces it for real when the sale syncs                            │
//! │  • rows are never deleted: completed orders may reference products    │
//! │    the server has since retired                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use sari_core::Product;

const PRODUCT_COLUMNS: &str = r#"
    id,
    code,
    name,
    description,
    buy_price_cents,
    sell_price_cents,
    stock,
    low_stock_level,
    expiration_date,
    category_id,
    cached_at
"#;

/// Repository for product cache operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// // Resolve a scanned barcode
/// let product = repo.get_by_code("LM-PC-001").await?;
///
/// // Catalog for the product picker
/// let all = repo.list(500).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its server-assigned id.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Gets a product by its scannable code.
    ///
    /// This is the barcode-scan path: the cart engine resolves the scanned
    /// code against the cache before touching the cart.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE code = ?1");

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Code lookup inside a caller-held transaction.
    ///
    /// Used by the cart engine so the product it resolves is the product
    /// the rest of the mutation sees.
    pub async fn get_by_code_in(
        conn: &mut SqliteConnection,
        code: &str,
    ) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE code = ?1");

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(code)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(product)
    }

    /// Lists cached products ordered by name.
    ///
    /// The product picker filters this list client-side; a sari-sari
    /// catalog is small enough that no search index is needed.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name LIMIT ?1");

        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Inserts or replaces a cached product row.
    ///
    /// Server values win on conflict: price and stock are authoritative
    /// upstream, the device only mirrors them. Rows are never deleted here.
    pub async fn upsert(&self, product: &Product) -> DbResult<()> {
        debug!(id = product.id, code = %product.code, "Upserting cached product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, code, name, description,
                buy_price_cents, sell_price_cents,
                stock, low_stock_level, expiration_date, category_id, cached_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                code = excluded.code,
                name = excluded.name,
                description = excluded.description,
                buy_price_cents = excluded.buy_price_cents,
                sell_price_cents = excluded.sell_price_cents,
                stock = excluded.stock,
                low_stock_level = excluded.low_stock_level,
                expiration_date = excluded.expiration_date,
                category_id = excluded.category_id,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(product.id)
        .bind(&product.code)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.buy_price_cents)
        .bind(product.sell_price_cents)
        .bind(product.stock)
        .bind(product.low_stock_level)
        .bind(product.expiration_date)
        .bind(product.category_id)
        .bind(product.cached_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Adjusts cached stock by a delta, inside a caller-held transaction.
    ///
    /// ## Delta, Not Absolute
    /// `stock = stock + delta` keeps concurrent adjustments commutative;
    /// an absolute write would silently drop one of two racing updates.
    pub async fn adjust_stock_in(
        conn: &mut SqliteConnection,
        id: i64,
        delta: i64,
    ) -> DbResult<()> {
        debug!(id = id, delta = delta, "Adjusting cached stock");

        let result = sqlx::query("UPDATE products SET stock = stock + ?2 WHERE id = ?1")
            .bind(id)
            .bind(delta)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id.to_string()));
        }

        Ok(())
    }

    /// Counts cached products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;

    fn sample(id: i64, code: &str, sell_price_cents: i64) -> Product {
        Product {
            id,
            code: code.to_string(),
            name: format!("Product {code}"),
            description: None,
            buy_price_cents: sell_price_cents * 7 / 10,
            sell_price_cents,
            stock: 10,
            low_stock_level: 3,
            expiration_date: None,
            category_id: None,
            cached_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_then_get_by_code() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.upsert(&sample(1, "LM-PC-001", 1500)).await.unwrap();

        let found = repo.get_by_code("LM-PC-001").await.unwrap().unwrap();
        assert_eq!(found.id, 1);
        assert_eq!(found.sell_price_cents, 1500);

        assert!(repo.get_by_code("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_overwrites_price_and_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.upsert(&sample(7, "C2-SOLO", 2000)).await.unwrap();

        let mut refreshed = sample(7, "C2-SOLO", 2500);
        refreshed.stock = 42;
        repo.upsert(&refreshed).await.unwrap();

        let found = repo.get_by_id(7).await.unwrap().unwrap();
        assert_eq!(found.sell_price_cents, 2500);
        assert_eq!(found.stock, 42);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_code_is_a_unique_violation() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.upsert(&sample(1, "SAME-CODE", 1000)).await.unwrap();
        let err = repo.upsert(&sample(2, "SAME-CODE", 1000)).await.unwrap_err();

        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn adjust_stock_applies_delta() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.upsert(&sample(3, "SKY-FLK", 900)).await.unwrap();

        let mut txn = db.begin().await.unwrap();
        ProductRepository::adjust_stock_in(&mut txn, 3, -4).await.unwrap();
        txn.commit().await.unwrap();

        let found = repo.get_by_id(3).await.unwrap().unwrap();
        assert_eq!(found.stock, 6);
    }

    #[tokio::test]
    async fn list_orders_by_name() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let mut b = sample(1, "B", 100);
        b.name = "Boy Bawang".to_string();
        let mut a = sample(2, "A", 100);
        a.name = "Argentina Corned Beef".to_string();

        repo.upsert(&b).await.unwrap();
        repo.upsert(&a).await.unwrap();

        let listed = repo.list(10).await.unwrap();
        assert_eq!(listed[0].name, "Argentina Corned Beef");
        assert_eq!(listed[1].name, "Boy Bawang");
    }
}
