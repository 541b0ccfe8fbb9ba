//! # Payment Method Repository
//!
//! Local store operations for the payment method reference table.
//!
//! Rows are server-born and cached locally (migration `002` seeds the four
//! defaults so a fresh offline install can still check out). The
//! `requires_reference` flag is device policy: server refreshes update names
//! but never overwrite it.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use sari_core::PaymentMethod;

/// Repository for payment method operations.
#[derive(Debug, Clone)]
pub struct PaymentMethodRepository {
    pool: SqlitePool,
}

impl PaymentMethodRepository {
    /// Creates a new PaymentMethodRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentMethodRepository { pool }
    }

    /// Lists all payment methods.
    pub async fn list(&self) -> DbResult<Vec<PaymentMethod>> {
        let methods = sqlx::query_as::<_, PaymentMethod>(
            "SELECT id, name, requires_reference FROM payment_methods ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(methods)
    }

    /// Gets a payment method by id.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<PaymentMethod>> {
        let method = sqlx::query_as::<_, PaymentMethod>(
            "SELECT id, name, requires_reference FROM payment_methods WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(method)
    }

    /// Payment method lookup inside a caller-held transaction.
    ///
    /// The finalizer resolves the method in the same storage transaction
    /// that completes the sale.
    pub async fn get_by_id_in(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> DbResult<Option<PaymentMethod>> {
        let method = sqlx::query_as::<_, PaymentMethod>(
            "SELECT id, name, requires_reference FROM payment_methods WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(method)
    }

    /// Inserts or renames a payment method from a server refresh.
    ///
    /// On conflict only `name` is taken from the server; the local
    /// `requires_reference` policy survives. Unknown methods arrive with the
    /// flag off until the store owner configures them.
    pub async fn upsert(&self, id: i64, name: &str) -> DbResult<()> {
        debug!(id = id, name = %name, "Upserting payment method");

        sqlx::query(
            r#"
            INSERT INTO payment_methods (id, name, requires_reference)
            VALUES (?1, ?2, 0)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(id)
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes a payment method from the local cache.
    ///
    /// Called only after the server confirmed the deletion.
    ///
    /// ## Returns
    /// Number of rows deleted (0 or 1).
    pub async fn delete(&self, id: i64) -> DbResult<u64> {
        debug!(id = id, "Deleting payment method");

        let result = sqlx::query("DELETE FROM payment_methods WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
