//! # Database Connection Pool
//!
//! Connection pool creation and configuration for the local store.
//!
//! ## Connection Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    SQLite Connection Pool                               │
//! │                                                                         │
//! │  One database file per device. WAL mode allows concurrent readers      │
//! │  (cart display, sync badge) while a single writer mutates the cart.    │
//! │                                                                         │
//! │  ┌──────────────┐                                                      │
//! │  │ cart engine  │──┐                                                   │
//! │  └──────────────┘  │    ┌──────────────┐      ┌──────────────────┐    │
//! │  ┌──────────────┐  ├───►│  SqlitePool  │─────►│  sari.db (WAL)   │    │
//! │  │ reconciler   │──┤    │  (max 5)     │      └──────────────────┘    │
//! │  └──────────────┘  │    └──────────────┘                              │
//! │  ┌──────────────┐  │                                                   │
//! │  │ UI reads     │──┘                                                   │
//! │  └──────────────┘                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::payment_method::PaymentMethodRepository;
use crate::repository::product::ProductRepository;
use crate::repository::queue::SyncQueueRepository;
use crate::repository::transaction::TransactionRepository;

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("./sari.db")
///     .max_connections(10)
///     .run_migrations(true);
/// let db = Database::new(config).await?;
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    pub max_connections: u32,

    /// Minimum number of idle connections to keep.
    pub min_connections: u32,

    /// Timeout for acquiring a connection from the pool.
    pub connect_timeout: Duration,

    /// How long a connection may sit idle before being closed.
    pub idle_timeout: Duration,

    /// Whether to run pending migrations on startup.
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a config for the given database file path.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: database_path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// Creates a config for an in-memory database (tests).
    ///
    /// ## Why max_connections = 1
    /// Each SQLite in-memory connection gets its *own* private database.
    /// A pool of one connection is the only way the whole test sees the
    /// same data.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }

    /// Sets the maximum connection count.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Sets the minimum idle connection count.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Sets whether migrations run on startup.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }
}

/// Handle to the local store.
///
/// Cheap to clone (wraps an `Arc`-backed pool); every component of the
/// client shares one `Database`.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if missing) the database and runs migrations.
    ///
    /// ## Pragmas
    /// - `journal_mode = WAL`: readers never block the writer
    /// - `synchronous = NORMAL`: safe with WAL, much faster than FULL
    /// - `foreign_keys = ON`: orders/queue rows cannot dangle
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        info!(path = %config.database_path.display(), "Opening local store");

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        let db = Database { pool };

        if config.run_migrations {
            migrations::run_migrations(&db.pool).await?;
        }

        Ok(db)
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begins a storage transaction.
    ///
    /// Mutations that must be atomic (find-or-create cart, finalize +
    /// enqueue) compose repository `*_in` helpers inside one transaction.
    /// Dropping the returned transaction without `commit` rolls back.
    pub async fn begin(&self) -> DbResult<sqlx::Transaction<'static, sqlx::Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }

    /// Product cache repository.
    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    /// Transaction/order repository.
    pub fn transactions(&self) -> TransactionRepository {
        TransactionRepository::new(self.pool.clone())
    }

    /// Payment method repository.
    pub fn payment_methods(&self) -> PaymentMethodRepository {
        PaymentMethodRepository::new(self.pool.clone())
    }

    /// Sync queue repository.
    pub fn sync_queue(&self) -> SyncQueueRepository {
        SyncQueueRepository::new(self.pool.clone())
    }

    /// Closes all pool connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Verifies the database is reachable.
    pub async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_database_is_healthy() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn migrations_apply_and_seed_payment_methods() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);

        let methods = db.payment_methods().list().await.unwrap();
        assert_eq!(methods.len(), 4);
        let mobile = methods.iter().find(|m| m.name == "Mobile Payment").unwrap();
        assert!(mobile.requires_reference);
        let cash = methods.iter().find(|m| m.name == "Cash").unwrap();
        assert!(!cash.requires_reference);
    }

    #[tokio::test]
    async fn config_builder_overrides_defaults() {
        let config = DbConfig::new("./test.db")
            .max_connections(10)
            .min_connections(2)
            .run_migrations(false);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert!(!config.run_migrations);
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sari.db");

        {
            let db = Database::new(DbConfig::new(&path)).await.unwrap();
            let mut txn = db.begin().await.unwrap();
            TransactionRepository::create_active_in(&mut txn).await.unwrap();
            txn.commit().await.unwrap();
            db.close().await;
        }

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let active = db.transactions().active().await.unwrap();
        assert!(active.is_some(), "open cart must survive a restart");
    }
}
