use std::{str::FromStr, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Sqlite, SqlitePool, Transaction,
};
use thiserror::Error;

mod inventory;
mod movements;

pub use inventory::{InventoryError, InventoryRepository, NewInventoryItem};
pub use movements::{MovementError, MovementRepository, NewStockMovement};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    ///
    /// Every pooled connection runs with foreign keys enforced, WAL journaling
    /// and a busy timeout so concurrent writers queue instead of failing.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Begins a SQLite transaction shared by several repository calls.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StorageError> {
        self.pool.begin().await.map_err(StorageError::Database)
    }

    /// Returns a handle for inventory item rows.
    pub fn inventory(&self) -> InventoryRepository {
        InventoryRepository::new(self.pool.clone())
    }

    /// Returns a handle for the stock movement ledger.
    pub fn movements(&self) -> MovementRepository {
        MovementRepository::new(self.pool.clone())
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A stored value could not be decoded into its domain type.
#[derive(Debug, Error)]
#[error("invalid {column} value in database: {value}")]
pub struct CorruptValue {
    pub column: &'static str,
    pub value: String,
}

pub(crate) fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn decimal_to_db(value: Decimal) -> String {
    value.normalize().to_string()
}

pub(crate) fn decimal_from_db(column: &'static str, value: &str) -> Result<Decimal, CorruptValue> {
    Decimal::from_str(value).map_err(|_| CorruptValue {
        column,
        value: value.to_string(),
    })
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("2067"),
        _ => false,
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::setup_db;
    use super::*;

    #[tokio::test]
    async fn migrations_apply() {
        let db = setup_db().await;

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('inventory_items', 'stock_movements') ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .expect("fetch tables");
        let names: Vec<&str> = tables.iter().map(|row| row.0.as_str()).collect();
        assert_eq!(names, ["inventory_items", "stock_movements"]);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let db = setup_db().await;
        let enabled: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .expect("pragma");
        assert_eq!(enabled.0, 1);
    }

    #[test]
    fn decimals_are_stored_normalized() {
        assert_eq!(decimal_to_db(Decimal::new(1500, 2)), "15");
        assert_eq!(decimal_to_db(Decimal::new(125, 1)), "12.5");
        assert!(decimal_from_db("stock", "not-a-number").is_err());
    }
}
