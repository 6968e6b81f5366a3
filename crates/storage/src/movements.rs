use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use laundry_core::types::{Direction, StockMovement};

use crate::{decimal_from_db, decimal_to_db, to_rfc3339, CorruptValue};

const MOVEMENT_COLUMNS: &str =
    "id, item_id, direction, quantity, stock_after, note, created_at";

/// Repository for the append-only `stock_movements` ledger.
///
/// Rows are never updated or deleted here; they only disappear through the
/// cascade when their item is deleted.
#[derive(Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
pub enum MovementError {
    #[error(transparent)]
    Corrupt(#[from] CorruptValue),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Movement appended by the stock ledger or by item registration.
pub struct NewStockMovement<'a> {
    pub id: &'a str,
    pub item_id: &'a str,
    pub direction: Direction,
    pub quantity: Decimal,
    pub stock_after: Decimal,
    pub note: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct StockMovementRow {
    id: String,
    item_id: String,
    direction: String,
    quantity: String,
    stock_after: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl StockMovementRow {
    fn into_domain(self) -> Result<StockMovement, CorruptValue> {
        let direction = self
            .direction
            .parse::<Direction>()
            .map_err(|err| CorruptValue {
                column: "direction",
                value: err.0,
            })?;
        Ok(StockMovement {
            direction,
            quantity: decimal_from_db("quantity", &self.quantity)?,
            stock_after: decimal_from_db("stock_after", &self.stock_after)?,
            id: self.id,
            item_id: self.item_id,
            note: self.note,
            created_at: self.created_at,
        })
    }
}

fn collect_rows(rows: Vec<StockMovementRow>) -> Result<Vec<StockMovement>, MovementError> {
    rows.into_iter()
        .map(|row| row.into_domain().map_err(MovementError::from))
        .collect()
}

impl MovementRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Appends a movement inside the caller's transaction.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        movement: &NewStockMovement<'_>,
    ) -> Result<StockMovement, MovementError> {
        let row = sqlx::query_as::<_, StockMovementRow>(&format!(
            "INSERT INTO stock_movements \
             (id, item_id, direction, quantity, stock_after, note, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING {MOVEMENT_COLUMNS}"
        ))
        .bind(movement.id)
        .bind(movement.item_id)
        .bind(movement.direction.as_str())
        .bind(decimal_to_db(movement.quantity))
        .bind(decimal_to_db(movement.stock_after))
        .bind(movement.note)
        .bind(to_rfc3339(movement.created_at))
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.into_domain()?)
    }

    /// Lists an item's movements newest first, optionally bounded to `[start, end)`.
    pub async fn list_for_item(
        &self,
        item_id: &str,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<StockMovement>, MovementError> {
        let rows = match window {
            Some((start, end)) => {
                sqlx::query_as::<_, StockMovementRow>(&format!(
                    "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
                     WHERE item_id = ? AND created_at >= ? AND created_at < ? \
                     ORDER BY seq DESC"
                ))
                .bind(item_id)
                .bind(to_rfc3339(start))
                .bind(to_rfc3339(end))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, StockMovementRow>(&format!(
                    "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
                     WHERE item_id = ? \
                     ORDER BY seq DESC"
                ))
                .bind(item_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        collect_rows(rows)
    }

    /// Returns the most recently appended movement for an item.
    pub async fn latest_for_item(
        &self,
        item_id: &str,
    ) -> Result<Option<StockMovement>, MovementError> {
        let row = sqlx::query_as::<_, StockMovementRow>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE item_id = ? ORDER BY seq DESC LIMIT 1"
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(StockMovementRow::into_domain).transpose()?)
    }

    /// Counts all movements recorded for an item.
    pub async fn count_for_item(&self, item_id: &str) -> Result<u64, MovementError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements WHERE item_id = ?")
                .bind(item_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}
