use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use laundry_core::catalog::ItemEdit;
use laundry_core::types::InventoryItem;

use crate::{decimal_from_db, decimal_to_db, is_unique_violation, to_rfc3339, CorruptValue};

const ITEM_COLUMNS: &str = "id, code, name, unit, stock, min_stock, created_at, updated_at";

/// Repository for `inventory_items` rows.
#[derive(Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

/// Errors raised by [`InventoryRepository`].
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory item not found")]
    NotFound,
    #[error("inventory code {0} is already taken")]
    DuplicateCode(String),
    #[error(transparent)]
    Corrupt(#[from] CorruptValue),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Row inserted when an item is registered.
pub struct NewInventoryItem<'a> {
    pub id: &'a str,
    pub code: &'a str,
    pub name: &'a str,
    pub unit: &'a str,
    pub stock: Decimal,
    pub min_stock: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct InventoryItemRow {
    id: String,
    code: String,
    name: String,
    unit: String,
    stock: String,
    min_stock: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InventoryItemRow {
    fn into_domain(self) -> Result<InventoryItem, CorruptValue> {
        Ok(InventoryItem {
            stock: decimal_from_db("stock", &self.stock)?,
            min_stock: decimal_from_db("min_stock", &self.min_stock)?,
            id: self.id,
            code: self.code,
            name: self.name,
            unit: self.unit,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl InventoryRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lists every code currently assigned, used to pick the next free one.
    pub async fn list_codes(&self) -> Result<Vec<String>, InventoryError> {
        let codes = sqlx::query_scalar::<_, String>("SELECT code FROM inventory_items")
            .fetch_all(&self.pool)
            .await?;
        Ok(codes)
    }

    /// Inserts a freshly registered item inside the caller's transaction.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        item: &NewInventoryItem<'_>,
    ) -> Result<InventoryItem, InventoryError> {
        let created_at = to_rfc3339(item.created_at);
        let row = sqlx::query_as::<_, InventoryItemRow>(&format!(
            "INSERT INTO inventory_items \
             (id, code, name, unit, stock, min_stock, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(item.id)
        .bind(item.code)
        .bind(item.name)
        .bind(item.unit)
        .bind(decimal_to_db(item.stock))
        .bind(decimal_to_db(item.min_stock))
        .bind(&created_at)
        .bind(&created_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                InventoryError::DuplicateCode(item.code.to_string())
            } else {
                InventoryError::Database(err)
            }
        })?;

        Ok(row.into_domain()?)
    }

    /// Lists all items ordered by code.
    pub async fn list(&self) -> Result<Vec<InventoryItem>, InventoryError> {
        let rows = sqlx::query_as::<_, InventoryItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items ORDER BY code ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.into_domain().map_err(InventoryError::from))
            .collect()
    }

    /// Loads a single item.
    pub async fn fetch(&self, id: &str) -> Result<InventoryItem, InventoryError> {
        let row = sqlx::query_as::<_, InventoryItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(InventoryError::NotFound)?;

        Ok(row.into_domain()?)
    }

    /// Updates name, unit and minimum stock. Stock itself is left untouched.
    pub async fn update_details(
        &self,
        id: &str,
        edit: &ItemEdit,
        updated_at: DateTime<Utc>,
    ) -> Result<InventoryItem, InventoryError> {
        let row = sqlx::query_as::<_, InventoryItemRow>(&format!(
            "UPDATE inventory_items \
             SET name = ?, unit = ?, min_stock = ?, updated_at = ? \
             WHERE id = ? \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(&edit.name)
        .bind(&edit.unit)
        .bind(decimal_to_db(edit.min_stock))
        .bind(to_rfc3339(updated_at))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(InventoryError::NotFound)?;

        Ok(row.into_domain()?)
    }

    /// Deletes an item; its movements are removed by the foreign key cascade.
    pub async fn delete(&self, id: &str) -> Result<(), InventoryError> {
        let result = sqlx::query("DELETE FROM inventory_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(InventoryError::NotFound);
        }
        Ok(())
    }

    /// Takes the write lock for `id` and returns its current stock.
    ///
    /// Must be the first statement of the transaction: issuing a write before
    /// any read makes SQLite acquire the reserved lock up front, so concurrent
    /// callers wait on the busy timeout and then observe the committed stock.
    /// Returns `None` when the item does not exist.
    pub async fn lock_stock(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        touched_at: DateTime<Utc>,
    ) -> Result<Option<Decimal>, InventoryError> {
        let stock = sqlx::query_scalar::<_, String>(
            "UPDATE inventory_items SET updated_at = ? WHERE id = ? RETURNING stock",
        )
        .bind(to_rfc3339(touched_at))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

        stock
            .map(|value| decimal_from_db("stock", &value).map_err(InventoryError::from))
            .transpose()
    }

    /// Writes the post-movement balance. Only the stock ledger calls this.
    pub async fn set_stock(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        stock: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<(), InventoryError> {
        let result =
            sqlx::query("UPDATE inventory_items SET stock = ?, updated_at = ? WHERE id = ?")
                .bind(decimal_to_db(stock))
                .bind(to_rfc3339(updated_at))
                .bind(id)
                .execute(&mut **tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(InventoryError::NotFound);
        }
        Ok(())
    }
}
