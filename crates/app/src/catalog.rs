use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use laundry_core::catalog::{
    next_item_code, CatalogError, ItemDraft, ItemEdit, ValidDraft, INITIAL_STOCK_NOTE,
};
use laundry_core::report::{
    export_file_name, inventory_csv, Period, PeriodError, TotalsOverflow,
};
use laundry_core::types::{
    Direction, InventoryItem, MovementStats, StockMovement, StockStatus,
};
use laundry_storage::{
    Database, InventoryError, MovementError, NewInventoryItem, NewStockMovement, StorageError,
};

use crate::ledger::Clock;

const MAX_CODE_ATTEMPTS: usize = 3;

/// Item as listed in the inventory overview.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    #[serde(flatten)]
    pub item: InventoryItem,
    pub status: StockStatus,
}

impl From<InventoryItem> for ItemSummary {
    fn from(item: InventoryItem) -> Self {
        let status = item.status();
        Self { item, status }
    }
}

/// Item with statistics over its complete movement history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: InventoryItem,
    pub status: StockStatus,
    #[serde(flatten)]
    pub stats: MovementStats,
}

/// Filtered movement history plus the unfiltered movement count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementHistory {
    pub movements: Vec<StockMovement>,
    pub total: u64,
}

/// Rendered CSV export.
#[derive(Debug, Clone)]
pub struct InventoryExport {
    pub file_name: String,
    pub body: String,
}

/// Inventory item lifecycle outside of stock changes.
#[derive(Clone)]
pub struct InventoryCatalog {
    database: Database,
    clock: Clock,
    timezone: Tz,
}

impl InventoryCatalog {
    pub fn new(database: Database, clock: Clock, timezone: Tz) -> Self {
        Self {
            database,
            clock,
            timezone,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Registers an item under the lowest free code, seeding its stock with an inbound movement.
    pub async fn register(&self, draft: ItemDraft) -> Result<InventoryItem, CatalogServiceError> {
        let draft = draft.validate()?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_register(&draft).await {
                Err(CatalogServiceError::Conflict(code)) if attempt < MAX_CODE_ATTEMPTS => {
                    warn!(stage = "inventory", %code, attempt, "item code taken concurrently, retrying");
                }
                Ok(item) => {
                    counter!("inventory_items_registered_total").increment(1);
                    info!(
                        stage = "inventory",
                        item_id = %item.id,
                        code = %item.code,
                        stock = %item.stock,
                        "inventory item registered"
                    );
                    return Ok(item);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_register(&self, draft: &ValidDraft) -> Result<InventoryItem, CatalogServiceError> {
        let now = self.now();
        let inventory = self.database.inventory();
        let codes = inventory.list_codes().await?;
        let code = next_item_code(codes.iter().map(String::as_str), now);
        let id = Uuid::new_v4().to_string();

        let mut tx = self.database.begin().await?;
        let item = inventory
            .insert(
                &mut tx,
                &NewInventoryItem {
                    id: &id,
                    code: &code,
                    name: &draft.name,
                    unit: &draft.unit,
                    stock: draft.stock,
                    min_stock: draft.min_stock,
                    created_at: now,
                },
            )
            .await?;

        if let Some(quantity) = draft.seed_quantity() {
            let movement_id = Uuid::new_v4().to_string();
            self.database
                .movements()
                .insert(
                    &mut tx,
                    &NewStockMovement {
                        id: &movement_id,
                        item_id: &id,
                        direction: Direction::In,
                        quantity,
                        stock_after: item.stock,
                        note: Some(INITIAL_STOCK_NOTE),
                        created_at: now,
                    },
                )
                .await?;
        }

        tx.commit().await?;
        Ok(item)
    }

    pub async fn list(&self) -> Result<Vec<ItemSummary>, CatalogServiceError> {
        let items = self.database.inventory().list().await?;
        Ok(items.into_iter().map(ItemSummary::from).collect())
    }

    pub async fn detail(&self, id: &str) -> Result<ItemDetail, CatalogServiceError> {
        let item = self.database.inventory().fetch(id).await?;
        let movements = self.database.movements().list_for_item(id, None).await?;
        let stats = MovementStats::tally(&movements)?;
        let status = item.status();
        Ok(ItemDetail {
            item,
            status,
            stats,
        })
    }

    pub async fn update(&self, id: &str, edit: ItemEdit) -> Result<InventoryItem, CatalogServiceError> {
        let edit = edit.validate()?;
        let item = self
            .database
            .inventory()
            .update_details(id, &edit, self.now())
            .await?;
        info!(stage = "inventory", item_id = %item.id, "inventory item updated");
        Ok(item)
    }

    /// Deletes an item together with its movement history.
    pub async fn delete(&self, id: &str) -> Result<(), CatalogServiceError> {
        self.database.inventory().delete(id).await?;
        info!(stage = "inventory", item_id = %id, "inventory item deleted");
        Ok(())
    }

    /// Lists an item's movements, optionally restricted to a year or month in the shop timezone.
    pub async fn history(
        &self,
        id: &str,
        year: Option<i32>,
        month: Option<u32>,
    ) -> Result<MovementHistory, CatalogServiceError> {
        let window = Period::from_parts(year, month)?
            .map(|period| period.bounds(self.timezone))
            .transpose()?;

        // Resolve the item first so an unknown id is reported as such, not as an empty history.
        self.database.inventory().fetch(id).await?;

        let movements_repo = self.database.movements();
        let movements = movements_repo.list_for_item(id, window).await?;
        let total = movements_repo.count_for_item(id).await?;
        Ok(MovementHistory { movements, total })
    }

    pub async fn export_csv(&self) -> Result<InventoryExport, CatalogServiceError> {
        let items = self.database.inventory().list().await?;
        Ok(InventoryExport {
            file_name: export_file_name(self.now(), self.timezone),
            body: inventory_csv(&items),
        })
    }
}

#[derive(Debug, Error)]
pub enum CatalogServiceError {
    #[error("inventory item not found")]
    NotFound,
    #[error("{0}")]
    InvalidArgument(String),
    #[error("inventory code {0} is already taken")]
    Conflict(String),
    #[error("inventory error: {0}")]
    Inventory(InventoryError),
    #[error("movement error: {0}")]
    Movement(#[from] MovementError),
    #[error(transparent)]
    Totals(#[from] TotalsOverflow),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<InventoryError> for CatalogServiceError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound => Self::NotFound,
            InventoryError::DuplicateCode(code) => Self::Conflict(code),
            other => Self::Inventory(other),
        }
    }
}

impl From<CatalogError> for CatalogServiceError {
    fn from(err: CatalogError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<PeriodError> for CatalogServiceError {
    fn from(err: PeriodError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}
