use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use laundry_core::ledger::{self, LedgerError};
use laundry_core::types::{Direction, StockMovement};
use laundry_storage::{Database, InventoryError, MovementError, NewStockMovement, StorageError};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A single requested stock change.
#[derive(Debug, Clone)]
pub struct MovementRequest<'a> {
    pub item_id: &'a str,
    pub direction: Direction,
    pub quantity: Decimal,
    pub note: Option<&'a str>,
}

/// Applies stock movements: one transaction per movement, serialized per database.
#[derive(Clone)]
pub struct StockLedger {
    database: Database,
    clock: Clock,
}

impl StockLedger {
    pub fn new(database: Database, clock: Clock) -> Self {
        Self { database, clock }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Records a movement and updates the item's stock atomically.
    ///
    /// Rejected movements (unknown item, bad quantity, insufficient stock)
    /// leave both the item and its history untouched.
    pub async fn apply_movement(
        &self,
        request: &MovementRequest<'_>,
    ) -> Result<StockMovement, StockLedgerError> {
        let outcome = self.apply(request).await;
        counter!(
            "stock_movements_total",
            "direction" => request.direction.as_str(),
            "result" => outcome_label(&outcome)
        )
        .increment(1);
        outcome
    }

    async fn apply(
        &self,
        request: &MovementRequest<'_>,
    ) -> Result<StockMovement, StockLedgerError> {
        ledger::validate_quantity(request.quantity)?;

        let now = self.now();
        let inventory = self.database.inventory();
        let mut tx = self.database.begin().await?;

        let Some(stock) = inventory
            .lock_stock(&mut tx, request.item_id, now)
            .await
            .map_err(|err| StockLedgerError::from_inventory(request.item_id, err))?
        else {
            tx.rollback().await?;
            return Err(StockLedgerError::NotFound(request.item_id.to_string()));
        };

        let stock_after = match ledger::next_balance(stock, request.direction, request.quantity) {
            Ok(value) => value,
            Err(err) => {
                tx.rollback().await?;
                debug!(
                    stage = "ledger",
                    item_id = request.item_id,
                    direction = %request.direction,
                    quantity = %request.quantity,
                    stock = %stock,
                    "movement rejected"
                );
                return Err(err.into());
            }
        };

        let id = Uuid::new_v4().to_string();
        let note = ledger::normalize_note(request.note);
        let movement = self
            .database
            .movements()
            .insert(
                &mut tx,
                &NewStockMovement {
                    id: &id,
                    item_id: request.item_id,
                    direction: request.direction,
                    quantity: request.quantity,
                    stock_after,
                    note: note.as_deref(),
                    created_at: now,
                },
            )
            .await?;
        inventory
            .set_stock(&mut tx, request.item_id, stock_after, now)
            .await
            .map_err(|err| StockLedgerError::from_inventory(request.item_id, err))?;
        tx.commit().await?;

        info!(
            stage = "ledger",
            item_id = request.item_id,
            movement_id = %movement.id,
            direction = %movement.direction,
            quantity = %movement.quantity,
            stock_after = %movement.stock_after,
            "stock movement applied"
        );
        Ok(movement)
    }
}

fn outcome_label(outcome: &Result<StockMovement, StockLedgerError>) -> &'static str {
    match outcome {
        Ok(_) => "applied",
        Err(StockLedgerError::NotFound(_)) => "not_found",
        Err(StockLedgerError::InvalidArgument(_)) => "invalid_argument",
        Err(StockLedgerError::InsufficientStock { .. }) => "insufficient_stock",
        Err(_) => "error",
    }
}

#[derive(Debug, Error)]
pub enum StockLedgerError {
    #[error("inventory item {0} not found")]
    NotFound(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("insufficient stock: {available} available, {requested} requested")]
    InsufficientStock {
        available: Decimal,
        requested: Decimal,
    },
    #[error("inventory error: {0}")]
    Inventory(InventoryError),
    #[error("movement error: {0}")]
    Movement(#[from] MovementError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<LedgerError> for StockLedgerError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientStock {
                available,
                requested,
            } => Self::InsufficientStock {
                available,
                requested,
            },
            other => Self::InvalidArgument(other.to_string()),
        }
    }
}

impl StockLedgerError {
    /// Attributes a missing inventory row to the item the movement targeted.
    fn from_inventory(item_id: &str, err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound => Self::NotFound(item_id.to_string()),
            other => Self::Inventory(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InventoryCatalog;
    use laundry_core::catalog::ItemDraft;
    use rust_decimal_macros::dec;

    async fn setup() -> (Database, StockLedger, InventoryCatalog) {
        let database = Database::connect("sqlite::memory:")
            .await
            .expect("connect");
        database.run_migrations().await.expect("migrations");
        let clock: Clock = Arc::new(Utc::now);
        let ledger = StockLedger::new(database.clone(), clock.clone());
        let catalog = InventoryCatalog::new(database.clone(), clock, chrono_tz::UTC);
        (database, ledger, catalog)
    }

    async fn register(catalog: &InventoryCatalog, stock: Decimal, min_stock: Decimal) -> String {
        catalog
            .register(ItemDraft {
                name: "Detergent".to_string(),
                unit: "kg".to_string(),
                stock,
                min_stock,
            })
            .await
            .expect("register")
            .id
    }

    fn request(item_id: &str, direction: Direction, quantity: Decimal) -> MovementRequest<'_> {
        MovementRequest {
            item_id,
            direction,
            quantity,
            note: None,
        }
    }

    async fn assert_ledger_consistent(database: &Database, item_id: &str) {
        let item = database.inventory().fetch(item_id).await.expect("fetch");
        let latest = database
            .movements()
            .latest_for_item(item_id)
            .await
            .expect("latest")
            .expect("at least one movement");
        assert_eq!(item.stock, latest.stock_after);
    }

    #[tokio::test]
    async fn restock_and_consume_scenario() {
        let (database, ledger, catalog) = setup().await;
        let item_id = register(&catalog, dec!(10), dec!(5)).await;

        let inbound = ledger
            .apply_movement(&request(&item_id, Direction::In, dec!(5)))
            .await
            .expect("inbound");
        assert_eq!(inbound.stock_after, dec!(15));
        assert_ledger_consistent(&database, &item_id).await;

        let err = ledger
            .apply_movement(&request(&item_id, Direction::Out, dec!(20)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StockLedgerError::InsufficientStock { available, requested }
                if available == dec!(15) && requested == dec!(20)
        ));
        let item = database.inventory().fetch(&item_id).await.expect("fetch");
        assert_eq!(item.stock, dec!(15));
        assert_eq!(
            database
                .movements()
                .count_for_item(&item_id)
                .await
                .expect("count"),
            2
        );

        let outbound = ledger
            .apply_movement(&request(&item_id, Direction::Out, dec!(15)))
            .await
            .expect("outbound");
        assert_eq!(outbound.stock_after, dec!(0));
        assert_ledger_consistent(&database, &item_id).await;
    }

    #[tokio::test]
    async fn non_positive_quantity_is_invalid() {
        let (database, ledger, catalog) = setup().await;
        let item_id = register(&catalog, dec!(10), dec!(0)).await;

        for direction in [Direction::In, Direction::Out] {
            for quantity in [dec!(0), dec!(-1)] {
                let err = ledger
                    .apply_movement(&request(&item_id, direction, quantity))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StockLedgerError::InvalidArgument(_)));
            }
        }
        assert_eq!(
            database
                .movements()
                .count_for_item(&item_id)
                .await
                .expect("count"),
            1
        );
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let (_database, ledger, _catalog) = setup().await;
        let err = ledger
            .apply_movement(&request("missing", Direction::In, dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StockLedgerError::NotFound(id) if id == "missing"));
    }

    #[test]
    fn missing_inventory_row_is_not_found() {
        let err = StockLedgerError::from_inventory("item-1", InventoryError::NotFound);
        assert!(matches!(err, StockLedgerError::NotFound(id) if id == "item-1"));

        let err = StockLedgerError::from_inventory(
            "item-1",
            InventoryError::DuplicateCode("00.00.00.01".into()),
        );
        assert!(matches!(err, StockLedgerError::Inventory(_)));
    }

    #[tokio::test]
    async fn note_is_trimmed_and_movement_touches_only_its_item() {
        let (database, ledger, catalog) = setup().await;
        let first = register(&catalog, dec!(4), dec!(1)).await;
        let second = register(&catalog, dec!(9), dec!(1)).await;

        let movement = ledger
            .apply_movement(&MovementRequest {
                item_id: &first,
                direction: Direction::Out,
                quantity: dec!(1.5),
                note: Some("  ironing room  "),
            })
            .await
            .expect("apply");
        assert_eq!(movement.note.as_deref(), Some("ironing room"));
        assert_eq!(movement.stock_after, dec!(2.5));

        let untouched = database.inventory().fetch(&second).await.expect("fetch");
        assert_eq!(untouched.stock, dec!(9));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_outbound_movements_serialize() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
        let database = Database::connect(&url).await.expect("connect");
        database.run_migrations().await.expect("migrations");
        let clock: Clock = Arc::new(Utc::now);
        let ledger = StockLedger::new(database.clone(), clock.clone());
        let catalog = InventoryCatalog::new(database.clone(), clock, chrono_tz::UTC);
        let item_id = register(&catalog, dec!(10), dec!(0)).await;

        for _ in 0..10 {
            let before = database.inventory().fetch(&item_id).await.expect("fetch");
            if before.stock < dec!(10) {
                ledger
                    .apply_movement(&request(&item_id, Direction::In, dec!(10) - before.stock))
                    .await
                    .expect("refill");
            }

            let first = {
                let ledger = ledger.clone();
                let item_id = item_id.clone();
                tokio::spawn(async move {
                    ledger
                        .apply_movement(&request(&item_id, Direction::Out, dec!(7)))
                        .await
                })
            };
            let second = {
                let ledger = ledger.clone();
                let item_id = item_id.clone();
                tokio::spawn(async move {
                    ledger
                        .apply_movement(&request(&item_id, Direction::Out, dec!(6)))
                        .await
                })
            };

            let results = [
                first.await.expect("join first"),
                second.await.expect("join second"),
            ];
            let applied = results.iter().filter(|result| result.is_ok()).count();
            let rejected = results
                .iter()
                .filter(|result| matches!(result, Err(StockLedgerError::InsufficientStock { .. })))
                .count();
            assert_eq!(applied, 1, "exactly one outbound movement must win: {results:?}");
            assert_eq!(rejected, 1, "the other must see the reduced balance: {results:?}");

            let item = database.inventory().fetch(&item_id).await.expect("fetch");
            assert!(item.stock == dec!(3) || item.stock == dec!(4));
            assert_ledger_consistent(&database, &item_id).await;
        }
    }
}
