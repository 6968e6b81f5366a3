use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether a movement adds stock to or removes stock from an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Returns the canonical database representation for the direction.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored direction value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown movement direction: {0}")]
pub struct UnknownDirection(pub String);

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            other => Err(UnknownDirection(other.to_string())),
        }
    }
}

/// Stock health derived from the minimum-stock threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    Low,
    Ok,
}

impl StockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Ok => "OK",
        }
    }
}

/// Consumable tracked by the shop (detergent, plastic bags, hangers...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: String,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub stock: Decimal,
    pub min_stock: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// An item is low once its stock reaches the minimum threshold.
    pub fn status(&self) -> StockStatus {
        if self.stock <= self.min_stock {
            StockStatus::Low
        } else {
            StockStatus::Ok
        }
    }
}

/// Immutable record of a single stock change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: String,
    pub item_id: String,
    pub direction: Direction,
    pub quantity: Decimal,
    pub stock_after: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregates over an item's complete movement history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementStats {
    pub total_in: Decimal,
    pub total_out: Decimal,
    pub movement_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(stock: Decimal, min_stock: Decimal) -> InventoryItem {
        InventoryItem {
            id: "item-1".to_string(),
            code: "00.00.00.01".to_string(),
            name: "Detergent".to_string(),
            unit: "kg".to_string(),
            stock,
            min_stock,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn status_is_low_at_threshold() {
        assert_eq!(item(dec!(5), dec!(5)).status(), StockStatus::Low);
        assert_eq!(item(dec!(4.5), dec!(5)).status(), StockStatus::Low);
        assert_eq!(item(dec!(5.01), dec!(5)).status(), StockStatus::Ok);
    }

    #[test]
    fn direction_round_trips_through_database_representation() {
        for direction in [Direction::In, Direction::Out] {
            assert_eq!(direction.as_str().parse::<Direction>(), Ok(direction));
        }
        assert!("MASUK".parse::<Direction>().is_err());
    }

    #[test]
    fn movement_serializes_camel_case() {
        let movement = StockMovement {
            id: "m-1".to_string(),
            item_id: "item-1".to_string(),
            direction: Direction::Out,
            quantity: dec!(2.5),
            stock_after: dec!(7.5),
            note: None,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&movement).expect("serialize");
        assert_eq!(value["itemId"], "item-1");
        assert_eq!(value["direction"], "OUT");
        assert_eq!(value["stockAfter"], "7.5");
        assert!(value.get("note").is_none());
    }
}
