use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

const CODE_PREFIX: &str = "00.00.00.";
const MAX_SEQUENTIAL_CODE: u32 = 9999;

/// Note attached to the movement that seeds a newly registered item.
pub const INITIAL_STOCK_NOTE: &str = "Initial stock";

/// Input accepted when registering a new inventory item.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    pub name: String,
    pub unit: String,
    pub stock: Decimal,
    pub min_stock: Decimal,
}

/// Editable item metadata. Stock is intentionally absent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEdit {
    pub name: String,
    pub unit: String,
    pub min_stock: Decimal,
}

/// Validated registration, with trimmed text fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidDraft {
    pub name: String,
    pub unit: String,
    pub stock: Decimal,
    pub min_stock: Decimal,
}

impl ValidDraft {
    /// Quantity of the seeding stock-in movement, if any.
    pub fn seed_quantity(&self) -> Option<Decimal> {
        (self.stock > Decimal::ZERO).then_some(self.stock)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("{0} must not be empty")]
    Blank(&'static str),
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: Decimal },
}

impl ItemDraft {
    pub fn validate(self) -> Result<ValidDraft, CatalogError> {
        let name = required_text("name", &self.name)?;
        let unit = required_text("unit", &self.unit)?;
        let stock = non_negative("stock", self.stock)?;
        let min_stock = non_negative("minStock", self.min_stock)?;
        Ok(ValidDraft {
            name,
            unit,
            stock,
            min_stock,
        })
    }
}

impl ItemEdit {
    pub fn validate(self) -> Result<Self, CatalogError> {
        Ok(Self {
            name: required_text("name", &self.name)?,
            unit: required_text("unit", &self.unit)?,
            min_stock: non_negative("minStock", self.min_stock)?,
        })
    }
}

fn required_text(field: &'static str, value: &str) -> Result<String, CatalogError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::Blank(field));
    }
    Ok(trimmed.to_string())
}

fn non_negative(field: &'static str, value: Decimal) -> Result<Decimal, CatalogError> {
    if value < Decimal::ZERO {
        return Err(CatalogError::Negative { field, value });
    }
    Ok(value.normalize())
}

/// Picks the lowest free `00.00.00.NN` code.
///
/// Once every sequential code is taken the code falls back to the last six
/// digits of `now` in Unix milliseconds.
pub fn next_item_code<'a, I>(existing: I, now: DateTime<Utc>) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: HashSet<&str> = existing.into_iter().collect();
    for n in 1..=MAX_SEQUENTIAL_CODE {
        let code = format!("{CODE_PREFIX}{n:02}");
        if !taken.contains(code.as_str()) {
            return code;
        }
    }

    let millis = now.timestamp_millis().unsigned_abs().to_string();
    let suffix = &millis[millis.len().saturating_sub(6)..];
    format!("00.00.{suffix}")
}
