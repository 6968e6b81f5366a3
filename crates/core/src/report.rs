use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{Direction, InventoryItem, MovementStats, StockMovement};

const CSV_HEADER: [&str; 6] = ["Code", "Name", "Unit", "Stock", "Min Stock", "Status"];

/// Calendar window used to filter movement history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Year(i32),
    Month { year: i32, month: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("month must be between 1 and 12 (got {0})")]
    InvalidMonth(u32),
    #[error("year {0} is out of range")]
    InvalidYear(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("total {0} quantity exceeds the representable range")]
pub struct TotalsOverflow(pub Direction);

impl Period {
    /// Builds a period from optional query values. A month without a year is ignored.
    pub fn from_parts(year: Option<i32>, month: Option<u32>) -> Result<Option<Self>, PeriodError> {
        let Some(year) = year else {
            return Ok(None);
        };
        let period = match month {
            Some(month) if !(1..=12).contains(&month) => {
                return Err(PeriodError::InvalidMonth(month))
            }
            Some(month) => Self::Month { year, month },
            None => Self::Year(year),
        };
        period.bounds_naive()?;
        Ok(Some(period))
    }

    /// Returns the half-open `[start, end)` window in UTC for the given shop timezone.
    pub fn bounds(&self, tz: Tz) -> Result<(DateTime<Utc>, DateTime<Utc>), PeriodError> {
        let (start, end) = self.bounds_naive()?;
        Ok((local_midnight(tz, start), local_midnight(tz, end)))
    }

    fn bounds_naive(&self) -> Result<(NaiveDate, NaiveDate), PeriodError> {
        let (year, start, end) = match *self {
            Self::Year(year) => (
                year,
                NaiveDate::from_ymd_opt(year, 1, 1),
                year.checked_add(1)
                    .and_then(|next| NaiveDate::from_ymd_opt(next, 1, 1)),
            ),
            Self::Month { year, month } => {
                let (next_year, next_month) = if month == 12 {
                    (year.checked_add(1), 1)
                } else {
                    (Some(year), month + 1)
                };
                (
                    year,
                    NaiveDate::from_ymd_opt(year, month, 1),
                    next_year.and_then(|next| NaiveDate::from_ymd_opt(next, next_month, 1)),
                )
            }
        };
        match (start, end) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(PeriodError::InvalidYear(year)),
        }
    }
}

// Midnight can fall inside a DST gap in a few zones; the wall clock is then read as UTC.
fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

impl MovementStats {
    /// Sums inbound and outbound quantities over the provided movements.
    ///
    /// Each balance fits a `Decimal`, but the running totals of a long-lived
    /// item may not, so the sums are checked.
    pub fn tally<'a, I>(movements: I) -> Result<Self, TotalsOverflow>
    where
        I: IntoIterator<Item = &'a StockMovement>,
    {
        let mut stats = Self::default();
        for movement in movements {
            let total = match movement.direction {
                Direction::In => &mut stats.total_in,
                Direction::Out => &mut stats.total_out,
            };
            *total = total
                .checked_add(movement.quantity)
                .ok_or(TotalsOverflow(movement.direction))?;
            stats.movement_count += 1;
        }
        stats.total_in = stats.total_in.normalize();
        stats.total_out = stats.total_out.normalize();
        Ok(stats)
    }
}

/// Renders the inventory list as CSV, one row per item in the given order.
pub fn inventory_csv(items: &[InventoryItem]) -> String {
    let mut out = String::new();
    push_row(&mut out, CSV_HEADER);
    for item in items {
        let stock = decimal_text(item.stock);
        let min_stock = decimal_text(item.min_stock);
        push_row(
            &mut out,
            [
                item.code.as_str(),
                item.name.as_str(),
                item.unit.as_str(),
                stock.as_str(),
                min_stock.as_str(),
                item.status().as_str(),
            ],
        );
    }
    out
}

/// Download name for the CSV export, dated in the shop timezone.
pub fn export_file_name(now: DateTime<Utc>, tz: Tz) -> String {
    format!("inventory-{}.csv", now.with_timezone(&tz).format("%Y-%m-%d"))
}

fn decimal_text(value: Decimal) -> String {
    value.normalize().to_string()
}

fn push_row<const N: usize>(out: &mut String, fields: [&str; N]) {
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push('\n');
}

fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}
