//! Core data model shared across the engine.
//!
//! Everything here is a value object: built fresh per analysis request,
//! never mutated in place, only derived or copied.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};
use uuid::Uuid;

/// One observed calendar day of sales for a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesObservation {
    pub date: NaiveDate,
    pub units_sold: u32,
    pub revenue: Decimal,
    pub returns_count: u32,
}

impl SalesObservation {
    pub fn zero(date: NaiveDate) -> Self {
        Self {
            date,
            units_sold: 0,
            revenue: Decimal::ZERO,
            returns_count: 0,
        }
    }

    /// Units sold net of returns. May be negative on a heavy-returns day.
    pub fn net_units(&self) -> i64 {
        i64::from(self.units_sold) - i64::from(self.returns_count)
    }
}

/// An ordered, gap-free sequence of daily sales observations.
///
/// Invariant: exactly one entry per calendar day between `start` and `end`
/// inclusive, zero-filled for days without sales. Consumers rely on
/// fixed-length arrays, so the constructor is the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesSeries {
    observations: Vec<SalesObservation>,
}

impl SalesSeries {
    /// Builds a gap-free series over `[start, end]` from whatever daily
    /// records the source produced. Days with no record are zero-filled;
    /// duplicate records for a day are summed.
    pub fn build(
        start: NaiveDate,
        end: NaiveDate,
        records: impl IntoIterator<Item = SalesObservation>,
    ) -> Self {
        let mut by_date: HashMap<NaiveDate, SalesObservation> = HashMap::new();
        for rec in records {
            by_date
                .entry(rec.date)
                .and_modify(|existing| {
                    existing.units_sold += rec.units_sold;
                    existing.revenue += rec.revenue;
                    existing.returns_count += rec.returns_count;
                })
                .or_insert(rec);
        }

        let mut observations = Vec::new();
        let mut current = start;
        while current <= end {
            observations.push(
                by_date
                    .remove(&current)
                    .unwrap_or_else(|| SalesObservation::zero(current)),
            );
            current += Duration::days(1);
        }

        Self { observations }
    }

    /// An empty series (no window at all), used when a product has never
    /// been observed.
    pub fn empty() -> Self {
        Self {
            observations: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[SalesObservation] {
        &self.observations
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.date)
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }

    /// Gross units sold per day, as floats for the model layer.
    pub fn units(&self) -> Vec<f64> {
        self.observations
            .iter()
            .map(|o| f64::from(o.units_sold))
            .collect()
    }

    /// Net units sold per day (gross minus returns).
    pub fn net_units(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.net_units() as f64).collect()
    }

    pub fn total_units(&self) -> u64 {
        self.observations.iter().map(|o| u64::from(o.units_sold)).sum()
    }

    pub fn total_returns(&self) -> u64 {
        self.observations
            .iter()
            .map(|o| u64::from(o.returns_count))
            .sum()
    }

    pub fn total_net_units(&self) -> i64 {
        self.observations.iter().map(|o| o.net_units()).sum()
    }

    /// Sum of net units over the trailing `days` observations.
    pub fn tail_net_sum(&self, days: usize) -> i64 {
        let skip = self.observations.len().saturating_sub(days);
        self.observations[skip..].iter().map(|o| o.net_units()).sum()
    }

    /// Sum of net units over `days` observations ending `offset` days
    /// before the end of the series.
    pub fn window_net_sum(&self, offset: usize, days: usize) -> i64 {
        let len = self.observations.len();
        let end = len.saturating_sub(offset);
        let start = end.saturating_sub(days);
        self.observations[start..end].iter().map(|o| o.net_units()).sum()
    }
}

/// How long a perishable product stays sellable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfLife {
    pub days: u32,
}

impl ShelfLife {
    /// Parses free-text shelf-life attributes like `"6 months"` or
    /// `"180 days"`. Months are approximated at 30 days, as the source
    /// data does.
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        let digits: String = lower.chars().filter(|c| c.is_ascii_digit()).collect();
        let quantity: u32 = digits.parse().ok()?;
        if quantity == 0 {
            return None;
        }
        if lower.contains("month") {
            Some(Self { days: quantity * 30 })
        } else if lower.contains("day") {
            Some(Self { days: quantity })
        } else {
            None
        }
    }

    /// Remaining shelf life implied by an explicit expiry date.
    pub fn from_expiry(expiry: NaiveDate, today: NaiveDate) -> Option<Self> {
        let remaining = (expiry - today).num_days();
        if remaining > 0 {
            Some(Self {
                days: remaining as u32,
            })
        } else {
            None
        }
    }
}

/// Read-only product state at analysis time. Owned by the repository
/// adapter; the engine never writes it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub current_stock: i64,
    pub reserved_stock: i64,
    pub low_stock_threshold: i64,
    pub status: String,
    pub store_id: Option<Uuid>,
    pub category: Option<String>,
    pub pet_types: Vec<String>,
    pub is_perishable: bool,
    pub shelf_life: Option<ShelfLife>,
}

impl ProductSnapshot {
    /// Stock actually sellable right now.
    pub fn available_stock(&self) -> i64 {
        (self.current_stock - self.reserved_stock).max(0)
    }

    /// First pet-type tag, used for seasonal lookups.
    pub fn primary_pet_type(&self) -> Option<&str> {
        self.pet_types.first().map(String::as_str)
    }
}

/// Category-level average sales, used for cold-start estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryVelocity {
    pub daily_average_per_product: f64,
    pub data_points: usize,
}

impl CategoryVelocity {
    pub fn none() -> Self {
        Self {
            daily_average_per_product: 0.0,
            data_points: 0,
        }
    }
}

/// One day of observed selling price, for the price-impact heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub avg_price: Decimal,
}

/// Direction of recent sales movement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    InsufficientData,
    NoData,
}

/// Restock urgency, ordered least to most severe so `max` picks the more
/// severe of two independent classifications.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UrgencyTier {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// Where the daily-demand estimate came from, so consumers can discount
/// confidence on cold-start products.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PredictionSource {
    ActualSales,
    CategoryAi,
    Baseline,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn build_zero_fills_missing_days() {
        let records = vec![
            SalesObservation {
                date: day(3),
                units_sold: 5,
                revenue: dec!(50.00),
                returns_count: 1,
            },
            SalesObservation {
                date: day(6),
                units_sold: 2,
                revenue: dec!(20.00),
                returns_count: 0,
            },
        ];
        let series = SalesSeries::build(day(1), day(7), records);

        assert_eq!(series.len(), 7);
        assert_eq!(series.observations()[0].units_sold, 0);
        assert_eq!(series.observations()[2].units_sold, 5);
        assert_eq!(series.total_units(), 7);
        assert_eq!(series.total_net_units(), 6);
    }

    #[test]
    fn build_length_matches_inclusive_day_count() {
        let series = SalesSeries::build(day(1), day(30), Vec::new());
        assert_eq!(series.len(), 30);
        assert_eq!(series.total_units(), 0);
    }

    #[test]
    fn build_sums_duplicate_records() {
        let records = vec![
            SalesObservation {
                date: day(2),
                units_sold: 3,
                revenue: dec!(30.00),
                returns_count: 0,
            },
            SalesObservation {
                date: day(2),
                units_sold: 4,
                revenue: dec!(40.00),
                returns_count: 2,
            },
        ];
        let series = SalesSeries::build(day(1), day(3), records);
        assert_eq!(series.observations()[1].units_sold, 7);
        assert_eq!(series.observations()[1].returns_count, 2);
    }

    #[test]
    fn tail_and_window_sums() {
        let records = (1..=14).map(|d| SalesObservation {
            date: day(d),
            units_sold: d,
            revenue: Decimal::ZERO,
            returns_count: 0,
        });
        let series = SalesSeries::build(day(1), day(14), records);

        // last 7 days: 8+9+...+14
        assert_eq!(series.tail_net_sum(7), 77);
        // the 7 days before those: 1+2+...+7
        assert_eq!(series.window_net_sum(7, 7), 28);
    }

    #[test]
    fn shelf_life_parses_months_and_days() {
        assert_eq!(ShelfLife::parse("6 months"), Some(ShelfLife { days: 180 }));
        assert_eq!(ShelfLife::parse("45 Days"), Some(ShelfLife { days: 45 }));
        assert_eq!(ShelfLife::parse("fresh"), None);
        assert_eq!(ShelfLife::parse("0 days"), None);
    }

    #[test]
    fn shelf_life_from_expiry_counts_remaining_days() {
        let today = day(1);
        assert_eq!(
            ShelfLife::from_expiry(day(15), today),
            Some(ShelfLife { days: 14 })
        );
        assert_eq!(ShelfLife::from_expiry(day(1), today), None);
    }

    #[test]
    fn available_stock_saturates_at_zero() {
        let snapshot = ProductSnapshot {
            product_id: Uuid::new_v4(),
            variant_id: None,
            name: "Test".to_string(),
            current_stock: 5,
            reserved_stock: 9,
            low_stock_threshold: 10,
            status: "active".to_string(),
            store_id: None,
            category: None,
            pet_types: vec![],
            is_perishable: false,
            shelf_life: None,
        };
        assert_eq!(snapshot.available_stock(), 0);
    }

    #[test]
    fn urgency_ordering_matches_severity() {
        assert!(UrgencyTier::Critical > UrgencyTier::High);
        assert!(UrgencyTier::High > UrgencyTier::Medium);
        assert!(UrgencyTier::Medium > UrgencyTier::Low);
        assert!(UrgencyTier::Low > UrgencyTier::None);
        assert_eq!(
            UrgencyTier::Critical.max(UrgencyTier::Low),
            UrgencyTier::Critical
        );
    }
}
