// 📉 Depreciation Model - Year-indexed value loss
// A vehicle loses a fixed share of its value every elapsed year, steepest in year one,
// and never drops below a residual floor of its original price.

use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ============================================================================
// RATE TABLE
// ============================================================================

/// Annual depreciation rates by elapsed year (year 1 = first year after purchase)
pub const DEPRECIATION_RATES: [(u32, f64); 5] = [
    (1, 0.20),
    (2, 0.15),
    (3, 0.12),
    (4, 0.10),
    (5, 0.08),
];

/// Flat rate for every elapsed year past the end of the table
pub const LONG_TERM_RATE: f64 = 0.08;

/// Value never falls below this share of the original price
pub const RESIDUAL_FLOOR: f64 = 0.10;

/// Schedules stop at this elapsed year
pub const MAX_SCHEDULE_YEARS: i32 = 15;

/// Years projected past the vehicle's current age in a schedule
const SCHEDULE_LOOKAHEAD: i32 = 5;

/// Rate for a given elapsed year
pub fn rate_for_year(elapsed_year: u32) -> f64 {
    DEPRECIATION_RATES
        .iter()
        .find(|(year, _)| *year == elapsed_year)
        .map(|(_, rate)| *rate)
        .unwrap_or(LONG_TERM_RATE)
}

/// Current calendar year from the local clock
pub fn current_year() -> i32 {
    Local::now().year()
}

/// Round to `places` decimals from the exact binary value of `value`
///
/// Values just under a half-cent stay under it, and exact ties go to even.
pub fn round_to(value: f64, places: i32) -> f64 {
    let places = places.max(0) as usize;
    format!("{:.*}", places, value).parse().unwrap_or(value)
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValuationError {
    /// Percentages are relative to the original price, so zero has no answer
    #[error("original price is zero, depreciation percentage is undefined")]
    ZeroPrice,
}

// ============================================================================
// DEPRECIATION MODEL
// ============================================================================

/// Depreciation of one vehicle from its original price
///
/// `age` is derived once at construction: reference year minus model year.
/// Future model years give a negative age and are not rejected; they simply
/// depreciate zero years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepreciationModel {
    pub original_price: f64,
    pub model_year: i32,
    pub age: i32,
}

impl DepreciationModel {
    /// Model aged against the current calendar year
    pub fn new(original_price: f64, model_year: i32) -> Self {
        Self::as_of(original_price, model_year, current_year())
    }

    /// Model aged against an explicit reference year
    pub fn as_of(original_price: f64, model_year: i32, reference_year: i32) -> Self {
        DepreciationModel {
            original_price,
            model_year,
            age: reference_year - model_year,
        }
    }

    fn floor(&self) -> f64 {
        self.original_price * RESIDUAL_FLOOR
    }

    /// Value after `age` years of compounding depreciation, floored and rounded to cents
    pub fn calculate_current_value(&self) -> f64 {
        let mut value = self.original_price;
        for year in 1..=self.age.max(0) as u32 {
            value *= 1.0 - rate_for_year(year);
        }
        round_to(value.max(self.floor()), 2)
    }

    /// Year-by-year values from index 0 up to `min(age + 5, 15)`
    ///
    /// Index 0 is always the original price. Later entries carry the floor
    /// and are rounded to cents; the running value itself stays unrounded.
    pub fn get_depreciation_schedule(&self) -> BTreeMap<u32, f64> {
        let mut schedule = BTreeMap::new();
        schedule.insert(0, self.original_price);

        let last_year = (self.age + SCHEDULE_LOOKAHEAD).min(MAX_SCHEDULE_YEARS);
        let mut value = self.original_price;
        for year in 1..=last_year.max(0) as u32 {
            value *= 1.0 - rate_for_year(year);
            schedule.insert(year, round_to(value.max(self.floor()), 2));
        }

        schedule
    }

    pub fn get_total_depreciation(&self) -> f64 {
        round_to(self.original_price - self.calculate_current_value(), 2)
    }

    /// Total depreciation as a percentage of the original price (1 decimal)
    pub fn get_depreciation_percentage(&self) -> Result<f64, ValuationError> {
        if self.original_price == 0.0 {
            return Err(ValuationError::ZeroPrice);
        }
        Ok(round_to(
            self.get_total_depreciation() / self.original_price * 100.0,
            1,
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================
