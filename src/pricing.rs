// 💰 Price Calculator - Market value on top of depreciation
// Layers make, condition and mileage multipliers over the depreciated value,
// ranks vehicles by retained value, and suggests listing prices from make alone.

use crate::depreciation::{current_year, round_to, DepreciationModel, ValuationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

// ============================================================================
// LOOKUP TABLES
// ============================================================================

/// Market multiplier by lower-cased make
pub const MAKE_FACTORS: [(&str, f64); 8] = [
    ("toyota", 1.10),
    ("honda", 1.08),
    ("ford", 1.00),
    ("chevrolet", 0.98),
    ("bmw", 1.15),
    ("mercedes", 1.20),
    ("audi", 1.12),
    ("tesla", 1.25),
];

pub const DEFAULT_MAKE_FACTOR: f64 = 1.00;

/// Baseline MSRP by lower-cased make, used when no purchase price is known
pub const BASE_MSRP: [(&str, f64); 8] = [
    ("toyota", 35000.0),
    ("honda", 32000.0),
    ("ford", 38000.0),
    ("chevrolet", 36000.0),
    ("bmw", 55000.0),
    ("mercedes", 60000.0),
    ("audi", 52000.0),
    ("tesla", 50000.0),
];

pub const DEFAULT_MSRP: f64 = 35000.0;

/// Mileage assumed when the caller has none
pub const DEFAULT_MILEAGE: u32 = 50_000;

/// Average miles driven per year
pub const ANNUAL_MILEAGE: i64 = 12_000;

const MILEAGE_SENSITIVITY: f64 = 0.1;
const MILEAGE_FACTOR_MIN: f64 = 0.7;
const MILEAGE_FACTOR_MAX: f64 = 1.3;

/// Half-width of the suggested listing band
const LISTING_BAND: f64 = 0.05;

fn lookup(table: &[(&str, f64)], make: &str) -> Option<f64> {
    let key = make.to_lowercase();
    table
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, value)| *value)
}

/// Make multiplier, 1.00 for makes not in the table
pub fn make_factor(make: &str) -> f64 {
    lookup(&MAKE_FACTORS, make).unwrap_or(DEFAULT_MAKE_FACTOR)
}

/// Baseline MSRP, 35000 for makes not in the table
pub fn base_msrp(make: &str) -> f64 {
    lookup(&BASE_MSRP, make).unwrap_or_else(|| {
        debug!("No baseline MSRP for make {:?}, using default", make);
        DEFAULT_MSRP
    })
}

/// Mileage multiplier relative to `age * 12000` expected miles
///
/// Below-average mileage raises the value, above-average lowers it. A vehicle
/// with no elapsed years has no expectation to compare against and gets 1.0.
pub fn mileage_factor(age: i32, mileage: u32) -> f64 {
    let expected = age as i64 * ANNUAL_MILEAGE;
    let factor = if expected > 0 {
        let difference = (expected - mileage as i64) as f64;
        1.0 + difference / expected as f64 * MILEAGE_SENSITIVITY
    } else {
        1.0
    };
    factor.clamp(MILEAGE_FACTOR_MIN, MILEAGE_FACTOR_MAX)
}

/// Signed percentage label for an adjustment, e.g. `+10.0%`
pub fn format_adjustment(pct: f64) -> String {
    format!("{:+.1}%", pct)
}

fn adjustment_pct(factor: f64) -> f64 {
    round_to((factor - 1.0) * 100.0, 1)
}

// ============================================================================
// CONDITION GRADE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionGrade {
    Excellent,
    #[default]
    Good,
    Fair,
    Poor,
}

impl ConditionGrade {
    pub const ALL: [ConditionGrade; 4] = [
        ConditionGrade::Excellent,
        ConditionGrade::Good,
        ConditionGrade::Fair,
        ConditionGrade::Poor,
    ];

    pub fn multiplier(&self) -> f64 {
        match self {
            ConditionGrade::Excellent => 1.00,
            ConditionGrade::Good => 0.85,
            ConditionGrade::Fair => 0.70,
            ConditionGrade::Poor => 0.50,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionGrade::Excellent => "excellent",
            ConditionGrade::Good => "good",
            ConditionGrade::Fair => "fair",
            ConditionGrade::Poor => "poor",
        }
    }

    /// Case-insensitive parse, `None` for anything outside the four grades
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.to_lowercase();
        Self::ALL.into_iter().find(|grade| grade.as_str() == label)
    }

    /// Lenient parse: unrecognized labels are treated as `Good`
    pub fn from_label(label: &str) -> Self {
        Self::parse(label).unwrap_or_else(|| {
            debug!("Unrecognized condition {:?}, treating as good", label);
            ConditionGrade::Good
        })
    }
}

impl fmt::Display for ConditionGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// Market valuation of one vehicle, produced fresh per call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    /// "<year> <make> <model>"
    pub vehicle_label: String,
    pub base_price: f64,
    pub depreciated_value: f64,
    pub make_adjustment_pct: f64,
    pub condition_adjustment_pct: f64,
    pub mileage_adjustment_pct: f64,
    pub estimated_value: f64,
    pub depreciation_total: f64,
    pub depreciation_percent: f64,
}

/// A valuation ranked by how much of its asking price it retains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleComparison {
    #[serde(flatten)]
    pub valuation: ValuationResult,
    /// estimated_value / base_price × 100
    pub value_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSuggestion {
    pub suggested_min: f64,
    pub suggested_price: f64,
    pub suggested_max: f64,
    /// Condition exactly as the caller supplied it
    pub condition_label: String,
    pub vehicle_age: i32,
}

/// Minimal vehicle description for comparisons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleListing {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub price: f64,
}

// ============================================================================
// PRICE CALCULATOR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceCalculator {
    reference_year: i32,
}

impl PriceCalculator {
    /// Calculator aged against the current calendar year
    pub fn new() -> Self {
        Self::with_reference_year(current_year())
    }

    pub fn with_reference_year(reference_year: i32) -> Self {
        PriceCalculator { reference_year }
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    pub fn depreciation_model(&self, original_price: f64, model_year: i32) -> DepreciationModel {
        DepreciationModel::as_of(original_price, model_year, self.reference_year)
    }

    /// Estimated market value of a vehicle
    ///
    /// Fails only when `base_price` is zero.
    pub fn calculate_market_value(
        &self,
        make: &str,
        model: &str,
        year: i32,
        base_price: f64,
        condition: ConditionGrade,
        mileage: u32,
    ) -> Result<ValuationResult, ValuationError> {
        let depreciation = self.depreciation_model(base_price, year);
        let depreciated_value = depreciation.calculate_current_value();

        let make_factor = make_factor(make);
        let condition_factor = condition.multiplier();
        let mileage_factor = mileage_factor(depreciation.age, mileage);

        let estimated_value =
            depreciated_value * make_factor * condition_factor * mileage_factor;

        Ok(ValuationResult {
            vehicle_label: format!("{} {} {}", year, make, model),
            base_price,
            depreciated_value,
            make_adjustment_pct: adjustment_pct(make_factor),
            condition_adjustment_pct: adjustment_pct(condition_factor),
            mileage_adjustment_pct: adjustment_pct(mileage_factor),
            estimated_value: round_to(estimated_value, 2),
            depreciation_total: depreciation.get_total_depreciation(),
            depreciation_percent: depreciation.get_depreciation_percentage()?,
        })
    }

    /// Rank vehicles by value score, highest first
    ///
    /// Every vehicle is valued in good condition at the default mileage.
    /// Equal scores keep their input order.
    pub fn compare_vehicles(
        &self,
        vehicles: &[VehicleListing],
    ) -> Result<Vec<VehicleComparison>, ValuationError> {
        let mut results = Vec::with_capacity(vehicles.len());

        for vehicle in vehicles {
            let valuation = self.calculate_market_value(
                &vehicle.make,
                &vehicle.model,
                vehicle.year,
                vehicle.price,
                ConditionGrade::Good,
                DEFAULT_MILEAGE,
            )?;
            let value_score = round_to(valuation.estimated_value / vehicle.price * 100.0, 1);
            results.push(VehicleComparison {
                valuation,
                value_score,
            });
        }

        // sort_by is stable, so ties keep input order
        results.sort_by(|a, b| b.value_score.total_cmp(&a.value_score));
        Ok(results)
    }

    /// Listing price band for a make and model year
    ///
    /// Unrecognized conditions are priced as good; the label is echoed as given.
    pub fn get_price_suggestion(&self, make: &str, year: i32, condition: &str) -> PriceSuggestion {
        let msrp = base_msrp(make);
        let grade = ConditionGrade::from_label(condition);

        let depreciation = self.depreciation_model(msrp, year);
        let adjusted_value = depreciation.calculate_current_value() * grade.multiplier();

        PriceSuggestion {
            suggested_min: round_to(adjusted_value * (1.0 - LISTING_BAND), 2),
            suggested_price: round_to(adjusted_value, 2),
            suggested_max: round_to(adjusted_value * (1.0 + LISTING_BAND), 2),
            condition_label: condition.to_string(),
            vehicle_age: depreciation.age,
        }
    }
}

impl Default for PriceCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&crate::vehicles::Vehicle> for VehicleListing {
    fn from(vehicle: &crate::vehicles::Vehicle) -> Self {
        VehicleListing {
            make: vehicle.make.clone(),
            model: vehicle.model.clone(),
            year: vehicle.year,
            price: vehicle.price,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
