// 🚗 Vehicles - Record value object and in-memory collection
// A Vehicle is what the store persists and what the calculator prices.

use crate::depreciation::current_year;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const MIN_MODEL_YEAR: i32 = 1900;
pub const MAX_MODEL_YEAR: i32 = 2030;
pub const MAX_NAME_LEN: usize = 100;

// ============================================================================
// VEHICLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Stable identity (UUID)
    #[serde(default = "default_uuid")]
    pub id: String,

    pub make: String,
    pub model: String,
    pub year: i32,
    pub price: f64,

    #[serde(default)]
    pub description: String,

    /// Listing owner; vehicles imported in bulk may have none
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Vehicle {
    pub fn new(make: &str, model: &str, year: i32, price: f64, description: &str) -> Self {
        Vehicle {
            id: default_uuid(),
            make: make.to_string(),
            model: model.to_string(),
            year,
            price,
            description: description.to_string(),
            owner: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    /// Age in whole years against the current calendar year
    pub fn age(&self) -> i32 {
        self.age_as_of(current_year())
    }

    pub fn age_as_of(&self, reference_year: i32) -> i32 {
        reference_year - self.year
    }

    /// "<year> <make> <model>"
    pub fn label(&self) -> String {
        format!("{} {} {}", self.year, self.make, self.model)
    }

    /// Content hash used to skip rows already imported
    /// Identity = id (UUID), duplicate detection = hash
    pub fn import_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}|{}",
            self.make.to_lowercase(),
            self.model.to_lowercase(),
            self.year,
            self.price,
            self.description,
            self.owner.as_deref().unwrap_or_default()
        ));
        format!("{:x}", hasher.finalize())
    }

    /// Field rules applied before a record is stored
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        for (field, value) in [("make", &self.make), ("model", &self.model)] {
            if value.trim().is_empty() {
                errors.push(FieldError::new(field, "Required field is empty"));
            } else if value.chars().count() > MAX_NAME_LEN {
                errors.push(FieldError::new(
                    field,
                    &format!("Must be at most {} characters", MAX_NAME_LEN),
                ));
            }
        }

        if !(MIN_MODEL_YEAR..=MAX_MODEL_YEAR).contains(&self.year) {
            errors.push(FieldError::new(
                "year",
                &format!("Must be between {} and {}", MIN_MODEL_YEAR, MAX_MODEL_YEAR),
            ));
        }

        if !self.price.is_finite() || self.price < 0.0 {
            errors.push(FieldError::new("price", "Must be a non-negative number"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: &str) -> Self {
        FieldError {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for FieldError {}

// ============================================================================
// VEHICLE MANAGER
// ============================================================================

/// Ordered collection of vehicles addressed by position
#[derive(Debug, Clone, Default)]
pub struct VehicleManager {
    vehicles: Vec<Vehicle>,
}

impl VehicleManager {
    pub fn new() -> Self {
        VehicleManager {
            vehicles: Vec::new(),
        }
    }

    pub fn from_vehicles(vehicles: Vec<Vehicle>) -> Self {
        VehicleManager { vehicles }
    }

    /// Append a vehicle, returning its index
    pub fn add_vehicle(&mut self, vehicle: Vehicle) -> usize {
        self.vehicles.push(vehicle);
        self.vehicles.len() - 1
    }

    pub fn remove_vehicle(&mut self, index: usize) -> Option<Vehicle> {
        if index < self.vehicles.len() {
            Some(self.vehicles.remove(index))
        } else {
            None
        }
    }

    pub fn get_vehicle(&self, index: usize) -> Option<&Vehicle> {
        self.vehicles.get(index)
    }

    pub fn get_all_vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    /// Case-insensitive make match
    pub fn filter_by_make(&self, make: &str) -> Vec<&Vehicle> {
        let make = make.to_lowercase();
        self.vehicles
            .iter()
            .filter(|v| v.make.to_lowercase() == make)
            .collect()
    }

    /// Inclusive on both ends
    pub fn filter_by_year_range(&self, min_year: i32, max_year: i32) -> Vec<&Vehicle> {
        self.vehicles
            .iter()
            .filter(|v| min_year <= v.year && v.year <= max_year)
            .collect()
    }

    /// Inclusive on both ends
    pub fn filter_by_price_range(&self, min_price: f64, max_price: f64) -> Vec<&Vehicle> {
        self.vehicles
            .iter()
            .filter(|v| min_price <= v.price && v.price <= max_price)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
