// 📊 Vehicle Analytics - Aggregates over a list of vehicles
// Averages, extremes and groupings used by the dashboard and analytics views.

use crate::depreciation::{current_year, round_to};
use crate::vehicles::Vehicle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_vehicles: usize,
    pub average_price: f64,
    pub price_range: PriceRange,
    pub average_age: f64,
    pub by_make: BTreeMap<String, usize>,
    pub by_year: BTreeMap<i32, usize>,
}

pub struct VehicleAnalytics {
    vehicles: Vec<Vehicle>,
    reference_year: i32,
}

impl VehicleAnalytics {
    pub fn new(vehicles: Vec<Vehicle>) -> Self {
        Self::with_reference_year(vehicles, current_year())
    }

    pub fn with_reference_year(vehicles: Vec<Vehicle>, reference_year: i32) -> Self {
        VehicleAnalytics {
            vehicles,
            reference_year,
        }
    }

    /// Replace the vehicles under analysis
    pub fn set_vehicles(&mut self, vehicles: Vec<Vehicle>) {
        self.vehicles = vehicles;
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    /// Mean price rounded to cents, 0 when empty
    pub fn average_price(&self) -> f64 {
        if self.vehicles.is_empty() {
            return 0.0;
        }
        let total: f64 = self.vehicles.iter().map(|v| v.price).sum();
        round_to(total / self.vehicles.len() as f64, 2)
    }

    pub fn price_range(&self) -> PriceRange {
        let mut prices = self.vehicles.iter().map(|v| v.price);
        let Some(first) = prices.next() else {
            return PriceRange::default();
        };

        prices.fold(PriceRange { min: first, max: first }, |range, price| PriceRange {
            min: range.min.min(price),
            max: range.max.max(price),
        })
    }

    pub fn vehicles_by_year(&self) -> BTreeMap<i32, usize> {
        let mut counts = BTreeMap::new();
        for vehicle in &self.vehicles {
            *counts.entry(vehicle.year).or_insert(0) += 1;
        }
        counts
    }

    /// Counts keyed by make exactly as recorded
    pub fn vehicles_by_make(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for vehicle in &self.vehicles {
            *counts.entry(vehicle.make.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Mean age in years (1 decimal), 0 when empty
    pub fn average_age(&self) -> f64 {
        if self.vehicles.is_empty() {
            return 0.0;
        }
        let total: i64 = self
            .vehicles
            .iter()
            .map(|v| v.age_as_of(self.reference_year) as i64)
            .sum();
        round_to(total as f64 / self.vehicles.len() as f64, 1)
    }

    pub fn summary(&self) -> AnalyticsSummary {
        AnalyticsSummary {
            total_vehicles: self.vehicles.len(),
            average_price: self.average_price(),
            price_range: self.price_range(),
            average_age: self.average_age(),
            by_make: self.vehicles_by_make(),
            by_year: self.vehicles_by_year(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VehicleAnalytics {
        VehicleAnalytics::with_reference_year(
            vec![
                Vehicle::new("Toyota", "Corolla", 2018, 14500.0, ""),
                Vehicle::new("Ford", "F-150", 2021, 38900.0, ""),
                Vehicle::new("Toyota", "RAV4", 2022, 29900.0, ""),
                Vehicle::new("BMW", "330i", 2018, 12000.0, ""),
            ],
            2024,
        )
    }

    #[test]
    fn test_empty_analytics() {
        let analytics = VehicleAnalytics::with_reference_year(Vec::new(), 2024);
        let summary = analytics.summary();

        assert_eq!(summary.total_vehicles, 0);
        assert_eq!(summary.average_price, 0.0);
        assert_eq!(summary.price_range, PriceRange { min: 0.0, max: 0.0 });
        assert_eq!(summary.average_age, 0.0);
        assert!(summary.by_make.is_empty());
        assert!(summary.by_year.is_empty());
    }

    #[test]
    fn test_average_price_and_range() {
        let analytics = sample();
        // (14500 + 38900 + 29900 + 12000) / 4
        assert_eq!(analytics.average_price(), 23825.0);
        assert_eq!(analytics.price_range(), PriceRange { min: 12000.0, max: 38900.0 });
    }

    #[test]
    fn test_average_age() {
        // ages 6, 3, 2, 6
        assert_eq!(sample().average_age(), 4.3);
    }

    #[test]
    fn test_groupings_are_sorted() {
        let analytics = sample();

        let by_year: Vec<(i32, usize)> = analytics.vehicles_by_year().into_iter().collect();
        assert_eq!(by_year, vec![(2018, 2), (2021, 1), (2022, 1)]);

        let by_make: Vec<(String, usize)> = analytics.vehicles_by_make().into_iter().collect();
        assert_eq!(
            by_make,
            vec![
                ("BMW".to_string(), 1),
                ("Ford".to_string(), 1),
                ("Toyota".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_set_vehicles_replaces_data() {
        let mut analytics = sample();
        analytics.set_vehicles(vec![Vehicle::new("Tesla", "Model 3", 2024, 41000.0, "")]);

        let summary = analytics.summary();
        assert_eq!(summary.total_vehicles, 1);
        assert_eq!(summary.average_age, 0.0);
        assert_eq!(summary.price_range, PriceRange { min: 41000.0, max: 41000.0 });
    }

    #[test]
    fn test_summary_json() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["total_vehicles"], 4);
        assert_eq!(value["by_make"]["Toyota"], 2);
        assert_eq!(value["by_year"]["2018"], 2);
        assert_eq!(value["price_range"]["max"], 38900.0);
    }
}
