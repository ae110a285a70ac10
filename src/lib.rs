// Vehicle Valuation - Core Library
// Exposes all modules for use in the CLI, API server, and tests

pub mod depreciation;
pub mod pricing;
pub mod vehicles;
pub mod analytics;
pub mod db;
pub mod config;

// Re-export commonly used types
pub use depreciation::{
    DepreciationModel, ValuationError,
    rate_for_year, current_year, round_to,
    DEPRECIATION_RATES, LONG_TERM_RATE, RESIDUAL_FLOOR,
};
pub use pricing::{
    PriceCalculator, ConditionGrade,
    ValuationResult, VehicleComparison, PriceSuggestion, VehicleListing,
    make_factor, base_msrp, mileage_factor, format_adjustment,
    DEFAULT_MILEAGE,
};
pub use vehicles::{Vehicle, VehicleManager, FieldError};
pub use analytics::{VehicleAnalytics, AnalyticsSummary, PriceRange};
pub use db::{
    Event, ImportSummary,
    open_database, setup_database, load_csv, insert_vehicles,
    insert_vehicle, update_vehicle, delete_vehicle,
    get_vehicle, get_all_vehicles, get_recent_vehicles, get_vehicles_by_owner,
    verify_count, log_activity, insert_event,
    get_events_for_entity, get_activities_for_actor,
};
pub use config::{AppConfig, init_tracing};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
