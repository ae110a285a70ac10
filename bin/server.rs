// Vehicle Valuation - Web Server
// JSON REST API over the vehicle store and the valuation engine

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use vehicle_valuation::{
    delete_vehicle, get_activities_for_actor, get_all_vehicles, get_recent_vehicles, get_vehicle,
    get_vehicles_by_owner, init_tracing, insert_vehicle, open_database, update_vehicle,
    AnalyticsSummary, AppConfig, ConditionGrade, Event, FieldError, PriceCalculator,
    PriceSuggestion, ValuationError, ValuationResult, Vehicle, VehicleAnalytics,
    VehicleComparison, VehicleListing, DEFAULT_MILEAGE,
};

/// Listings shown on the landing page
const RECENT_LIMIT: usize = 6;
const DEFAULT_ACTIVITY_LIMIT: usize = 10;
/// Actor recorded when a request names no owner
const ANONYMOUS_ACTOR: &str = "api";

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    calculator: PriceCalculator,
}

impl AppState {
    fn db(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db.lock().map_err(|_| ApiError::LockPoisoned)
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
enum ApiError {
    #[error("Invalid vehicle: {}", join_errors(.0))]
    Validation(Vec<FieldError>),

    #[error("Vehicle not found: {0}")]
    NotFound(String),

    #[error("Vehicle {0} belongs to another owner")]
    Forbidden(String),

    #[error(transparent)]
    Valuation(#[from] ValuationError),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) | ApiError::Valuation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::LockPoisoned | ApiError::Store(_) => {
                error!("Request failed: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(ApiResponse::<()>::err(self.to_string()))).into_response()
    }
}

// ============================================================================
// Request / Response types
// ============================================================================

/// Body for creating or editing a vehicle
#[derive(Debug, Deserialize)]
struct VehicleInput {
    make: String,
    model: String,
    year: i32,
    price: f64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    owner: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VehicleFilters {
    owner: Option<String>,
    make: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OwnerQuery {
    owner: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SuggestionQuery {
    make: String,
    year: i32,
    condition: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValuationRequest {
    make: String,
    model: String,
    year: i32,
    price: f64,
    condition: Option<String>,
    mileage: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ActivityQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct VehicleDetail {
    vehicle: Vehicle,
    price_suggestion: PriceSuggestion,
}

fn actor_name(owner: &Option<String>) -> &str {
    owner.as_deref().unwrap_or(ANONYMOUS_ACTOR)
}

/// A request that names an owner may only touch that owner's vehicles
fn check_owner(vehicle: &Vehicle, requested: &Option<String>) -> Result<(), ApiError> {
    match requested {
        Some(owner) if vehicle.owner.as_ref() != Some(owner) => {
            Err(ApiError::Forbidden(vehicle.id.clone()))
        }
        _ => Ok(()),
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/vehicles - All vehicles, optionally by owner and make
async fn list_vehicles(
    State(state): State<AppState>,
    Query(filters): Query<VehicleFilters>,
) -> ApiResult<Vec<Vehicle>> {
    let conn = state.db()?;

    let mut vehicles = match &filters.owner {
        Some(owner) => get_vehicles_by_owner(&conn, owner)?,
        None => get_all_vehicles(&conn)?,
    };
    if let Some(make) = &filters.make {
        vehicles.retain(|v| v.make.eq_ignore_ascii_case(make));
    }

    Ok(Json(ApiResponse::ok(vehicles)))
}

/// GET /api/vehicles/recent - Newest listings
async fn recent_vehicles(State(state): State<AppState>) -> ApiResult<Vec<Vehicle>> {
    let conn = state.db()?;
    Ok(Json(ApiResponse::ok(get_recent_vehicles(&conn, RECENT_LIMIT)?)))
}

/// POST /api/vehicles - Create a vehicle
async fn create_vehicle(
    State(state): State<AppState>,
    Json(input): Json<VehicleInput>,
) -> Result<(StatusCode, Json<ApiResponse<Vehicle>>), ApiError> {
    let mut vehicle = Vehicle::new(
        &input.make,
        &input.model,
        input.year,
        input.price,
        &input.description,
    );
    vehicle.owner = input.owner;
    vehicle.validate().map_err(ApiError::Validation)?;

    let conn = state.db()?;
    insert_vehicle(&conn, &vehicle, actor_name(&vehicle.owner))?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(vehicle))))
}

/// GET /api/vehicles/:id - One vehicle with its listing price suggestion
async fn vehicle_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<VehicleDetail> {
    let conn = state.db()?;
    let vehicle = get_vehicle(&conn, &id)?.ok_or(ApiError::NotFound(id))?;

    let price_suggestion = state.calculator.get_price_suggestion(
        &vehicle.make,
        vehicle.year,
        ConditionGrade::Good.as_str(),
    );

    Ok(Json(ApiResponse::ok(VehicleDetail {
        vehicle,
        price_suggestion,
    })))
}

/// PUT /api/vehicles/:id - Edit a vehicle
async fn edit_vehicle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<VehicleInput>,
) -> ApiResult<Vehicle> {
    let conn = state.db()?;
    let mut vehicle = get_vehicle(&conn, &id)?.ok_or(ApiError::NotFound(id))?;
    check_owner(&vehicle, &input.owner)?;

    vehicle.make = input.make;
    vehicle.model = input.model;
    vehicle.year = input.year;
    vehicle.price = input.price;
    vehicle.description = input.description;
    vehicle.validate().map_err(ApiError::Validation)?;

    if !update_vehicle(&conn, &vehicle, actor_name(&input.owner))? {
        return Err(ApiError::NotFound(vehicle.id));
    }

    Ok(Json(ApiResponse::ok(vehicle)))
}

/// DELETE /api/vehicles/:id - Remove a vehicle
async fn remove_vehicle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<Vehicle> {
    let conn = state.db()?;
    let vehicle = get_vehicle(&conn, &id)?.ok_or_else(|| ApiError::NotFound(id.clone()))?;
    check_owner(&vehicle, &query.owner)?;

    let deleted = delete_vehicle(&conn, &id, actor_name(&query.owner))?
        .ok_or(ApiError::NotFound(id))?;

    Ok(Json(ApiResponse::ok(deleted)))
}

/// GET /api/analytics - Summary over all vehicles or one owner's
async fn analytics(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<AnalyticsSummary> {
    let conn = state.db()?;
    let vehicles = match &query.owner {
        Some(owner) => get_vehicles_by_owner(&conn, owner)?,
        None => get_all_vehicles(&conn)?,
    };

    let summary =
        VehicleAnalytics::with_reference_year(vehicles, state.calculator.reference_year())
            .summary();

    Ok(Json(ApiResponse::ok(summary)))
}

/// POST /api/valuations - Market value of one vehicle
async fn value_vehicle(
    State(state): State<AppState>,
    Json(request): Json<ValuationRequest>,
) -> ApiResult<ValuationResult> {
    let condition = request
        .condition
        .as_deref()
        .map(ConditionGrade::from_label)
        .unwrap_or_default();

    let result = state.calculator.calculate_market_value(
        &request.make,
        &request.model,
        request.year,
        request.price,
        condition,
        request.mileage.unwrap_or(DEFAULT_MILEAGE),
    )?;

    Ok(Json(ApiResponse::ok(result)))
}

/// POST /api/valuations/compare - Rank vehicles by retained value
async fn compare(
    State(state): State<AppState>,
    Json(listings): Json<Vec<VehicleListing>>,
) -> ApiResult<Vec<VehicleComparison>> {
    Ok(Json(ApiResponse::ok(
        state.calculator.compare_vehicles(&listings)?,
    )))
}

/// GET /api/suggestions - Listing price band from make and year
async fn suggestion(
    State(state): State<AppState>,
    Query(query): Query<SuggestionQuery>,
) -> ApiResult<PriceSuggestion> {
    let condition = query
        .condition
        .unwrap_or_else(|| ConditionGrade::Good.as_str().to_string());

    Ok(Json(ApiResponse::ok(state.calculator.get_price_suggestion(
        &query.make,
        query.year,
        &condition,
    ))))
}

/// GET /api/activity/:actor - Most recent activity of one actor
async fn activity(
    State(state): State<AppState>,
    Path(actor): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Vec<Event>> {
    let conn = state.db()?;
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT);
    Ok(Json(ApiResponse::ok(get_activities_for_actor(
        &conn, &actor, limit,
    )?)))
}

// ============================================================================
// Router
// ============================================================================

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/vehicles", get(list_vehicles).post(create_vehicle))
        .route("/vehicles/recent", get(recent_vehicles))
        .route(
            "/vehicles/:id",
            get(vehicle_detail).put(edit_vehicle).delete(remove_vehicle),
        )
        .route("/analytics", get(analytics))
        .route("/valuations", post(value_vehicle))
        .route("/valuations/compare", post(compare))
        .route("/suggestions", get(suggestion))
        .route("/activity/:actor", get(activity))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_level);

    info!("🌐 Vehicle Valuation - Web Server");

    let conn = open_database(&config.database_path)?;
    info!("✓ Database opened: {:?}", config.database_path);

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        calculator: PriceCalculator::new(),
    };

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🚀 Server running on http://{}", addr);
    info!("   API: http://{}/api/vehicles", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let conn = Connection::open_in_memory().unwrap();
        vehicle_valuation::setup_database(&conn).unwrap();

        build_router(AppState {
            db: Arc::new(Mutex::new(conn)),
            calculator: PriceCalculator::with_reference_year(2024),
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, value)
    }

    fn corolla() -> Value {
        json!({
            "make": "Toyota",
            "model": "Corolla",
            "year": 2021,
            "price": 18500.0,
            "description": "Single owner",
            "owner": "dana"
        })
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/api/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_vehicle_lifecycle() {
        let app = test_app();

        let (status, created) = send(&app, "POST", "/api/vehicles", Some(corolla())).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let (status, detail) = send(&app, "GET", &format!("/api/vehicles/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["data"]["vehicle"]["model"], "Corolla");
        // toyota MSRP 35000 at age 3 is 20944, then good condition × 0.85
        assert_eq!(detail["data"]["price_suggestion"]["suggested_price"], 17802.4);
        assert_eq!(detail["data"]["price_suggestion"]["vehicle_age"], 3);

        let mut edited = corolla();
        edited["price"] = json!(17250.0);
        let (status, updated) =
            send(&app, "PUT", &format!("/api/vehicles/{}", id), Some(edited)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["data"]["price"], 17250.0);

        let (status, _) = send(&app, "DELETE", &format!("/api/vehicles/{}?owner=dana", id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, missing) = send(&app, "GET", &format!("/api/vehicles/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(missing["success"], false);

        let (_, activity) = send(&app, "GET", "/api/activity/dana", None).await;
        let kinds: Vec<&str> = activity["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["event_type"].as_str().unwrap())
            .collect();
        assert_eq!(kinds.len(), 3);
        assert!(kinds.contains(&"ADD_VEHICLE"));
        assert!(kinds.contains(&"EDIT_VEHICLE"));
        assert!(kinds.contains(&"DELETE_VEHICLE"));
    }

    #[tokio::test]
    async fn test_invalid_vehicle_is_rejected() {
        let app = test_app();
        let mut bad = corolla();
        bad["year"] = json!(1800);
        bad["make"] = json!("");

        let (status, body) = send(&app, "POST", "/api/vehicles", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("make"));
        assert!(message.contains("year"));
    }

    #[tokio::test]
    async fn test_owner_mismatch_is_forbidden() {
        let app = test_app();
        let (_, created) = send(&app, "POST", "/api/vehicles", Some(corolla())).await;
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let mut intruder = corolla();
        intruder["owner"] = json!("mallory");
        let (status, _) =
            send(&app, "PUT", &format!("/api/vehicles/{}", id), Some(intruder)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) =
            send(&app, "DELETE", &format!("/api/vehicles/{}?owner=mallory", id), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, listed) = send(&app, "GET", "/api/vehicles", None).await;
        assert_eq!(listed["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_listing_filters_and_analytics() {
        let app = test_app();
        send(&app, "POST", "/api/vehicles", Some(corolla())).await;
        send(
            &app,
            "POST",
            "/api/vehicles",
            Some(json!({"make": "Ford", "model": "Focus", "year": 2018, "price": 9500.0, "owner": "lee"})),
        )
        .await;

        let (_, mine) = send(&app, "GET", "/api/vehicles?owner=lee", None).await;
        assert_eq!(mine["data"].as_array().unwrap().len(), 1);

        let (_, fords) = send(&app, "GET", "/api/vehicles?make=ford", None).await;
        assert_eq!(fords["data"][0]["model"], "Focus");

        let (_, recent) = send(&app, "GET", "/api/vehicles/recent", None).await;
        assert_eq!(recent["data"].as_array().unwrap().len(), 2);

        let (status, summary) = send(&app, "GET", "/api/analytics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["data"]["total_vehicles"], 2);
        assert_eq!(summary["data"]["average_price"], 14000.0);
        // ages 3 and 6
        assert_eq!(summary["data"]["average_age"], 4.5);

        let (_, dana) = send(&app, "GET", "/api/analytics?owner=dana", None).await;
        assert_eq!(dana["data"]["total_vehicles"], 1);
    }

    #[tokio::test]
    async fn test_suggestion_endpoint() {
        let app = test_app();
        let (status, body) = send(
            &app,
            "GET",
            "/api/suggestions?make=toyota&year=2023&condition=good",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["suggested_min"], 22610.0);
        assert_eq!(body["data"]["suggested_price"], 23800.0);
        assert_eq!(body["data"]["suggested_max"], 24990.0);
        assert_eq!(body["data"]["vehicle_age"], 1);

        let (_, fallback) = send(&app, "GET", "/api/suggestions?make=zz&year=2023", None).await;
        assert_eq!(fallback["data"]["suggested_price"], 23800.0);
        assert_eq!(fallback["data"]["condition_label"], "good");
    }

    #[tokio::test]
    async fn test_valuation_endpoints() {
        let app = test_app();

        let (status, body) = send(
            &app,
            "POST",
            "/api/valuations",
            Some(json!({"make": "Toyota", "model": "Camry", "year": 2021, "price": 30000.0, "mileage": 36000})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["estimated_value"], 16785.12);
        assert_eq!(body["data"]["make_adjustment_pct"], 10.0);

        let (status, body) = send(
            &app,
            "POST",
            "/api/valuations",
            Some(json!({"make": "Ford", "model": "Focus", "year": 2020, "price": 0.0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, ranked) = send(
            &app,
            "POST",
            "/api/valuations/compare",
            Some(json!([
                {"make": "ford", "model": "Focus", "year": 2021, "price": 30000.0},
                {"make": "tesla", "model": "Model 3", "year": 2021, "price": 30000.0}
            ])),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ranked["data"][0]["vehicle_label"], "2021 tesla Model 3");
        assert!(ranked["data"][0]["value_score"].as_f64() > ranked["data"][1]["value_score"].as_f64());
    }
}
