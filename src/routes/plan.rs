//! Charging-stop plan HTTP endpoint.
//!
//! - POST /api/v1/plan

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::errors::{AppError, ErrorResponse};
use crate::services::planner::{
    AnnotatedStation, PlanOutcome, PlanRequest, Planner, StopPlan,
};
use crate::services::status::Connector;

/// Shared application state for the plan endpoint.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) planner: Arc<Planner>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Baseline-route summary returned alongside the stop plans.
#[derive(Debug, Serialize, ToSchema)]
pub struct RouteSummary {
    /// Total route distance in km
    pub total_distance_km: f64,
    /// Total driving time in seconds
    pub total_time_s: f64,
    /// Total toll fare in KRW
    pub total_fare: f64,
    /// Highway share of the route in km
    pub highway_km: f64,
    /// City share of the route in km
    pub city_km: f64,
    /// Ambient temperature used by the run (request value or seasonal default)
    pub temperature_c: f64,
    /// Temperature range factor applied to the battery model
    pub temperature_weight: f64,
    /// Blended road-type range factor applied to the battery model
    pub road_weight: f64,
}

/// A charging station within a stop plan.
#[derive(Debug, Serialize, ToSchema)]
pub struct StationResponse {
    /// Provider-issued station id
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Whether the station satisfied every filter criterion
    pub matches_filter: bool,
    /// Total origin→station→destination travel time in seconds
    pub total_time_s: f64,
    /// Added travel time versus the direct route, in seconds. May be
    /// negative when the routing oracle's via route beats the direct route;
    /// null for a second hop
    pub detour_time_s: Option<f64>,
    /// Total fare through this station in KRW
    pub total_fare: f64,
    /// Total distance through this station in metres
    pub total_distance_m: f64,
    /// Currently available connectors; null when live status was unreachable
    pub available_count: Option<u32>,
    /// Total connectors; null when live status was unreachable
    pub total_count: Option<u32>,
    /// Per-connector live state; empty when live status was unreachable
    pub connectors: Vec<Connector>,
    /// Projected battery percentage on arrival
    pub arrival_percent: f64,
    /// Minutes to charge from arrival to the configured limit
    pub charging_time_minutes: i64,
    /// Projected battery percentage after charging
    pub post_charge_percent: f64,
}

impl StationResponse {
    fn from_annotated(station: &AnnotatedStation) -> Self {
        Self {
            id: station.evaluated.station.id.clone(),
            name: station.evaluated.station.name.clone(),
            lat: station.evaluated.station.position.lat,
            lon: station.evaluated.station.position.lon,
            matches_filter: station.evaluated.station.matches_filter,
            total_time_s: station.evaluated.total_time_s,
            detour_time_s: station.evaluated.detour_time_s,
            total_fare: station.evaluated.total_fare,
            total_distance_m: station.evaluated.total_distance_m,
            available_count: station.available_count,
            total_count: station.total_count,
            connectors: station.connectors.clone(),
            arrival_percent: station.arrival_percent,
            charging_time_minutes: station.charging_time_minutes,
            post_charge_percent: station.post_charge_percent,
        }
    }
}

/// One ranked charging-stop plan.
#[derive(Debug, Serialize, ToSchema)]
pub struct StopPlanResponse {
    pub station: StationResponse,
    /// Second charging stop; present only when the first stop alone cannot
    /// bridge the remaining distance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_hop: Option<StationResponse>,
    /// Travel time of the second-hop leg in seconds
    pub second_hop_time_s: Option<f64>,
    /// Charging minutes at the second hop
    pub second_hop_charging_time_minutes: Option<i64>,
    /// Projected battery percentage on arrival at the destination
    pub destination_arrival_percent: f64,
    /// Whether the projection meets the driver's arrival target
    pub meets_arrival_target: bool,
}

impl StopPlanResponse {
    fn from_stop(stop: &StopPlan) -> Self {
        Self {
            station: StationResponse::from_annotated(&stop.first_hop),
            second_hop: stop.second_hop.as_ref().map(StationResponse::from_annotated),
            second_hop_time_s: stop.second_hop_time_s,
            second_hop_charging_time_minutes: stop.second_hop_charging_time_minutes,
            destination_arrival_percent: stop.destination_arrival_percent,
            meets_arrival_target: stop.meets_arrival_target,
        }
    }
}

/// Full plan response.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlanResponse {
    pub route: RouteSummary,
    /// Maximum distance drivable on the current charge, in km
    pub reachable_km: f64,
    /// Ranked stop plans, ascending by first-hop detour time; empty when no
    /// reachable station was found
    pub stops: Vec<StopPlanResponse>,
}

impl PlanResponse {
    fn from_outcome(outcome: &PlanOutcome) -> Self {
        Self {
            route: RouteSummary {
                total_distance_km: outcome.route.total_distance_km(),
                total_time_s: outcome.route.total_time_s,
                total_fare: outcome.route.total_fare,
                highway_km: outcome.route.highway_distance_m / 1000.0,
                city_km: outcome.route.city_distance_m / 1000.0,
                temperature_c: outcome.temperature_c,
                temperature_weight: outcome.temperature_weight,
                road_weight: outcome.road_weight,
            },
            reachable_km: outcome.reachable_km,
            stops: outcome.stops.iter().map(StopPlanResponse::from_stop).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_coordinate(name: &str, lat: f64, lon: f64) -> Result<(), AppError> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(AppError::BadRequest(format!(
            "{} coordinates must be finite numbers",
            name
        )));
    }
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(AppError::BadRequest(format!(
            "{} coordinates out of range",
            name
        )));
    }
    Ok(())
}

fn validate_request(request: &PlanRequest) -> Result<(), AppError> {
    validate_coordinate("origin", request.origin.lat, request.origin.lon)?;
    validate_coordinate("destination", request.destination.lat, request.destination.lon)?;

    let battery = &request.battery;
    // is_finite() first; NaN slips through range comparisons
    for (name, value) in [
        ("level_percent", battery.level_percent),
        ("capacity_kwh", battery.capacity_kwh),
        ("efficiency_km_per_kwh", battery.efficiency_km_per_kwh),
        ("charge_limit_percent", battery.charge_limit_percent),
        ("target_arrival_percent", battery.target_arrival_percent),
    ] {
        if !value.is_finite() {
            return Err(AppError::BadRequest(format!(
                "battery.{} must be a finite number",
                name
            )));
        }
    }
    if let Some(t) = battery.temperature_c {
        if !t.is_finite() {
            return Err(AppError::BadRequest(
                "battery.temperature_c must be a finite number".to_string(),
            ));
        }
    }
    if !(0.0..=100.0).contains(&battery.level_percent) {
        return Err(AppError::BadRequest(
            "battery.level_percent must be between 0 and 100".to_string(),
        ));
    }
    if battery.capacity_kwh <= 0.0 || battery.efficiency_km_per_kwh <= 0.0 {
        return Err(AppError::BadRequest(
            "battery capacity and efficiency must be positive".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&battery.charge_limit_percent)
        || !(0.0..=100.0).contains(&battery.target_arrival_percent)
    {
        return Err(AppError::BadRequest(
            "battery charge limit and arrival target must be between 0 and 100".to_string(),
        ));
    }

    if request.vehicle.city_km_per_kwh <= 0.0 || request.vehicle.highway_km_per_kwh <= 0.0 {
        return Err(AppError::BadRequest(
            "vehicle efficiencies must be positive".to_string(),
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Compute ranked charging-stop plans for a route.
///
/// Runs the full planning pipeline against the routing oracle, the corridor
/// station search, and the live status provider. A request started while a
/// previous one is still in flight supersedes it; the older request fails
/// with 409.
#[utoipa::path(
    post,
    path = "/api/v1/plan",
    tag = "Plan",
    request_body = PlanRequest,
    responses(
        (status = 200, description = "Ranked charging-stop plans", body = PlanResponse),
        (status = 400, description = "Invalid request values", body = ErrorResponse),
        (status = 409, description = "Superseded by a newer plan request", body = ErrorResponse),
        (status = 422, description = "No route between origin and destination", body = ErrorResponse),
        (status = 502, description = "Routing oracle unreachable", body = ErrorResponse),
    )
)]
pub async fn create_plan(
    State(state): State<AppState>,
    Json(request): Json<PlanRequest>,
) -> Result<Json<PlanResponse>, AppError> {
    validate_request(&request)?;

    let ticket = state.planner.begin();
    let outcome = state.planner.plan(&request, ticket).await?;

    Ok(Json(PlanResponse::from_outcome(&outcome)))
}
