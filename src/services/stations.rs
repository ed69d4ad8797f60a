//! Corridor station-search client.
//!
//! Single point of truth for "which stations are geometrically plausible":
//! one request per corridor carrying the reachable waypoint prefix and the
//! driver's station filter. Results come back unordered and unscored; the
//! planner ranks them afterwards.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::helpers::de_opt_f64_lenient;
use crate::services::directions::LatLon;

/// Driver-selected station filter criteria.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StationFilter {
    /// Only stations with free parking
    #[serde(default)]
    pub free_parking: bool,
    /// Only stations without usage restrictions
    #[serde(default)]
    pub no_limit: bool,
    /// Minimum charger output in kW
    #[serde(default)]
    pub output_min_kw: f64,
    /// Maximum charger output in kW (default 350)
    #[serde(default = "default_output_max")]
    pub output_max_kw: f64,
    /// Acceptable connector types; empty means any
    #[serde(default)]
    pub connector_types: Vec<String>,
    /// Operator whitelist; empty means any
    #[serde(default)]
    pub operators: Vec<String>,
}

fn default_output_max() -> f64 {
    350.0
}

impl Default for StationFilter {
    fn default() -> Self {
        Self {
            free_parking: false,
            no_limit: false,
            output_min_kw: 0.0,
            output_max_kw: default_output_max(),
            connector_types: Vec::new(),
            operators: Vec::new(),
        }
    }
}

/// A charging station returned by the corridor search. Ephemeral: lives for
/// one planning run only.
#[derive(Debug, Clone)]
pub struct CandidateStation {
    pub id: String,
    pub name: String,
    pub position: LatLon,
    /// Charger output as reported by the search index, if known
    pub reported_output_kw: Option<f64>,
    /// Whether the station satisfied every filter criterion (as opposed to
    /// being included as a near-miss)
    pub matches_filter: bool,
}

/// Parameters for one corridor search.
#[derive(Debug, Clone, Copy)]
pub struct CorridorSearch<'a> {
    /// Waypoints bounding the search corridor, in route order
    pub waypoints: &'a [LatLon],
    /// Whether the route contains highway segments
    pub has_highway: bool,
    pub origin: LatLon,
    pub dest: LatLon,
    /// Total distance of the leg being searched, in km
    pub route_distance_km: f64,
    pub filter: &'a StationFilter,
}

// --- Corridor search wire types ---

#[derive(Debug, Serialize)]
struct WirePoint {
    lat: f64,
    lng: f64,
}

impl From<LatLon> for WirePoint {
    fn from(p: LatLon) -> Self {
        Self {
            lat: p.lat,
            lng: p.lon,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CorridorQuery<'a> {
    waypoints: Vec<WirePoint>,
    highway: bool,
    origin: WirePoint,
    dest: WirePoint,
    distance: f64,
    free_parking: bool,
    no_limit: bool,
    output_min: f64,
    output_max: f64,
    connector_types: &'a [String],
    operators: &'a [String],
}

#[derive(Debug, Deserialize)]
struct StationHit {
    #[serde(rename = "statId")]
    stat_id: String,
    #[serde(rename = "statNm", default)]
    stat_nm: String,
    lat: f64,
    lng: f64,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    output: Option<f64>,
    #[serde(rename = "matchesFilter", default = "default_true")]
    matches_filter: bool,
}

fn default_true() -> bool {
    true
}

/// Client for the corridor station-search service.
#[derive(Debug, Clone)]
pub struct StationSearchClient {
    client: reqwest::Client,
    base_url: String,
}

impl StationSearchClient {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Find candidate stations near the corridor's waypoints.
    ///
    /// Returns the service's result unmodified: unordered, unscored.
    pub async fn search_near_corridor(
        &self,
        search: &CorridorSearch<'_>,
    ) -> Result<Vec<CandidateStation>, AppError> {
        let query = CorridorQuery {
            waypoints: search.waypoints.iter().copied().map(WirePoint::from).collect(),
            highway: search.has_highway,
            origin: search.origin.into(),
            dest: search.dest.into(),
            distance: search.route_distance_km,
            free_parking: search.filter.free_parking,
            no_limit: search.filter.no_limit,
            output_min: search.filter.output_min_kw,
            output_max: search.filter.output_max_kw,
            connector_types: &search.filter.connector_types,
            operators: &search.filter.operators,
        };

        let url = format!("{}/api/station/getStationsNearWaypoints", self.base_url);

        let response = self.client.post(&url).json(&query).send().await.map_err(|e| {
            AppError::ExternalServiceError(format!("corridor search request failed: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "corridor search returned HTTP {}",
                response.status()
            )));
        }

        let hits: Vec<StationHit> = response.json().await.map_err(|e| {
            AppError::ExternalServiceError(format!("corridor search JSON parse error: {}", e))
        })?;

        Ok(hits
            .into_iter()
            .map(|h| CandidateStation {
                id: h.stat_id,
                name: h.stat_nm,
                position: LatLon {
                    lat: h.lat,
                    lon: h.lng,
                },
                reported_output_kw: h.output,
                matches_filter: h.matches_filter,
            })
            .collect())
    }
}
