//! Routing oracle client (Tmap-compatible directions API).
//!
//! Used twice per planning run: once for the baseline origin→destination
//! route (full geometry plus totals) and once per candidate station for the
//! 3-point origin→station→destination metrics that drive detour ranking.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LatLon {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
}

/// Road classification of a route segment, from the oracle's `roadType` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoadType {
    Highway,
    City,
}

/// Congestion annotation covering a span of vertex indices in a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)] // Carried with the geometry; read by the UI layer, not by ranking
pub struct TrafficSpan {
    pub start_index: usize,
    pub end_index: usize,
    /// Oracle congestion index (0 = unknown, 4 = heavy)
    pub congestion: u8,
}

/// One polyline piece of a route, tagged with its road type.
#[derive(Debug, Clone)]
pub struct RouteSegment {
    pub points: Vec<LatLon>,
    pub road_type: RoadType,
    pub distance_m: f64,
    /// Per-span traffic indices; empty when the oracle reports none.
    pub traffic: Vec<TrafficSpan>,
}

/// A parsed baseline route: ordered segments plus route-level totals and the
/// highway/city distance split used for the road-weight blend. Immutable
/// once parsed.
#[derive(Debug, Clone)]
pub struct DrivingRoute {
    pub segments: Vec<RouteSegment>,
    pub total_distance_m: f64,
    pub total_time_s: f64,
    pub total_fare: f64,
    pub highway_distance_m: f64,
    pub city_distance_m: f64,
}

impl DrivingRoute {
    pub fn total_distance_km(&self) -> f64 {
        self.total_distance_m / 1000.0
    }

    pub fn has_highway(&self) -> bool {
        self.highway_distance_m > 0.0
    }
}

/// Totals of a 3-point via route, used for detour evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ViaMetrics {
    pub total_time_s: f64,
    pub total_fare: f64,
    pub total_distance_m: f64,
}

/// Route search strategy, mapped to the oracle's numeric `searchOption`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RouteOption {
    #[default]
    Recommended,
    FreeRoadFirst,
    Fastest,
    HighwayFirst,
    Shortest,
}

impl RouteOption {
    /// Wire code understood by the directions API.
    pub fn code(self) -> &'static str {
        match self {
            RouteOption::Recommended => "0",
            RouteOption::FreeRoadFirst => "1",
            RouteOption::Fastest => "2",
            RouteOption::HighwayFirst => "4",
            RouteOption::Shortest => "10",
        }
    }
}

// --- Directions API wire types ---

#[derive(Debug, Deserialize)]
struct RouteResponse {
    #[serde(default)]
    features: Vec<RouteFeature>,
}

#[derive(Debug, Deserialize)]
struct RouteFeature {
    geometry: RawGeometry,
    #[serde(default)]
    properties: RawProperties,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    /// Polymorphic: `[x, y]` for Point features, `[[x, y], ...]` for
    /// LineString features. Decoded per-kind in the parser.
    #[serde(default)]
    coordinates: serde_json::Value,
    #[serde(default)]
    traffic: Option<Vec<(usize, usize, u8)>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProperties {
    #[serde(default)]
    distance: Option<f64>,
    #[serde(rename = "roadType", default)]
    road_type: Option<i64>,
    #[serde(rename = "totalDistance", default)]
    total_distance: Option<f64>,
    #[serde(rename = "totalTime", default)]
    total_time: Option<f64>,
    #[serde(rename = "totalFare", default)]
    total_fare: Option<f64>,
}

/// Client for the directions API.
#[derive(Debug, Clone)]
pub struct DirectionsClient {
    client: reqwest::Client,
    base_url: String,
    app_key: String,
}

impl DirectionsClient {
    pub fn new(base_url: &str, app_key: &str, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_key: app_key.to_string(),
        }
    }

    /// Fetch the baseline origin→destination route with full geometry.
    pub async fn fetch_route(
        &self,
        origin: LatLon,
        dest: LatLon,
        option: RouteOption,
    ) -> Result<DrivingRoute, AppError> {
        let body = serde_json::json!({
            "startX": origin.lon,
            "startY": origin.lat,
            "endX": dest.lon,
            "endY": dest.lat,
            "reqCoordType": "WGS84GEO",
            "resCoordType": "WGS84GEO",
            "searchOption": option.code(),
            "trafficInfo": "Y",
        });

        let response = self.post_routes(&body).await?;
        parse_driving_route(response)
    }

    /// Fetch totals for the 3-point route `start → via → end`.
    ///
    /// Only the route-level totals are extracted; geometry is ignored.
    pub async fn fetch_via_metrics(
        &self,
        start: LatLon,
        via: LatLon,
        end: LatLon,
    ) -> Result<ViaMetrics, AppError> {
        let body = serde_json::json!({
            "startX": start.lon,
            "startY": start.lat,
            "endX": end.lon,
            "endY": end.lat,
            "passList": format!("{},{}", via.lon, via.lat),
            "reqCoordType": "WGS84GEO",
            "resCoordType": "WGS84GEO",
            "searchOption": RouteOption::Recommended.code(),
        });

        let response = self.post_routes(&body).await?;
        extract_via_metrics(response)
    }

    async fn post_routes(&self, body: &serde_json::Value) -> Result<RouteResponse, AppError> {
        let url = format!("{}/routes?version=1&format=json", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("appKey", &self.app_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalServiceError(format!("directions request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "directions API returned HTTP {}",
                response.status()
            )));
        }

        response.json().await.map_err(|e| {
            AppError::ExternalServiceError(format!("directions JSON parse error: {}", e))
        })
    }
}

/// Parse a directions response into a [`DrivingRoute`].
///
/// Pure function (no I/O). LineString features become segments; route-level
/// totals are read from the first feature that carries them. An empty or
/// line-less response is a geometry error, not an external-service error.
fn parse_driving_route(response: RouteResponse) -> Result<DrivingRoute, AppError> {
    let totals = response
        .features
        .iter()
        .find(|f| f.properties.total_distance.is_some() && f.properties.total_time.is_some())
        .map(|f| {
            (
                f.properties.total_distance.unwrap_or(0.0),
                f.properties.total_time.unwrap_or(0.0),
                f.properties.total_fare.unwrap_or(0.0),
            )
        })
        .ok_or_else(|| AppError::NoRoute("no route found between origin and destination".into()))?;

    let mut segments = Vec::new();
    let mut highway_distance_m = 0.0;
    let mut city_distance_m = 0.0;

    for feature in &response.features {
        if feature.geometry.kind != "LineString" {
            continue;
        }

        let coords: Vec<[f64; 2]> = serde_json::from_value(feature.geometry.coordinates.clone())
            .map_err(|e| {
                AppError::ExternalServiceError(format!("malformed LineString coordinates: {}", e))
            })?;

        // Coordinates arrive as [lon, lat] pairs
        let points: Vec<LatLon> = coords
            .iter()
            .map(|c| LatLon { lat: c[1], lon: c[0] })
            .collect();

        let traffic = feature
            .geometry
            .traffic
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .map(|&(start_index, end_index, congestion)| TrafficSpan {
                start_index,
                end_index,
                congestion,
            })
            .collect();

        let segment = RouteSegment {
            points,
            road_type: match feature.properties.road_type {
                Some(0) => RoadType::Highway,
                _ => RoadType::City,
            },
            distance_m: feature.properties.distance.unwrap_or(0.0),
            traffic,
        };
        match segment.road_type {
            RoadType::Highway => highway_distance_m += segment.distance_m,
            RoadType::City => city_distance_m += segment.distance_m,
        }
        segments.push(segment);
    }

    if segments.is_empty() {
        return Err(AppError::NoRoute(
            "route geometry contains no line segments".into(),
        ));
    }

    Ok(DrivingRoute {
        segments,
        total_distance_m: totals.0,
        total_time_s: totals.1,
        total_fare: totals.2,
        highway_distance_m,
        city_distance_m,
    })
}

/// Extract via-route totals from a directions response.
fn extract_via_metrics(response: RouteResponse) -> Result<ViaMetrics, AppError> {
    response
        .features
        .iter()
        .find(|f| f.properties.total_time.is_some())
        .map(|f| ViaMetrics {
            total_time_s: f.properties.total_time.unwrap_or(0.0),
            total_fare: f.properties.total_fare.unwrap_or(0.0),
            total_distance_m: f.properties.total_distance.unwrap_or(0.0),
        })
        .ok_or_else(|| {
            AppError::ExternalServiceError("via route response carries no totals".into())
        })
}
