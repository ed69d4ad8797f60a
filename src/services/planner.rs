//! Route energy & charging-stop planner.
//!
//! One planning run per user request: baseline route → waypoint sampling →
//! reachable corridor → candidate search → detour evaluation → ranking →
//! availability annotation → hop chaining. Stages fan out to bounded
//! concurrent tasks and fan back in before the next stage; a generation
//! counter guards against stale in-flight runs committing results after a
//! newer request has started.
//!
//! Failure policy: the baseline route is the only call whose failure aborts
//! the run. A corridor-search failure yields an empty (but valid) plan list;
//! per-candidate detour and status failures degrade only that candidate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Datelike, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::helpers::{haversine_distance_m, round_1dp};
use crate::services::directions::{DirectionsClient, DrivingRoute, LatLon, RouteOption};
use crate::services::energy::{
    self, BatteryProfile, VehicleEnergyProfile,
};
use crate::services::sampler::{sample_waypoints, Waypoint, WAYPOINT_INTERVAL_M};
use crate::services::stations::{
    CandidateStation, CorridorSearch, StationFilter, StationSearchClient,
};
use crate::services::status::{count_available, ChargerStatusClient, Connector};

/// How many ranked stations proceed to availability annotation and hop
/// chaining.
pub const TOP_STATION_COUNT: usize = 5;

/// Concurrent via-route requests during detour evaluation.
const DETOUR_CONCURRENCY: usize = 8;

/// Concurrent status requests during availability annotation.
const STATUS_CONCURRENCY: usize = 5;

/// Charging speed assumed when no connector reports an output.
const DEFAULT_CHARGER_OUTPUT_KW: f64 = 50.0;

/// One planning request, as accepted by the public API.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PlanRequest {
    pub origin: LatLon,
    pub destination: LatLon,
    pub battery: BatteryProfile,
    #[serde(default)]
    pub vehicle: VehicleEnergyProfile,
    #[serde(default)]
    pub filter: StationFilter,
    #[serde(default)]
    pub route_option: RouteOption,
}

/// A candidate scored against the baseline route.
#[derive(Debug, Clone)]
pub struct EvaluatedStation {
    pub station: CandidateStation,
    /// Total origin→station→destination travel time
    pub total_time_s: f64,
    pub total_fare: f64,
    /// Total origin→station→destination distance
    pub total_distance_m: f64,
    /// `total_time_s − baseline time`. Can be negative when the oracle's via
    /// route beats the direct route; the raw value is preserved for display
    /// and only clamped inside the ranking key. `None` for a second hop,
    /// which has no baseline to compare against.
    pub detour_time_s: Option<f64>,
}

/// An evaluated station with live availability and battery projections.
#[derive(Debug, Clone)]
pub struct AnnotatedStation {
    pub evaluated: EvaluatedStation,
    /// Connectors currently available; `None` when the status call failed
    pub available_count: Option<u32>,
    /// Total connectors; `None` when the status call failed
    pub total_count: Option<u32>,
    pub connectors: Vec<Connector>,
    /// Projected battery on arrival, percent [0, 100]
    pub arrival_percent: f64,
    /// Minutes to charge from arrival to the configured limit
    pub charging_time_minutes: i64,
    /// Projected battery after charging, percent [0, 100]
    pub post_charge_percent: f64,
}

/// One ranked charging-stop plan. Created per planning run, replaced
/// wholesale on every re-plan.
#[derive(Debug, Clone)]
pub struct StopPlan {
    pub first_hop: AnnotatedStation,
    /// Populated only when the first hop alone cannot bridge the remaining
    /// distance under the configured charge limit
    pub second_hop: Option<AnnotatedStation>,
    pub second_hop_time_s: Option<f64>,
    pub second_hop_charging_time_minutes: Option<i64>,
    /// Projected battery on arrival at the destination after the plan's last
    /// charge
    pub destination_arrival_percent: f64,
    pub meets_arrival_target: bool,
}

/// Everything a planning run produces.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub route: DrivingRoute,
    /// Ambient temperature the run used (request value or seasonal default)
    pub temperature_c: f64,
    pub temperature_weight: f64,
    pub road_weight: f64,
    pub reachable_km: f64,
    /// Ranked stop plans, first-hop detour order, at most
    /// [`TOP_STATION_COUNT`]
    pub stops: Vec<StopPlan>,
}

// ---------------------------------------------------------------------------
// Stale-request guard
// ---------------------------------------------------------------------------

/// Monotonically increasing plan-generation counter.
///
/// Each run takes a ticket at start; the pipeline re-checks ticket currency
/// after every stage fan-in and aborts with [`AppError::Superseded`] once a
/// newer run has begun. This is the only mutable state the planner shares
/// between runs.
#[derive(Debug, Clone, Default)]
pub struct PlanGenerations {
    current: Arc<AtomicU64>,
}

/// Token identifying one planning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanTicket {
    id: u64,
}

impl PlanGenerations {
    pub fn begin(&self) -> PlanTicket {
        PlanTicket {
            id: self.current.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    pub fn is_current(&self, ticket: PlanTicket) -> bool {
        self.current.load(Ordering::SeqCst) == ticket.id
    }

    fn ensure_current(&self, ticket: PlanTicket) -> Result<(), AppError> {
        if self.is_current(ticket) {
            Ok(())
        } else {
            Err(AppError::Superseded)
        }
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Top-level planner orchestrating the pipeline across the three external
/// collaborators.
#[derive(Debug, Clone)]
pub struct Planner {
    directions: DirectionsClient,
    stations: StationSearchClient,
    charger_status: ChargerStatusClient,
    generations: PlanGenerations,
}

impl Planner {
    pub fn new(
        directions: DirectionsClient,
        stations: StationSearchClient,
        charger_status: ChargerStatusClient,
    ) -> Self {
        Self {
            directions,
            stations,
            charger_status,
            generations: PlanGenerations::default(),
        }
    }

    /// Start a new planning generation, invalidating all in-flight runs.
    pub fn begin(&self) -> PlanTicket {
        self.generations.begin()
    }

    /// Execute one planning run.
    pub async fn plan(
        &self,
        request: &PlanRequest,
        ticket: PlanTicket,
    ) -> Result<PlanOutcome, AppError> {
        let route = self
            .directions
            .fetch_route(request.origin, request.destination, request.route_option)
            .await?;
        self.generations.ensure_current(ticket)?;

        let waypoints = sample_waypoints(&route.segments, WAYPOINT_INTERVAL_M);

        let temperature_c = request.battery.temperature_c.unwrap_or_else(|| {
            let today = Utc::now();
            energy::seasonal_temperature(today.month(), today.day())
        });
        let temperature_weight = energy::temperature_weight(temperature_c);
        let road_weight = energy::road_weight(
            &request.vehicle,
            route.city_distance_m,
            route.highway_distance_m,
            route.total_time_s,
        );
        let reachable_km =
            energy::reachable_distance_km(&request.battery, road_weight, temperature_weight);

        tracing::info!(
            "route {:.1} km in {:.0} min; reachable {:.1} km (temp weight {:.3}, road weight {:.3}, {} waypoints)",
            route.total_distance_km(),
            route.total_time_s / 60.0,
            reachable_km,
            temperature_weight,
            road_weight,
            waypoints.len(),
        );

        let corridor = reachable_corridor(&waypoints, reachable_km);

        let candidates = match self
            .stations
            .search_near_corridor(&CorridorSearch {
                waypoints: &corridor,
                has_highway: route.has_highway(),
                origin: request.origin,
                dest: request.destination,
                route_distance_km: route.total_distance_km(),
                filter: &request.filter,
            })
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("corridor search failed, returning empty plan: {}", e);
                Vec::new()
            }
        };
        self.generations.ensure_current(ticket)?;

        if candidates.is_empty() {
            return Ok(PlanOutcome {
                route,
                temperature_c,
                temperature_weight,
                road_weight,
                reachable_km,
                stops: Vec::new(),
            });
        }

        let evaluated = self
            .evaluate_detours(
                request.origin,
                request.destination,
                route.total_time_s,
                candidates,
            )
            .await;
        let top = rank_stations(evaluated);
        self.generations.ensure_current(ticket)?;

        let annotated = self.annotate_availability(&request.battery, top).await;
        self.generations.ensure_current(ticket)?;

        let stops = self.chain_hops(request, &route, &waypoints, annotated).await;
        self.generations.ensure_current(ticket)?;

        tracing::info!("planning run complete: {} stop plans", stops.len());

        Ok(PlanOutcome {
            route,
            temperature_c,
            temperature_weight,
            road_weight,
            reachable_km,
            stops,
        })
    }

    /// Evaluate every candidate's true via-route cost against the baseline.
    ///
    /// Candidate queries are independent and order-insensitive; they run
    /// through a bounded, order-preserving stream. A failed query drops that
    /// candidate from ranking (logged), never the batch.
    async fn evaluate_detours(
        &self,
        origin: LatLon,
        dest: LatLon,
        baseline_time_s: f64,
        candidates: Vec<CandidateStation>,
    ) -> Vec<EvaluatedStation> {
        let results: Vec<Option<EvaluatedStation>> = stream::iter(candidates)
            .map(|candidate| async move {
                match self
                    .directions
                    .fetch_via_metrics(origin, candidate.position, dest)
                    .await
                {
                    Ok(metrics) => Some(EvaluatedStation {
                        station: candidate,
                        total_time_s: metrics.total_time_s,
                        total_fare: metrics.total_fare,
                        total_distance_m: metrics.total_distance_m,
                        detour_time_s: Some(metrics.total_time_s - baseline_time_s),
                    }),
                    Err(e) => {
                        tracing::warn!(
                            "detour evaluation failed for station {}: {}",
                            candidate.id,
                            e
                        );
                        None
                    }
                }
            })
            .buffered(DETOUR_CONCURRENCY)
            .collect()
            .await;

        results.into_iter().flatten().collect()
    }

    /// Attach live availability and battery projections to the ranked
    /// stations, preserving their order.
    async fn annotate_availability(
        &self,
        battery: &BatteryProfile,
        stations: Vec<EvaluatedStation>,
    ) -> Vec<AnnotatedStation> {
        stream::iter(stations)
            .map(|evaluated| async move {
                let connectors = match self
                    .charger_status
                    .fetch_station_status(&evaluated.station.id)
                    .await
                {
                    Ok(connectors) => Some(connectors),
                    Err(e) => {
                        tracing::warn!(
                            "status lookup failed for station {}: {}",
                            evaluated.station.id,
                            e
                        );
                        None
                    }
                };
                annotate_station(battery, evaluated, connectors)
            })
            .buffered(STATUS_CONCURRENCY)
            .collect()
            .await
    }

    /// Run hop chaining for each annotated station concurrently; output
    /// order tracks first-hop ranking, not completion order.
    async fn chain_hops(
        &self,
        request: &PlanRequest,
        route: &DrivingRoute,
        waypoints: &[Waypoint],
        annotated: Vec<AnnotatedStation>,
    ) -> Vec<StopPlan> {
        let chains = annotated
            .into_iter()
            .map(|station| self.chain_one(request, route, waypoints, station));
        futures::future::join_all(chains).await
    }

    /// Evaluate one first-hop station: either it alone covers the remaining
    /// route, or a second hop is searched from it toward the destination.
    async fn chain_one(
        &self,
        request: &PlanRequest,
        route: &DrivingRoute,
        waypoints: &[Waypoint],
        first_hop: AnnotatedStation,
    ) -> StopPlan {
        let battery = &request.battery;
        let battery_after_charge_km = (battery.charge_limit_percent / 100.0)
            * battery.capacity_kwh
            * battery.efficiency_km_per_kwh;
        let remaining_km =
            route.total_distance_km() - first_hop.evaluated.total_distance_m / 1000.0;

        let outcome = if first_hop_feasible(battery_after_charge_km, remaining_km) {
            HopOutcome::Feasible
        } else {
            self.search_second_hop(
                request,
                route,
                waypoints,
                &first_hop,
                battery_after_charge_km,
                remaining_km,
            )
            .await
        };

        match outcome {
            HopOutcome::Feasible => {
                let destination_arrival_percent = round_1dp(energy::estimate_arrival_battery(
                    first_hop.post_charge_percent,
                    remaining_km.max(0.0),
                    battery.efficiency_km_per_kwh,
                    battery.capacity_kwh,
                ));
                StopPlan {
                    first_hop,
                    second_hop: None,
                    second_hop_time_s: None,
                    second_hop_charging_time_minutes: None,
                    destination_arrival_percent,
                    meets_arrival_target: destination_arrival_percent
                        >= battery.target_arrival_percent,
                }
            }
            HopOutcome::SecondHopFound {
                hop,
                time_s,
                charging_minutes,
                hop_distance_km,
            } => {
                let destination_arrival_percent = round_1dp(energy::estimate_arrival_battery(
                    hop.post_charge_percent,
                    (remaining_km - hop_distance_km).max(0.0),
                    battery.efficiency_km_per_kwh,
                    battery.capacity_kwh,
                ));
                StopPlan {
                    first_hop,
                    second_hop: Some(hop),
                    second_hop_time_s: Some(time_s),
                    second_hop_charging_time_minutes: Some(charging_minutes),
                    destination_arrival_percent,
                    meets_arrival_target: destination_arrival_percent
                        >= battery.target_arrival_percent,
                }
            }
            HopOutcome::SecondHopUnavailable => {
                // Degraded plan: still returned, second-hop fields empty
                let destination_arrival_percent = round_1dp(energy::estimate_arrival_battery(
                    first_hop.post_charge_percent,
                    remaining_km.max(0.0),
                    battery.efficiency_km_per_kwh,
                    battery.capacity_kwh,
                ));
                StopPlan {
                    first_hop,
                    second_hop: None,
                    second_hop_time_s: None,
                    second_hop_charging_time_minutes: None,
                    destination_arrival_percent,
                    meets_arrival_target: destination_arrival_percent
                        >= battery.target_arrival_percent,
                }
            }
        }
    }

    /// Search for a second charging hop between the first-hop station and
    /// the destination.
    ///
    /// The candidate corridor is the waypoint suffix after the waypoint
    /// closest to the station, restricted to waypoints within post-charge
    /// range. Only the first candidate is taken.
    async fn search_second_hop(
        &self,
        request: &PlanRequest,
        route: &DrivingRoute,
        waypoints: &[Waypoint],
        first_hop: &AnnotatedStation,
        battery_after_charge_km: f64,
        remaining_km: f64,
    ) -> HopOutcome {
        let battery = &request.battery;
        let station_pos = first_hop.evaluated.station.position;
        let corridor = second_hop_corridor(waypoints, station_pos, battery_after_charge_km);

        let candidates = match self
            .stations
            .search_near_corridor(&CorridorSearch {
                waypoints: &corridor,
                has_highway: route.has_highway(),
                origin: station_pos,
                dest: request.destination,
                route_distance_km: remaining_km.max(0.0),
                filter: &request.filter,
            })
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(
                    "second-hop search failed from station {}: {}",
                    first_hop.evaluated.station.id,
                    e
                );
                return HopOutcome::SecondHopUnavailable;
            }
        };

        let Some(hop_candidate) = candidates.into_iter().next() else {
            return HopOutcome::SecondHopUnavailable;
        };

        let via = match self
            .directions
            .fetch_via_metrics(station_pos, hop_candidate.position, request.destination)
            .await
        {
            Ok(via) => via,
            Err(e) => {
                tracing::warn!(
                    "second-hop route failed via station {}: {}",
                    hop_candidate.id,
                    e
                );
                return HopOutcome::SecondHopUnavailable;
            }
        };

        let hop_distance_km = via.total_distance_m / 1000.0;
        // The driver leaves the first hop charged to the configured limit
        let arrival_percent = round_1dp(energy::estimate_arrival_battery(
            battery.charge_limit_percent,
            hop_distance_km,
            battery.efficiency_km_per_kwh,
            battery.capacity_kwh,
        ));
        let charging_speed_kw = hop_candidate
            .reported_output_kw
            .unwrap_or(DEFAULT_CHARGER_OUTPUT_KW);
        let charging_minutes = energy::estimate_charging_time_minutes(
            battery.capacity_kwh,
            arrival_percent,
            battery.charge_limit_percent,
            charging_speed_kw,
        );
        let post_charge_percent = round_1dp(energy::estimate_post_charge_battery(
            arrival_percent,
            charging_speed_kw,
            charging_minutes as f64,
            battery.capacity_kwh,
        ));

        HopOutcome::SecondHopFound {
            hop: AnnotatedStation {
                evaluated: EvaluatedStation {
                    station: hop_candidate,
                    total_time_s: via.total_time_s,
                    total_fare: via.total_fare,
                    total_distance_m: via.total_distance_m,
                    detour_time_s: None,
                },
                available_count: None,
                total_count: None,
                connectors: Vec::new(),
                arrival_percent,
                charging_time_minutes: charging_minutes,
                post_charge_percent,
            },
            time_s: via.total_time_s,
            charging_minutes,
            hop_distance_km,
        }
    }
}

/// Terminal outcome of one hop chain.
enum HopOutcome {
    /// First hop alone bridges the remaining distance
    Feasible,
    SecondHopFound {
        hop: AnnotatedStation,
        time_s: f64,
        charging_minutes: i64,
        hop_distance_km: f64,
    },
    SecondHopUnavailable,
}

/// Prefix of waypoints within reachable range, as corridor positions.
///
/// Cumulative distances increase monotonically, so the reachable set is
/// always a prefix.
fn reachable_corridor(waypoints: &[Waypoint], reachable_km: f64) -> Vec<LatLon> {
    let reachable_m = reachable_km * 1000.0;
    waypoints
        .iter()
        .take_while(|w| w.cumulative_distance_m <= reachable_m)
        .map(|w| w.position)
        .collect()
}

/// Rank evaluated stations and keep the top K.
///
/// Stable ascending sort by detour time with ties broken by lower total
/// distance. Negative detours (oracle noise) are clamped to zero in the sort
/// key only; the raw value stays on the station for display. The result is
/// deterministic for a given candidate set regardless of response arrival
/// order.
fn rank_stations(mut evaluated: Vec<EvaluatedStation>) -> Vec<EvaluatedStation> {
    evaluated.sort_by(|a, b| {
        let key_a = a.detour_time_s.unwrap_or(f64::MAX).max(0.0);
        let key_b = b.detour_time_s.unwrap_or(f64::MAX).max(0.0);
        key_a
            .total_cmp(&key_b)
            .then_with(|| a.total_distance_m.total_cmp(&b.total_distance_m))
    });
    evaluated.truncate(TOP_STATION_COUNT);
    evaluated
}

/// Can the first hop's post-charge range bridge the remaining route?
fn first_hop_feasible(battery_after_charge_km: f64, remaining_km: f64) -> bool {
    battery_after_charge_km >= remaining_km
}

/// Waypoint suffix after the waypoint closest to the first-hop station,
/// restricted to waypoints within post-charge range of it.
fn second_hop_corridor(
    waypoints: &[Waypoint],
    station: LatLon,
    battery_after_charge_km: f64,
) -> Vec<LatLon> {
    let closest_idx = waypoints
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            haversine_distance_m(&station, &a.position)
                .total_cmp(&haversine_distance_m(&station, &b.position))
        })
        .map(|(idx, _)| idx);

    let tail = match closest_idx {
        Some(idx) => &waypoints[idx + 1..],
        None => waypoints,
    };

    tail.iter()
        .filter(|w| haversine_distance_m(&station, &w.position) / 1000.0 <= battery_after_charge_km)
        .map(|w| w.position)
        .collect()
}

/// Merge an evaluated station with its (possibly missing) connector list
/// into battery projections.
fn annotate_station(
    battery: &BatteryProfile,
    evaluated: EvaluatedStation,
    connectors: Option<Vec<Connector>>,
) -> AnnotatedStation {
    let distance_km = evaluated.total_distance_m / 1000.0;
    let arrival_percent = round_1dp(energy::estimate_arrival_battery(
        battery.clamped_level_percent(),
        distance_km,
        battery.efficiency_km_per_kwh,
        battery.capacity_kwh,
    ));

    let charging_speed_kw = connectors
        .as_ref()
        .and_then(|c| c.first())
        .and_then(|c| c.output_kw)
        .unwrap_or(DEFAULT_CHARGER_OUTPUT_KW);

    let charging_time_minutes = energy::estimate_charging_time_minutes(
        battery.capacity_kwh,
        arrival_percent,
        battery.charge_limit_percent,
        charging_speed_kw,
    );
    let post_charge_percent = round_1dp(energy::estimate_post_charge_battery(
        arrival_percent,
        charging_speed_kw,
        charging_time_minutes as f64,
        battery.capacity_kwh,
    ));

    let (available_count, total_count) = match &connectors {
        Some(connectors) => {
            let (available, total) = count_available(connectors);
            (Some(available), Some(total))
        }
        None => (None, None),
    };

    AnnotatedStation {
        evaluated,
        available_count,
        total_count,
        connectors: connectors.unwrap_or_default(),
        arrival_percent,
        charging_time_minutes,
        post_charge_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::status::ConnectorStatus;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn station(id: &str, lat: f64, lon: f64) -> CandidateStation {
        CandidateStation {
            id: id.to_string(),
            name: format!("Station {}", id),
            position: LatLon { lat, lon },
            reported_output_kw: None,
            matches_filter: true,
        }
    }

    fn evaluated(id: &str, detour_s: f64, distance_m: f64) -> EvaluatedStation {
        EvaluatedStation {
            station: station(id, 36.0, 128.0),
            total_time_s: 10_000.0 + detour_s,
            total_fare: 5000.0,
            total_distance_m: distance_m,
            detour_time_s: Some(detour_s),
        }
    }

    fn battery() -> BatteryProfile {
        BatteryProfile {
            level_percent: 50.0,
            capacity_kwh: 70.0,
            efficiency_km_per_kwh: 5.0,
            charge_limit_percent: 85.0,
            target_arrival_percent: 20.0,
            temperature_c: Some(15.0),
        }
    }

    #[test]
    fn test_rank_stations_detour_then_distance() {
        let ranked = rank_stations(vec![
            evaluated("a", 300.0, 10.0),
            evaluated("b", 100.0, 5.0),
            evaluated("c", 100.0, 6.0),
            evaluated("d", 50.0, 20.0),
        ]);
        let order: Vec<&str> = ranked.iter().map(|e| e.station.id.as_str()).collect();
        assert_eq!(order, vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn test_rank_stations_truncates_to_top_k() {
        let ranked = rank_stations(
            (0..8)
                .map(|i| evaluated(&format!("s{}", i), i as f64 * 10.0, 100.0))
                .collect(),
        );
        assert_eq!(ranked.len(), TOP_STATION_COUNT);
    }

    #[test]
    fn test_rank_stations_negative_detour_clamped_in_key_only() {
        let ranked = rank_stations(vec![
            evaluated("late", 60.0, 10.0),
            evaluated("noise", -45.0, 20.0),
        ]);
        // Clamped key makes the negative detour rank first (0 < 60)
        assert_eq!(ranked[0].station.id, "noise");
        // while the raw value survives for display
        assert_eq!(ranked[0].detour_time_s, Some(-45.0));
    }

    #[test]
    fn test_rank_stations_negative_ties_break_by_distance() {
        let ranked = rank_stations(vec![
            evaluated("far", -10.0, 300.0),
            evaluated("near", -90.0, 200.0),
        ]);
        // Both clamp to 0; the shorter via route wins
        assert_eq!(ranked[0].station.id, "near");
    }

    #[test]
    fn test_first_hop_feasibility() {
        assert!(first_hop_feasible(100.0, 80.0));
        assert!(!first_hop_feasible(100.0, 150.0));
        assert!(first_hop_feasible(100.0, 100.0));
    }

    #[test]
    fn test_reachable_corridor_is_prefix() {
        let waypoints: Vec<Waypoint> = (1..=5)
            .map(|i| Waypoint {
                position: LatLon {
                    lat: 37.0,
                    lon: 127.0 + i as f64 * 0.02,
                },
                cumulative_distance_m: i as f64 * 2000.0,
            })
            .collect();

        let corridor = reachable_corridor(&waypoints, 5.0);
        assert_eq!(corridor.len(), 2);
        assert_eq!(corridor[0], waypoints[0].position);

        assert!(reachable_corridor(&waypoints, 0.0).is_empty());
        assert_eq!(reachable_corridor(&waypoints, 100.0).len(), 5);
    }

    #[test]
    fn test_second_hop_corridor_starts_after_closest_waypoint() {
        // Waypoints marching east along the equator; station sits on the
        // second one
        let waypoints: Vec<Waypoint> = (1..=5)
            .map(|i| Waypoint {
                position: LatLon {
                    lat: 0.0,
                    lon: i as f64 * 0.1,
                },
                cumulative_distance_m: i as f64 * 2000.0,
            })
            .collect();
        let station = LatLon { lat: 0.0, lon: 0.2 };

        let corridor = second_hop_corridor(&waypoints, station, 1000.0);
        // Suffix after index 1: waypoints 3, 4, 5 (all within 1000 km)
        assert_eq!(corridor.len(), 3);
        assert_eq!(corridor[0].lon, 0.3);
    }

    #[test]
    fn test_second_hop_corridor_range_restricted() {
        let waypoints: Vec<Waypoint> = (1..=5)
            .map(|i| Waypoint {
                position: LatLon {
                    lat: 0.0,
                    lon: i as f64 * 0.5,
                },
                cumulative_distance_m: i as f64 * 2000.0,
            })
            .collect();
        let station = LatLon { lat: 0.0, lon: 0.5 };

        // 0.5° of longitude ≈ 55.6 km at the equator; allow ~two waypoints
        let corridor = second_hop_corridor(&waypoints, station, 120.0);
        assert_eq!(corridor.len(), 2);
    }

    #[test]
    fn test_annotate_station_without_status() {
        let annotated = annotate_station(&battery(), evaluated("a", 100.0, 150_000.0), None);

        assert_eq!(annotated.available_count, None);
        assert_eq!(annotated.total_count, None);
        assert!(annotated.connectors.is_empty());
        // 150 km at 5 km/kWh = 30 kWh = 42.9% of 70 kWh
        assert!((annotated.arrival_percent - 7.1).abs() < 1e-9);
        // Fallback 50 kW output: (85 − 7.1)% of 70 kWh = 54.53 kWh → 65 min
        assert_eq!(annotated.charging_time_minutes, 65);
        assert!(annotated.post_charge_percent <= 100.0);
    }

    #[test]
    fn test_annotate_station_with_connectors() {
        let connectors = vec![
            Connector {
                status: ConnectorStatus::Available,
                output_kw: Some(100.0),
                last_update: None,
            },
            Connector {
                status: ConnectorStatus::Charging,
                output_kw: Some(100.0),
                last_update: None,
            },
        ];
        let annotated = annotate_station(
            &battery(),
            evaluated("a", 100.0, 150_000.0),
            Some(connectors),
        );

        assert_eq!(annotated.available_count, Some(1));
        assert_eq!(annotated.total_count, Some(2));
        assert_eq!(annotated.connectors.len(), 2);
        // First connector's 100 kW halves the fallback charging time
        assert_eq!(annotated.charging_time_minutes, 33);
    }

    #[test]
    fn test_plan_generations_supersede() {
        let generations = PlanGenerations::default();
        let first = generations.begin();
        assert!(generations.is_current(first));

        let second = generations.begin();
        assert!(!generations.is_current(first));
        assert!(generations.is_current(second));
        assert!(matches!(
            generations.ensure_current(first),
            Err(AppError::Superseded)
        ));
    }

    // -----------------------------------------------------------------------
    // End-to-end pipeline tests against mocked collaborators
    // -----------------------------------------------------------------------

    fn baseline_route_json() -> serde_json::Value {
        serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [127.0489, 37.5042] },
                    "properties": {
                        "totalDistance": 390000.0,
                        "totalTime": 14400.0,
                        "totalFare": 18100.0
                    }
                },
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "LineString",
                        "coordinates": [[127.0489, 37.5042], [127.5, 37.0]]
                    },
                    "properties": { "distance": 12000.0, "roadType": 1 }
                },
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "LineString",
                        "coordinates": [[127.5, 37.0], [129.1635, 35.1631]]
                    },
                    "properties": { "distance": 378000.0, "roadType": 0 }
                }
            ]
        })
    }

    fn candidates_json(count: usize) -> serde_json::Value {
        let hits: Vec<serde_json::Value> = (1..=count)
            .map(|i| {
                serde_json::json!({
                    "statId": format!("ST{:03}", i),
                    "statNm": format!("Station {}", i),
                    "lat": 36.35 - i as f64 * 0.1,
                    "lng": 127.38 + i as f64 * 0.2,
                    "output": "100"
                })
            })
            .collect();
        serde_json::Value::Array(hits)
    }

    fn connectors_json() -> serde_json::Value {
        serde_json::json!({
            "items": {
                "item": [
                    { "stat": "2", "output": "100", "statUpdDt": "20260805120000" },
                    { "stat": "3", "output": "100" }
                ]
            }
        })
    }

    fn planner_for(server: &MockServer) -> Planner {
        let timeout = std::time::Duration::from_secs(5);
        Planner::new(
            DirectionsClient::new(&server.uri(), "test-key", timeout),
            StationSearchClient::new(&server.uri(), timeout),
            ChargerStatusClient::new(&server.uri(), "test-key", timeout),
        )
    }

    fn plan_request(battery: BatteryProfile) -> PlanRequest {
        PlanRequest {
            origin: LatLon {
                lat: 37.5042,
                lon: 127.0489,
            },
            destination: LatLon {
                lat: 35.1631,
                lon: 129.1635,
            },
            battery,
            vehicle: VehicleEnergyProfile::default(),
            filter: StationFilter::default(),
            route_option: RouteOption::Recommended,
        }
    }

    #[tokio::test]
    async fn test_plan_end_to_end_feasible_first_hop() {
        let server = MockServer::start().await;

        // Status: ST003 fails, everything else reports two connectors
        Mock::given(method("GET"))
            .and(path("/getChargerInfo"))
            .and(query_param("statId", "ST003"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/getChargerInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(connectors_json()))
            .mount(&server)
            .await;

        // Directions: the same totals serve the baseline and every via route,
        // so remaining distance is 0 and every first hop is feasible
        Mock::given(method("POST"))
            .and(path("/routes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(baseline_route_json()))
            .mount(&server)
            .await;

        // Corridor search returns more candidates than the ranking keeps
        Mock::given(method("POST"))
            .and(path("/api/station/getStationsNearWaypoints"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidates_json(7)))
            .mount(&server)
            .await;

        let planner = planner_for(&server);
        let request = plan_request(battery());
        let ticket = planner.begin();
        let outcome = planner.plan(&request, ticket).await.unwrap();

        assert!(outcome.reachable_km.is_finite() && outcome.reachable_km > 0.0);
        assert_eq!(outcome.stops.len(), TOP_STATION_COUNT);

        // Order follows first-hop ranking (all detours tie at zero, all
        // distances tie, so the candidate order is preserved)
        let ids: Vec<&str> = outcome
            .stops
            .iter()
            .map(|s| s.first_hop.evaluated.station.id.as_str())
            .collect();
        assert_eq!(ids, vec!["ST001", "ST002", "ST003", "ST004", "ST005"]);

        // Remaining distance is 0 for every hop, so no second hops
        for stop in &outcome.stops {
            assert!(stop.second_hop.is_none());
            assert!(stop.second_hop_time_s.is_none());
        }

        // The failed status call nulls counts but keeps the station in place
        let degraded = &outcome.stops[2].first_hop;
        assert_eq!(degraded.available_count, None);
        assert_eq!(degraded.total_count, None);
        assert!(degraded.connectors.is_empty());
        let healthy = &outcome.stops[0].first_hop;
        assert_eq!(healthy.available_count, Some(1));
        assert_eq!(healthy.total_count, Some(2));

        // The corridor search only saw waypoints within reachable range
        let requests = server.received_requests().await.unwrap();
        let corridor_request = requests
            .iter()
            .find(|r| r.url.path().contains("getStationsNearWaypoints"))
            .expect("corridor search was called");
        let body: serde_json::Value = serde_json::from_slice(&corridor_request.body).unwrap();
        let sent_waypoints = body["waypoints"].as_array().unwrap().len();

        let expected_road_weight =
            energy::road_weight(&request.vehicle, 12_000.0, 378_000.0, 14_400.0);
        let expected_reachable_km = energy::reachable_distance_km(
            &request.battery,
            expected_road_weight,
            energy::temperature_weight(15.0),
        );
        let expected_count = (expected_reachable_km * 1000.0 / WAYPOINT_INTERVAL_M) as usize;
        assert_eq!(sent_waypoints, expected_count);
        assert!((outcome.reachable_km - expected_reachable_km).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_plan_end_to_end_second_hop() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/getChargerInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(connectors_json()))
            .mount(&server)
            .await;

        // Via routes (recognized by their passList) are much shorter than
        // the 390 km baseline, leaving 240 km after the first hop
        Mock::given(method("POST"))
            .and(path("/routes"))
            .and(body_string_contains("passList"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "features": [{
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [128.0, 36.0] },
                    "properties": {
                        "totalDistance": 150000.0,
                        "totalTime": 5000.0,
                        "totalFare": 9000.0
                    }
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/routes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(baseline_route_json()))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/station/getStationsNearWaypoints"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidates_json(3)))
            .mount(&server)
            .await;

        // Small pack: post-charge range 0.85 × 40 kWh × 4 km/kWh = 136 km,
        // short of the 240 km remaining after the first hop
        let small_battery = BatteryProfile {
            level_percent: 50.0,
            capacity_kwh: 40.0,
            efficiency_km_per_kwh: 4.0,
            charge_limit_percent: 85.0,
            target_arrival_percent: 20.0,
            temperature_c: Some(20.0),
        };

        let planner = planner_for(&server);
        let request = plan_request(small_battery);
        let ticket = planner.begin();
        let outcome = planner.plan(&request, ticket).await.unwrap();

        assert_eq!(outcome.stops.len(), 3);
        let stop = &outcome.stops[0];

        // Negative detour preserved raw (via 5000 s vs baseline 14400 s)
        assert_eq!(stop.first_hop.evaluated.detour_time_s, Some(-9400.0));

        let second = stop.second_hop.as_ref().expect("second hop populated");
        assert_eq!(second.evaluated.station.id, "ST001");
        assert_eq!(second.evaluated.detour_time_s, None);
        assert_eq!(second.available_count, None);
        assert_eq!(stop.second_hop_time_s, Some(5000.0));
        // 150 km at 4 km/kWh drains the pack to 0%; refilling to 85% of
        // 40 kWh at the candidate's 100 kW takes 34 kWh → 20 minutes
        assert_eq!(second.arrival_percent, 0.0);
        assert_eq!(stop.second_hop_charging_time_minutes, Some(20));
        assert!(stop.meets_arrival_target);
    }

    #[tokio::test]
    async fn test_plan_corridor_search_failure_yields_empty_plan() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/routes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(baseline_route_json()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/station/getStationsNearWaypoints"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let planner = planner_for(&server);
        let request = plan_request(battery());
        let ticket = planner.begin();
        let outcome = planner.plan(&request, ticket).await.unwrap();

        assert!(outcome.stops.is_empty());
        assert!(outcome.reachable_km > 0.0);
    }

    #[tokio::test]
    async fn test_plan_superseded_by_newer_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/routes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(baseline_route_json()))
            .mount(&server)
            .await;

        let planner = planner_for(&server);
        let request = plan_request(battery());

        let stale = planner.begin();
        let _newer = planner.begin();

        let err = planner.plan(&request, stale).await.unwrap_err();
        assert!(matches!(err, AppError::Superseded));
    }

    #[tokio::test]
    async fn test_plan_no_route_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/routes"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "features": [] })),
            )
            .mount(&server)
            .await;

        let planner = planner_for(&server);
        let request = plan_request(battery());
        let ticket = planner.begin();
        let err = planner.plan(&request, ticket).await.unwrap_err();
        assert!(matches!(err, AppError::NoRoute(_)));
    }
}
