//! Battery and environment energy model.
//!
//! Pure, deterministic functions converting a battery profile plus road and
//! temperature conditions into a reachable distance, and projecting battery
//! percentage across a drive / charge / drive sequence. No I/O; every
//! function here is a plain calculation over its arguments.

use serde::Deserialize;
use utoipa::ToSchema;

use crate::helpers::round_1dp;

// --- Temperature weight ---

/// Optimal battery temperature band: no range penalty inside [18, 22] °C.
const OPTIMAL_TEMP_MIN_C: f64 = 18.0;
const OPTIMAL_TEMP_MAX_C: f64 = 22.0;

/// Decay coefficient below the optimal band (cold penalizes harder).
const ALPHA_COLD: f64 = 0.015;
/// Decay coefficient above the optimal band.
const ALPHA_WARM: f64 = 0.01;
/// Deviation exponent shared by both sides of the band.
const BETA: f64 = 1.5;

// --- Road weight ---

/// Regenerative-braking boost applied to the city efficiency ratio when the
/// implied average city speed falls below [`CITY_BOOST_SPEED_KMH`].
const CITY_BOOST_FACTOR: f64 = 1.35;
const CITY_BOOST_SPEED_KMH: f64 = 30.0;

// --- Seasonal default temperature ---

/// Monthly average temperatures (°C, Seoul), January through December.
/// Used only when a planning request omits the ambient temperature.
const MONTHLY_AVG_TEMPS_C: [f64; 12] = [
    -2.5, 0.3, 5.7, 12.8, 17.9, 22.2, 25.7, 26.4, 21.9, 15.0, 7.3, 0.4,
];

const DAYS_IN_MONTH: [f64; 12] = [
    31.0, 28.0, 31.0, 30.0, 31.0, 30.0, 31.0, 31.0, 30.0, 31.0, 30.0, 31.0,
];

/// Driver-supplied battery state for one planning request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BatteryProfile {
    /// Current state of charge in percent [0, 100]
    pub level_percent: f64,
    /// Usable battery capacity in kWh
    pub capacity_kwh: f64,
    /// Rated efficiency in km per kWh
    pub efficiency_km_per_kwh: f64,
    /// Charge-to limit at charging stops, percent (default 85)
    #[serde(default = "default_charge_limit")]
    pub charge_limit_percent: f64,
    /// Desired state of charge on arrival at the destination, percent (default 20)
    #[serde(default = "default_target_arrival")]
    pub target_arrival_percent: f64,
    /// Ambient temperature in °C; when omitted, a seasonal average for the
    /// current date is substituted
    #[serde(default)]
    pub temperature_c: Option<f64>,
}

fn default_charge_limit() -> f64 {
    85.0
}

fn default_target_arrival() -> f64 {
    20.0
}

impl BatteryProfile {
    /// State of charge clamped into [0, 100]; negative inputs read as empty.
    pub fn clamped_level_percent(&self) -> f64 {
        self.level_percent.clamp(0.0, 100.0)
    }
}

/// Vehicle road-type efficiencies, used only for the road-weight blend
/// (distinct from the profile's base efficiency used for absolute energy
/// accounting).
#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
pub struct VehicleEnergyProfile {
    /// City driving efficiency in km per kWh
    #[serde(default = "default_city_efficiency")]
    pub city_km_per_kwh: f64,
    /// Highway driving efficiency in km per kWh
    #[serde(default = "default_highway_efficiency")]
    pub highway_km_per_kwh: f64,
}

fn default_city_efficiency() -> f64 {
    5.5
}

fn default_highway_efficiency() -> f64 {
    4.4
}

impl Default for VehicleEnergyProfile {
    fn default() -> Self {
        Self {
            city_km_per_kwh: default_city_efficiency(),
            highway_km_per_kwh: default_highway_efficiency(),
        }
    }
}

/// Range attainable on the current charge, in km.
///
/// `(level/100) × capacity × efficiency × temp_weight × road_weight`,
/// never negative.
pub fn reachable_distance_km(battery: &BatteryProfile, road_weight: f64, temp_weight: f64) -> f64 {
    let km = (battery.clamped_level_percent() / 100.0)
        * battery.capacity_kwh
        * battery.efficiency_km_per_kwh
        * temp_weight
        * road_weight;
    km.max(0.0)
}

/// Range multiplier for ambient temperature.
///
/// 1.0 inside the optimal band; outside, decays as `1 / (1 + α·d^1.5)` where
/// `d` is the distance in °C from the nearer band edge. Cold deviations decay
/// faster than warm ones (battery chemistry plus cabin heating load).
pub fn temperature_weight(temperature_c: f64) -> f64 {
    if (OPTIMAL_TEMP_MIN_C..=OPTIMAL_TEMP_MAX_C).contains(&temperature_c) {
        return 1.0;
    }

    let (deviation, alpha) = if temperature_c < OPTIMAL_TEMP_MIN_C {
        (OPTIMAL_TEMP_MIN_C - temperature_c, ALPHA_COLD)
    } else {
        (temperature_c - OPTIMAL_TEMP_MAX_C, ALPHA_WARM)
    };

    1.0 / (1.0 + alpha * deviation.powf(BETA))
}

/// Blended road-type efficiency factor for a route.
///
/// Each road type's efficiency is normalized against the simple average of
/// the two, then the normalized ratios are blended by distance share. The
/// city ratio gets a regenerative-braking boost when the implied average city
/// speed (city distance over the city share of total time) is below 30 km/h.
///
/// Returns 0.0 when the route has no distance.
pub fn road_weight(
    vehicle: &VehicleEnergyProfile,
    city_distance_m: f64,
    highway_distance_m: f64,
    total_time_s: f64,
) -> f64 {
    let total_distance_m = city_distance_m + highway_distance_m;
    if total_distance_m <= 0.0 {
        return 0.0;
    }

    let average = (vehicle.city_km_per_kwh + vehicle.highway_km_per_kwh) / 2.0;
    if average <= 0.0 {
        return 0.0;
    }

    let mut city_ratio = vehicle.city_km_per_kwh / average;
    let highway_ratio = vehicle.highway_km_per_kwh / average;

    let city_share = city_distance_m / total_distance_m;
    let city_time_s = city_share * total_time_s;
    if city_distance_m > 0.0 && city_time_s > 0.0 {
        let city_speed_kmh = (city_distance_m / 1000.0) / (city_time_s / 3600.0);
        if city_speed_kmh < CITY_BOOST_SPEED_KMH {
            city_ratio *= CITY_BOOST_FACTOR;
        }
    }

    city_ratio * city_share + highway_ratio * (highway_distance_m / total_distance_m)
}

/// Battery percentage expected on arrival after driving `distance_km`,
/// floored at 0.
pub fn estimate_arrival_battery(
    current_percent: f64,
    distance_km: f64,
    efficiency_km_per_kwh: f64,
    capacity_kwh: f64,
) -> f64 {
    if efficiency_km_per_kwh <= 0.0 || capacity_kwh <= 0.0 {
        return 0.0;
    }
    let used_kwh = distance_km / efficiency_km_per_kwh;
    let used_percent = used_kwh / capacity_kwh * 100.0;
    (current_percent - used_percent).max(0.0)
}

/// Minutes needed to charge from `arrival_percent` to `target_percent` at
/// `charging_speed_kw`, rounded to the nearest minute. Already being at or
/// above the target yields 0, never negative time.
pub fn estimate_charging_time_minutes(
    capacity_kwh: f64,
    arrival_percent: f64,
    target_percent: f64,
    charging_speed_kw: f64,
) -> i64 {
    if charging_speed_kw <= 0.0 {
        return 0;
    }
    let charge_kwh = (target_percent - arrival_percent) / 100.0 * capacity_kwh;
    let minutes = charge_kwh / charging_speed_kw * 60.0;
    if !minutes.is_finite() || minutes <= 0.0 {
        return 0;
    }
    minutes.round() as i64
}

/// Battery percentage after charging at `charging_speed_kw` for
/// `charging_minutes`, capped at 100.
pub fn estimate_post_charge_battery(
    arrival_percent: f64,
    charging_speed_kw: f64,
    charging_minutes: f64,
    capacity_kwh: f64,
) -> f64 {
    if capacity_kwh <= 0.0 {
        return arrival_percent.min(100.0);
    }
    let charged_kwh = charging_speed_kw * charging_minutes / 60.0;
    let charged_percent = charged_kwh / capacity_kwh * 100.0;
    (arrival_percent + charged_percent).min(100.0)
}

/// Seasonal average temperature for a calendar date, linearly interpolated
/// between this month's and next month's table entries.
pub fn seasonal_temperature(month: u32, day: u32) -> f64 {
    let idx = (month.clamp(1, 12) - 1) as usize;
    let next = (idx + 1) % 12;

    let start = MONTHLY_AVG_TEMPS_C[idx];
    let end = MONTHLY_AVG_TEMPS_C[next];
    let ratio = (day.saturating_sub(1) as f64) / DAYS_IN_MONTH[idx];

    round_1dp(start + (end - start) * ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery(level: f64) -> BatteryProfile {
        BatteryProfile {
            level_percent: level,
            capacity_kwh: 70.0,
            efficiency_km_per_kwh: 5.0,
            charge_limit_percent: 85.0,
            target_arrival_percent: 20.0,
            temperature_c: Some(15.0),
        }
    }

    #[test]
    fn test_reachable_distance_formula() {
        // 50% of 70 kWh at 5 km/kWh with unit weights = 175 km
        let km = reachable_distance_km(&battery(50.0), 1.0, 1.0);
        assert!((km - 175.0).abs() < 1e-9);
    }

    #[test]
    fn test_reachable_distance_monotone_in_level() {
        let mut prev = 0.0;
        for level in [0.0, 10.0, 25.0, 50.0, 80.0, 100.0] {
            let km = reachable_distance_km(&battery(level), 0.97, 0.91);
            assert!(km >= prev, "range must not decrease with charge level");
            prev = km;
        }
    }

    #[test]
    fn test_reachable_distance_negative_level_clamped() {
        assert_eq!(reachable_distance_km(&battery(-5.0), 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_temperature_weight_optimal_band() {
        assert_eq!(temperature_weight(18.0), 1.0);
        assert_eq!(temperature_weight(20.0), 1.0);
        assert_eq!(temperature_weight(22.0), 1.0);
    }

    #[test]
    fn test_temperature_weight_decreases_when_cold() {
        let mut prev = 1.0;
        for t in [17.0, 10.0, 0.0, -10.0, -20.0] {
            let w = temperature_weight(t);
            assert!(w < prev, "weight must strictly decrease below the band");
            assert!(w > 0.0);
            prev = w;
        }
    }

    #[test]
    fn test_temperature_weight_decreases_when_hot() {
        let mut prev = 1.0;
        for t in [23.0, 30.0, 40.0, 50.0] {
            let w = temperature_weight(t);
            assert!(w < prev, "weight must strictly decrease above the band");
            prev = w;
        }
    }

    #[test]
    fn test_temperature_weight_cold_penalizes_harder() {
        // Same 10° deviation on each side: cold side decays faster
        assert!(temperature_weight(8.0) < temperature_weight(32.0));
    }

    #[test]
    fn test_road_weight_zero_distance() {
        let vehicle = VehicleEnergyProfile::default();
        assert_eq!(road_weight(&vehicle, 0.0, 0.0, 3600.0), 0.0);
    }

    #[test]
    fn test_road_weight_pure_highway() {
        // All highway: weight is the normalized highway ratio
        let vehicle = VehicleEnergyProfile {
            city_km_per_kwh: 5.5,
            highway_km_per_kwh: 4.4,
        };
        let w = road_weight(&vehicle, 0.0, 100_000.0, 3600.0);
        let expected = 4.4 / ((5.5 + 4.4) / 2.0);
        assert!((w - expected).abs() < 1e-9, "got {}", w);
    }

    #[test]
    fn test_road_weight_city_boost_below_30_kmh() {
        let vehicle = VehicleEnergyProfile {
            city_km_per_kwh: 5.5,
            highway_km_per_kwh: 4.4,
        };
        // 20 km of city over 1 hour = 20 km/h: boost applies
        let slow = road_weight(&vehicle, 20_000.0, 0.0, 3600.0);
        // 40 km of city over 1 hour = 40 km/h: no boost
        let fast = road_weight(&vehicle, 40_000.0, 0.0, 3600.0);

        let base_ratio = 5.5 / ((5.5 + 4.4) / 2.0);
        assert!((fast - base_ratio).abs() < 1e-9);
        assert!((slow - base_ratio * 1.35).abs() < 1e-9);
    }

    #[test]
    fn test_road_weight_mixed_blend() {
        let vehicle = VehicleEnergyProfile {
            city_km_per_kwh: 5.0,
            highway_km_per_kwh: 5.0,
        };
        // Identical efficiencies and fast city speed: blend is exactly 1.0
        let w = road_weight(&vehicle, 50_000.0, 50_000.0, 3600.0);
        assert!((w - 1.0).abs() < 1e-9, "got {}", w);
    }

    #[test]
    fn test_arrival_battery_basic() {
        // 100 km at 5 km/kWh = 20 kWh = 28.57% of 70 kWh
        let pct = estimate_arrival_battery(50.0, 100.0, 5.0, 70.0);
        assert!((pct - (50.0 - 20.0 / 70.0 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_arrival_battery_floor_at_zero() {
        assert_eq!(estimate_arrival_battery(10.0, 500.0, 5.0, 70.0), 0.0);
    }

    #[test]
    fn test_charging_time_basic() {
        // 20% → 85% of 70 kWh = 45.5 kWh at 100 kW = 27.3 min → 27
        assert_eq!(estimate_charging_time_minutes(70.0, 20.0, 85.0, 100.0), 27);
    }

    #[test]
    fn test_charging_time_never_negative() {
        assert_eq!(estimate_charging_time_minutes(70.0, 90.0, 85.0, 100.0), 0);
    }

    #[test]
    fn test_charging_time_zero_speed() {
        assert_eq!(estimate_charging_time_minutes(70.0, 20.0, 85.0, 0.0), 0);
    }

    #[test]
    fn test_post_charge_battery_basic() {
        // 50 kW for 42 min = 35 kWh = 50% of 70 kWh
        let pct = estimate_post_charge_battery(30.0, 50.0, 42.0, 70.0);
        assert!((pct - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_post_charge_battery_capped_at_100() {
        assert_eq!(estimate_post_charge_battery(90.0, 350.0, 60.0, 70.0), 100.0);
    }

    #[test]
    fn test_seasonal_temperature_month_start() {
        // Day 1 of each month equals the table entry exactly
        assert_eq!(seasonal_temperature(1, 1), -2.5);
        assert_eq!(seasonal_temperature(8, 1), 26.4);
        assert_eq!(seasonal_temperature(12, 1), 0.4);
    }

    #[test]
    fn test_seasonal_temperature_interpolates() {
        // Mid-April sits between April (12.8) and May (17.9)
        let t = seasonal_temperature(4, 16);
        assert!(t > 12.8 && t < 17.9, "got {}", t);
    }

    #[test]
    fn test_seasonal_temperature_december_wraps_to_january() {
        // Late December trends toward January's average
        let t = seasonal_temperature(12, 31);
        assert!(t < 0.4 && t > -2.5, "got {}", t);
    }

    #[test]
    fn test_battery_profile_defaults_from_json() {
        let b: BatteryProfile = serde_json::from_str(
            r#"{"level_percent": 50, "capacity_kwh": 70, "efficiency_km_per_kwh": 5.0}"#,
        )
        .unwrap();
        assert_eq!(b.charge_limit_percent, 85.0);
        assert_eq!(b.target_arrival_percent, 20.0);
        assert_eq!(b.temperature_c, None);
    }
}
