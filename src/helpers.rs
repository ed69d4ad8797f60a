//! Shared geometry and numeric helpers.

use serde::{Deserialize, Deserializer};

use crate::services::directions::LatLon;

/// Mean Earth radius in metres.
pub(crate) const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two WGS84 coordinates in metres.
///
/// Haversine formula, accurate to well under 0.5% for the sub-500 km
/// distances this service works with.
pub(crate) fn haversine_distance_m(a: &LatLon, b: &LatLon) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Round to one decimal place.
///
/// Battery percentages are reported at 0.1% precision; consistent rounding
/// keeps the API output stable across recomputations.
pub(crate) fn round_1dp(v: f64) -> f64 {
    if !v.is_finite() {
        tracing::warn!("round_1dp received non-finite value {}, defaulting to 0", v);
        return 0.0;
    }
    (v * 10.0).round() / 10.0
}

/// Deserialize an optional f64 that may arrive as a JSON number or a numeric
/// string. The charger-status provider reports connector output either way.
pub(crate) fn de_opt_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(f64),
        Str(String),
    }

    let value: Option<NumOrStr> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(NumOrStr::Num(n)) => Some(n),
        Some(NumOrStr::Str(s)) => s.trim().parse::<f64>().ok(),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_zero_distance() {
        let p = LatLon {
            lat: 37.5042,
            lon: 127.0489,
        };
        assert_eq!(haversine_distance_m(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_equator_degree() {
        // One degree of longitude at the equator ≈ 111.19 km with R = 6371 km
        let a = LatLon { lat: 0.0, lon: 0.0 };
        let b = LatLon { lat: 0.0, lon: 1.0 };
        let d = haversine_distance_m(&a, &b);
        assert!((d - 111_194.9).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn test_haversine_seoul_busan() {
        // Gangnam → Haeundae, roughly 325 km great-circle
        let seoul = LatLon {
            lat: 37.5042,
            lon: 127.0489,
        };
        let busan = LatLon {
            lat: 35.1631,
            lon: 129.1635,
        };
        let d = haversine_distance_m(&seoul, &busan) / 1000.0;
        assert!((300.0..350.0).contains(&d), "got {} km", d);
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = LatLon {
            lat: 37.5,
            lon: 127.0,
        };
        let b = LatLon {
            lat: 35.2,
            lon: 129.2,
        };
        assert_eq!(haversine_distance_m(&a, &b), haversine_distance_m(&b, &a));
    }

    #[test]
    fn test_round_1dp() {
        assert_eq!(round_1dp(3.14), 3.1);
        assert_eq!(round_1dp(3.16), 3.2);
    }

    #[test]
    fn test_round_1dp_non_finite() {
        assert_eq!(round_1dp(f64::NAN), 0.0);
        assert_eq!(round_1dp(f64::INFINITY), 0.0);
    }

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(default, deserialize_with = "de_opt_f64_lenient")]
        output: Option<f64>,
    }

    #[test]
    fn test_lenient_f64_from_number() {
        let w: Wrapper = serde_json::from_str(r#"{"output": 100.5}"#).unwrap();
        assert_eq!(w.output, Some(100.5));
    }

    #[test]
    fn test_lenient_f64_from_string() {
        let w: Wrapper = serde_json::from_str(r#"{"output": "50"}"#).unwrap();
        assert_eq!(w.output, Some(50.0));
    }

    #[test]
    fn test_lenient_f64_from_garbage_string() {
        let w: Wrapper = serde_json::from_str(r#"{"output": "fast"}"#).unwrap();
        assert_eq!(w.output, None);
    }

    #[test]
    fn test_lenient_f64_missing() {
        let w: Wrapper = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(w.output, None);
    }
}
