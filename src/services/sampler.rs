//! Route waypoint sampling.
//!
//! Walks a route's concatenated segment polylines and emits a waypoint every
//! fixed number of metres measured along the route (not euclidean), linearly
//! interpolated between the bracketing geometry vertices. The sequence is
//! lazy and restartable: it is a pure function of the input geometry, so a
//! fresh iterator can be taken per request.

use crate::helpers::haversine_distance_m;
use crate::services::directions::{LatLon, RouteSegment};

/// Spacing between sampled waypoints along the route, in metres.
pub const WAYPOINT_INTERVAL_M: f64 = 2000.0;

/// A sampled point along the route, anchor for nearby-station search.
///
/// Waypoints are ordered: cumulative distance strictly increases and equals
/// the sampling interval times the waypoint's 1-based index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub position: LatLon,
    pub cumulative_distance_m: f64,
}

/// Lazy waypoint iterator over a route's segments.
pub struct Waypoints<'a> {
    segments: &'a [RouteSegment],
    interval_m: f64,
    seg_idx: usize,
    vertex_idx: usize,
    accumulated_m: f64,
    next_target_m: f64,
}

impl<'a> Waypoints<'a> {
    pub fn new(segments: &'a [RouteSegment], interval_m: f64) -> Self {
        Self {
            segments,
            interval_m,
            seg_idx: 0,
            vertex_idx: 0,
            accumulated_m: 0.0,
            next_target_m: interval_m,
        }
    }
}

impl Iterator for Waypoints<'_> {
    type Item = Waypoint;

    fn next(&mut self) -> Option<Waypoint> {
        loop {
            let segment = self.segments.get(self.seg_idx)?;
            if self.vertex_idx + 1 >= segment.points.len() {
                self.seg_idx += 1;
                self.vertex_idx = 0;
                continue;
            }

            let a = segment.points[self.vertex_idx];
            let b = segment.points[self.vertex_idx + 1];
            let pair_m = haversine_distance_m(&a, &b);

            let remaining = self.next_target_m - self.accumulated_m;
            if remaining < pair_m {
                let ratio = remaining / pair_m;
                let waypoint = Waypoint {
                    position: lerp(a, b, ratio),
                    cumulative_distance_m: self.next_target_m,
                };
                self.next_target_m += self.interval_m;
                return Some(waypoint);
            }

            self.accumulated_m += pair_m;
            self.vertex_idx += 1;
        }
    }
}

/// Sample all waypoints of a route at the given interval.
///
/// A route shorter than one interval yields an empty vector; callers must
/// tolerate this.
pub fn sample_waypoints(segments: &[RouteSegment], interval_m: f64) -> Vec<Waypoint> {
    Waypoints::new(segments, interval_m).collect()
}

fn lerp(a: LatLon, b: LatLon, t: f64) -> LatLon {
    LatLon {
        lat: a.lat + (b.lat - a.lat) * t,
        lon: a.lon + (b.lon - a.lon) * t,
    }
}
