//! Great-circle distances and closed-form travel time estimates.
//!
//! Two distance functions coexist: a spherical haversine in meters, used for
//! clustering and corridor tests, and an ellipsoidal geodesic in kilometers,
//! used to rank passengers within a route. They are not expected to agree
//! numerically.

use geo::{Distance, Geodesic, Point};

use crate::trip::Coordinate;

/// Average driving speed assumed by route estimates.
pub const DEFAULT_SPEED_KMH: f64 = 30.0;

/// Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two points in meters.
pub fn haversine_m(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Haversine distance between two points in kilometers.
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    haversine_m(from, to) / 1000.0
}

/// Geodesic (WGS84) distance between two points in kilometers.
pub fn geodesic_km(from: Coordinate, to: Coordinate) -> f64 {
    let from = Point::new(from.lng, from.lat);
    let to = Point::new(to.lng, to.lat);
    Geodesic.distance(from, to) / 1000.0
}

/// Minutes needed to cover `distance_m` at `speed_mps`.
pub fn estimated_minutes(distance_m: f64, speed_mps: f64) -> f64 {
    distance_m / speed_mps / 60.0
}

/// Estimated duration in minutes of driving through `points` in order.
///
/// Returns 0 for fewer than two points.
pub fn estimated_route_duration(points: &[Coordinate], speed_kmh: f64) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    let speed_mps = speed_kmh * 1000.0 / 3600.0;
    points
        .windows(2)
        .map(|leg| estimated_minutes(haversine_m(leg[0], leg[1]), speed_mps))
        .sum()
}
