//! Test fixtures for route-consolidator.
//!
//! Provides:
//! - Bogotá locations
//! - A builder for trip requests
//! - A deterministic routing service that follows straight lines

#![allow(dead_code)]

pub mod bogota_locations;

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{NaiveDate, NaiveTime};

use route_consolidator::geodesy::haversine_km;
use route_consolidator::polyline::Polyline;
use route_consolidator::routing::{Leg, RouteAlternative, RouteRequest, RoutingError, Step};
use route_consolidator::traits::RoutingService;
use route_consolidator::trip::{Coordinate, Direction, TripRequest};

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, month, day).unwrap()
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

// ============================================================================
// Trip builder
// ============================================================================

pub struct TripBuilder {
    trip: TripRequest,
}

impl TripBuilder {
    pub fn new(service_id: &str) -> Self {
        let mut trip = TripRequest::new(
            service_id,
            format!("user-{}", service_id),
            date(11, 4),
            time(8, 0),
            Direction::Outbound,
        );
        trip.service_type_id = 14;
        trip.origin_city_id = Some(104);
        trip.destination_city = "Bogota".to_string();
        Self { trip }
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.trip.user_id = user_id.to_string();
        self
    }

    pub fn on(mut self, service_date: NaiveDate) -> Self {
        self.trip.service_date = service_date;
        self
    }

    pub fn at(mut self, hour: u32, minute: u32) -> Self {
        self.trip.service_time = time(hour, minute);
        self
    }

    pub fn returning(mut self) -> Self {
        self.trip.direction = Direction::Return;
        self
    }

    pub fn from(mut self, lat: f64, lng: f64) -> Self {
        self.trip.origin = Some(Coordinate::new(lat, lng));
        self
    }

    pub fn to(mut self, lat: f64, lng: f64) -> Self {
        self.trip.destination = Some(Coordinate::new(lat, lng));
        self
    }

    pub fn origin_city(mut self, city_id: u32) -> Self {
        self.trip.origin_city_id = Some(city_id);
        self
    }

    pub fn service_type(mut self, service_type_id: u32) -> Self {
        self.trip.service_type_id = service_type_id;
        self
    }

    pub fn build(self) -> TripRequest {
        self.trip
    }
}

// ============================================================================
// Straight-line routing service
// ============================================================================

/// Routes along straight lines between consecutive waypoints, densified to
/// one vertex every 100 m, at a fixed speed. Never reorders intermediates.
///
/// Requests starting at one of `unroutable` origins get no alternatives.
pub struct StraightLineRouter {
    speed_kmh: f64,
    unroutable: HashSet<(i64, i64)>,
    requests: Mutex<Vec<RouteRequest>>,
}

impl StraightLineRouter {
    pub fn new() -> Self {
        Self {
            speed_kmh: 30.0,
            unroutable: HashSet::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_speed(mut self, speed_kmh: f64) -> Self {
        self.speed_kmh = speed_kmh;
        self
    }

    pub fn unroutable_from(mut self, lat: f64, lng: f64) -> Self {
        self.unroutable.insert(key(Coordinate::new(lat, lng)));
        self
    }

    pub fn requests(&self) -> Vec<RouteRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn leg(&self, from: Coordinate, to: Coordinate) -> Leg {
        let distance_km = haversine_km(from, to);
        let segments = ((distance_km / 0.1).ceil() as usize).max(1);
        let points = (0..=segments)
            .map(|i| {
                let t = i as f64 / segments as f64;
                Coordinate::new(from.lat + (to.lat - from.lat) * t, from.lng + (to.lng - from.lng) * t)
            })
            .collect();
        Leg {
            steps: vec![Step {
                duration_seconds: (distance_km / self.speed_kmh * 3600.0).round() as u64,
                encoded_polyline: Polyline::new(points).encode().unwrap(),
            }],
        }
    }
}

impl RoutingService for StraightLineRouter {
    fn route(&self, request: &RouteRequest) -> Result<Vec<RouteAlternative>, RoutingError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.unroutable.contains(&key(request.origin)) {
            return Ok(Vec::new());
        }

        let stops: Vec<Coordinate> = std::iter::once(request.origin)
            .chain(request.intermediates.iter().copied())
            .chain(std::iter::once(request.destination))
            .collect();
        let legs = stops.windows(2).map(|pair| self.leg(pair[0], pair[1])).collect();
        let optimized_intermediate_order = request
            .optimize_intermediates
            .then(|| (0..request.intermediates.len()).collect());

        Ok(vec![RouteAlternative {
            legs,
            optimized_intermediate_order,
        }])
    }
}

fn key(coord: Coordinate) -> (i64, i64) {
    ((coord.lat * 1e6).round() as i64, (coord.lng * 1e6).round() as i64)
}
