//! Route duration estimation and validation.
//!
//! A group of pickups heading to one destination is anchored at its
//! farthest origin. The estimate is closed-form; the real duration comes
//! from the routing service, which also chooses the intermediate order.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::debug;

use crate::consolidation::departure_time;
use crate::geodesy::estimated_route_duration;
use crate::routing::{RetryPolicy, RouteRequest, RoutingError, route_with_retry};
use crate::traits::RoutingService;
use crate::trip::Coordinate;

#[derive(Debug, Clone)]
pub struct DurationOptions {
    pub average_speed_kmh: f64,
    pub max_duration_minutes: u64,
    pub departure_buffer_minutes: u32,
    pub retry: RetryPolicy,
}

impl Default for DurationOptions {
    fn default() -> Self {
        Self {
            average_speed_kmh: crate::geodesy::DEFAULT_SPEED_KMH,
            max_duration_minutes: 30,
            departure_buffer_minutes: 10,
            retry: RetryPolicy::default(),
        }
    }
}

/// One passenger pickup within a group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pickup {
    pub origin: Coordinate,
    pub scheduled: NaiveTime,
}

/// Duration figures for a group, with per-pickup order when validated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDuration {
    pub estimated_minutes: f64,
    pub real_minutes: Option<u64>,
    pub valid: bool,
    /// Indexed like the input pickups; 1 is the farthest origin.
    pub pickup_order: Vec<Option<u32>>,
}

impl RouteDuration {
    /// Real duration known and above the limit.
    pub fn exceeded(&self) -> bool {
        self.real_minutes.is_some() && !self.valid
    }
}

/// Index of the origin farthest from `destination` by plane distance in
/// degrees. Ties keep the first occurrence.
pub fn farthest_origin(origins: &[Coordinate], destination: Coordinate) -> Option<usize> {
    let distance = |origin: &Coordinate| {
        ((origin.lat - destination.lat).powi(2) + (origin.lng - destination.lng).powi(2)).sqrt()
    };

    let mut best: Option<(usize, f64)> = None;
    for (index, origin) in origins.iter().enumerate() {
        let d = distance(origin);
        if best.is_none_or(|(_, max)| d > max) {
            best = Some((index, d));
        }
    }
    best.map(|(index, _)| index)
}

/// Closed-form duration through `[farthest, others..., destination]`.
pub fn estimate_duration(origins: &[Coordinate], destination: Coordinate, speed_kmh: f64) -> f64 {
    let Some(anchor) = farthest_origin(origins, destination) else {
        return 0.0;
    };
    let mut points = Vec::with_capacity(origins.len() + 1);
    points.push(origins[anchor]);
    points.extend(
        origins
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != anchor)
            .map(|(_, origin)| *origin),
    );
    points.push(destination);
    estimated_route_duration(&points, speed_kmh)
}

/// Estimates, routes and validates a group of pickups.
///
/// Routing errors are returned to the caller, who owns the group context.
/// A route over the limit is not an error: it comes back with
/// `valid == false` and no pickup order.
pub fn reconcile<R>(
    pickups: &[Pickup],
    destination: Coordinate,
    date: NaiveDate,
    router: &R,
    options: &DurationOptions,
) -> Result<RouteDuration, RoutingError>
where
    R: RoutingService + ?Sized,
{
    let origins: Vec<Coordinate> = pickups.iter().map(|pickup| pickup.origin).collect();
    let (Some(anchor), Some(latest)) = (
        farthest_origin(&origins, destination),
        pickups.iter().map(|pickup| pickup.scheduled).max(),
    ) else {
        return Ok(RouteDuration {
            estimated_minutes: 0.0,
            real_minutes: None,
            valid: false,
            pickup_order: Vec::new(),
        });
    };

    let estimated_minutes = estimate_duration(&origins, destination, options.average_speed_kmh);

    // Intermediates keep their pickup index so orders map back to trips.
    let intermediates: Vec<usize> = (0..pickups.len()).filter(|index| *index != anchor).collect();
    let request = RouteRequest {
        origin: origins[anchor],
        destination,
        intermediates: intermediates.iter().map(|index| origins[*index]).collect(),
        departure: departure_time(latest, date, options.departure_buffer_minutes),
        optimize_intermediates: intermediates.len() > 1,
    };

    let route = route_with_retry(router, &request, &options.retry)?;
    let visit_order = if request.optimize_intermediates {
        route.intermediate_order(intermediates.len())?
    } else {
        (0..intermediates.len()).collect()
    };
    let real_minutes = route.total_duration_seconds() / 60;
    let valid = real_minutes <= options.max_duration_minutes;

    debug!(
        pickups = pickups.len(),
        estimated_minutes,
        real_minutes,
        limit = options.max_duration_minutes,
        valid,
        "reconciled route duration"
    );

    let mut pickup_order = vec![None; pickups.len()];
    if valid {
        pickup_order[anchor] = Some(1);
        for (position, intermediate) in visit_order.into_iter().enumerate() {
            pickup_order[intermediates[intermediate]] = Some(position as u32 + 2);
        }
    }

    Ok(RouteDuration {
        estimated_minutes,
        real_minutes: Some(real_minutes),
        valid,
        pickup_order,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::routing::{Leg, RouteAlternative, Step};

    const DESTINATION: Coordinate = Coordinate::new(4.60, -74.08);

    /// Returns a fixed duration and order, recording each request.
    struct FixedRouter {
        seconds: u64,
        order: Option<Vec<usize>>,
        requests: Mutex<Vec<RouteRequest>>,
    }

    impl FixedRouter {
        fn new(seconds: u64, order: Option<Vec<usize>>) -> Self {
            Self {
                seconds,
                order,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl RoutingService for FixedRouter {
        fn route(&self, request: &RouteRequest) -> Result<Vec<RouteAlternative>, RoutingError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(vec![RouteAlternative {
                legs: vec![Leg {
                    steps: vec![Step {
                        duration_seconds: self.seconds,
                        encoded_polyline: String::new(),
                    }],
                }],
                optimized_intermediate_order: self.order.clone(),
            }])
        }
    }

    fn pickup(lat: f64, lng: f64, hour: u32, minute: u32) -> Pickup {
        Pickup {
            origin: Coordinate::new(lat, lng),
            scheduled: NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 10, 20).unwrap()
    }

    #[test]
    fn test_farthest_origin() {
        let origins = [
            Coordinate::new(4.62, -74.08),
            Coordinate::new(4.70, -74.08),
            Coordinate::new(4.65, -74.08),
        ];
        assert_eq!(farthest_origin(&origins, DESTINATION), Some(1));
        assert_eq!(farthest_origin(&[], DESTINATION), None);
    }

    #[test]
    fn test_farthest_origin_tie_keeps_first() {
        let origins = [Coordinate::new(4.70, -74.08), Coordinate::new(4.50, -74.08)];
        assert_eq!(farthest_origin(&origins, DESTINATION), Some(0));
    }

    #[test]
    fn test_estimate_starts_at_farthest() {
        let near = Coordinate::new(4.61, -74.08);
        let far = Coordinate::new(4.70, -74.08);
        let forward = estimate_duration(&[near, far], DESTINATION, 30.0);
        let backward = estimate_duration(&[far, near], DESTINATION, 30.0);
        assert!((forward - backward).abs() < 1e-9);
        assert!(forward > 0.0);
    }

    #[test]
    fn test_single_pickup_direct_route() {
        let router = FixedRouter::new(20 * 60 + 59, None);
        let pickups = [pickup(4.70, -74.08, 8, 0)];
        let duration = reconcile(&pickups, DESTINATION, date(), &router, &DurationOptions::default()).unwrap();

        assert_eq!(duration.real_minutes, Some(20));
        assert!(duration.valid);
        assert_eq!(duration.pickup_order, vec![Some(1)]);

        let requests = router.requests.lock().unwrap();
        assert!(!requests[0].optimize_intermediates);
        assert!(requests[0].intermediates.is_empty());
        assert_eq!(requests[0].departure, date().and_hms_opt(7, 50, 0).unwrap());
    }

    #[test]
    fn test_two_pickups_not_optimized() {
        let router = FixedRouter::new(600, None);
        let pickups = [pickup(4.62, -74.08, 8, 0), pickup(4.70, -74.08, 8, 5)];
        let duration = reconcile(&pickups, DESTINATION, date(), &router, &DurationOptions::default()).unwrap();

        assert_eq!(duration.pickup_order, vec![Some(2), Some(1)]);
        let requests = router.requests.lock().unwrap();
        assert!(!requests[0].optimize_intermediates);
        assert_eq!(requests[0].origin, Coordinate::new(4.70, -74.08));
        assert_eq!(requests[0].departure, date().and_hms_opt(7, 55, 0).unwrap());
    }

    #[test]
    fn test_optimized_order_assigns_pickups() {
        // Anchor is index 2; intermediates are pickups [0, 1, 3].
        // The service visits intermediate 2 (pickup 3), then 0, then 1.
        let router = FixedRouter::new(25 * 60, Some(vec![2, 0, 1]));
        let pickups = [
            pickup(4.62, -74.08, 8, 0),
            pickup(4.64, -74.08, 8, 0),
            pickup(4.75, -74.08, 8, 0),
            pickup(4.66, -74.08, 8, 0),
        ];
        let duration = reconcile(&pickups, DESTINATION, date(), &router, &DurationOptions::default()).unwrap();

        assert!(duration.valid);
        assert_eq!(duration.pickup_order, vec![Some(3), Some(4), Some(1), Some(2)]);
        assert!(router.requests.lock().unwrap()[0].optimize_intermediates);
    }

    #[test]
    fn test_exceeded_leaves_group_unvalidated() {
        let router = FixedRouter::new(45 * 60, Some(vec![0, 1]));
        let pickups = [
            pickup(4.62, -74.08, 8, 0),
            pickup(4.64, -74.08, 8, 0),
            pickup(4.75, -74.08, 8, 0),
        ];
        let duration = reconcile(&pickups, DESTINATION, date(), &router, &DurationOptions::default()).unwrap();

        assert_eq!(duration.real_minutes, Some(45));
        assert!(!duration.valid);
        assert!(duration.exceeded());
        assert!(duration.pickup_order.iter().all(Option::is_none));
    }

    #[test]
    fn test_bad_waypoint_order_is_error() {
        let router = FixedRouter::new(600, Some(vec![0, 0]));
        let pickups = [
            pickup(4.62, -74.08, 8, 0),
            pickup(4.64, -74.08, 8, 0),
            pickup(4.75, -74.08, 8, 0),
        ];
        let result = reconcile(&pickups, DESTINATION, date(), &router, &DurationOptions::default());
        assert!(matches!(result, Err(RoutingError::InvalidWaypointOrder { .. })));
    }

    #[test]
    fn test_empty_group() {
        let router = FixedRouter::new(600, None);
        let duration = reconcile(&[], DESTINATION, date(), &router, &DurationOptions::default()).unwrap();
        assert!(!duration.valid);
        assert!(duration.pickup_order.is_empty());
        assert!(router.requests.lock().unwrap().is_empty());
    }
}
