//! Routing-service request/response model, retries and call accounting.
//!
//! Adapters for concrete services live in submodules; the consolidation
//! core only sees [`RoutingService`](crate::traits::RoutingService).

pub mod google;
pub mod osrm;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::polyline::Polyline;
use crate::traits::RoutingService;
use crate::trip::Coordinate;

/// Service statuses worth retrying. `OVER_QUERY_LIMIT` and `UNKNOWN_ERROR`
/// are Google Directions codes; OSRM reports no transient codes in its body.
const TRANSIENT_STATUSES: &[&str] = &["OVER_QUERY_LIMIT", "UNKNOWN_ERROR"];

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("routing request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("routing service returned status {status}: {message}")]
    Status { status: String, message: String },

    #[error("routing service returned no route")]
    NoRoute,

    #[error("route geometry is empty")]
    EmptyCorridor,

    #[error("invalid polyline: {0}")]
    Polyline(String),

    #[error("invalid optimized waypoint order {order:?} for {expected} intermediate stops")]
    InvalidWaypointOrder { order: Vec<usize>, expected: usize },
}

impl RoutingError {
    /// Transport failures (timeouts included), quota exhaustion and
    /// server-side errors may succeed on a later attempt. Rejected requests
    /// and everything else are deterministic.
    pub fn is_retryable(&self) -> bool {
        match self {
            RoutingError::Transport(_) => true,
            RoutingError::Status { status, .. } => TRANSIENT_STATUSES.contains(&status.as_str()),
            _ => false,
        }
    }
}

/// An ordered list of stops to route through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub intermediates: Vec<Coordinate>,
    pub departure: NaiveDateTime,
    pub optimize_intermediates: bool,
}

impl RouteRequest {
    /// Origin to destination with no intermediate stops.
    pub fn direct(origin: Coordinate, destination: Coordinate, departure: NaiveDateTime) -> Self {
        Self {
            origin,
            destination,
            intermediates: Vec::new(),
            departure,
            optimize_intermediates: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub duration_seconds: u64,
    pub encoded_polyline: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Leg {
    pub steps: Vec<Step>,
}

/// One route returned by the service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteAlternative {
    pub legs: Vec<Leg>,
    /// Visiting order of the request's intermediates: entry `k` is the index
    /// of the intermediate visited `k`-th. Present when optimization was
    /// requested.
    pub optimized_intermediate_order: Option<Vec<usize>>,
}

impl RouteAlternative {
    pub fn total_duration_seconds(&self) -> u64 {
        self.legs
            .iter()
            .flat_map(|leg| &leg.steps)
            .map(|step| step.duration_seconds)
            .sum()
    }

    /// Decodes and concatenates every step geometry in leg order.
    pub fn corridor(&self) -> Result<Polyline, RoutingError> {
        let mut corridor = Polyline::default();
        for step in self.legs.iter().flat_map(|leg| &leg.steps) {
            corridor.extend(Polyline::decode(&step.encoded_polyline).map_err(RoutingError::Polyline)?);
        }
        Ok(corridor)
    }

    /// Validated visiting order for `count` intermediates; identity when the
    /// service did not reorder.
    pub fn intermediate_order(&self, count: usize) -> Result<Vec<usize>, RoutingError> {
        let Some(order) = &self.optimized_intermediate_order else {
            return Ok((0..count).collect());
        };
        let mut seen = vec![false; count];
        let is_permutation = order.len() == count
            && order.iter().all(|&index| index < count && !std::mem::replace(&mut seen[index], true));
        if is_permutation {
            Ok(order.clone())
        } else {
            Err(RoutingError::InvalidWaypointOrder {
                order: order.clone(),
                expected: count,
            })
        }
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis((self.initial_backoff_ms as f64 * factor).round() as u64)
    }
}

/// Requests a route and returns its first alternative.
///
/// Retryable errors are retried up to `policy.max_attempts` in total; an
/// empty alternative list is reported as [`RoutingError::NoRoute`].
pub fn route_with_retry<R: RoutingService + ?Sized>(
    router: &R,
    request: &RouteRequest,
    policy: &RetryPolicy,
) -> Result<RouteAlternative, RoutingError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match router.route(request) {
            Ok(alternatives) => {
                return alternatives.into_iter().next().ok_or(RoutingError::NoRoute);
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let wait = policy.backoff(attempt);
                warn!(attempt, max_attempts, ?wait, error = %err, "routing call failed, retrying");
                std::thread::sleep(wait);
                attempt += 1;
            }
            Err(err) => {
                debug!(attempt, error = %err, "routing call failed");
                return Err(err);
            }
        }
    }
}

/// Wraps a routing service and counts the calls made through it.
#[derive(Debug)]
pub struct CallCounter<R> {
    inner: R,
    calls: AtomicUsize,
}

impl<R> CallCounter<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl<R: RoutingService> RoutingService for CallCounter<R> {
    fn route(&self, request: &RouteRequest) -> Result<Vec<RouteAlternative>, RoutingError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.route(request)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::NaiveDate;

    use super::*;

    fn departure() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 11, 4)
            .unwrap()
            .and_hms_opt(7, 50, 0)
            .unwrap()
    }

    fn request() -> RouteRequest {
        RouteRequest::direct(Coordinate::new(4.7, -74.05), Coordinate::new(4.6, -74.08), departure())
    }

    fn step(seconds: u64, points: &[(f64, f64)]) -> Step {
        let polyline = Polyline::new(points.iter().copied().map(Coordinate::from).collect());
        Step {
            duration_seconds: seconds,
            encoded_polyline: polyline.encode().unwrap(),
        }
    }

    /// Replays a scripted sequence of responses.
    struct Scripted {
        responses: Mutex<Vec<Result<Vec<RouteAlternative>, RoutingError>>>,
    }

    impl Scripted {
        fn new(mut responses: Vec<Result<Vec<RouteAlternative>, RoutingError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    impl RoutingService for Scripted {
        fn route(&self, _request: &RouteRequest) -> Result<Vec<RouteAlternative>, RoutingError> {
            self.responses.lock().unwrap().pop().unwrap_or(Err(RoutingError::NoRoute))
        }
    }

    fn unavailable() -> RoutingError {
        RoutingError::Status {
            status: "UNKNOWN_ERROR".to_string(),
            message: String::new(),
        }
    }

    fn quick_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    #[test]
    fn test_total_duration_sums_all_legs() {
        let alternative = RouteAlternative {
            legs: vec![
                Leg { steps: vec![step(60, &[(1.0, 1.0)]), step(30, &[(1.0, 1.1)])] },
                Leg { steps: vec![step(15, &[(1.0, 1.2)])] },
            ],
            optimized_intermediate_order: None,
        };
        assert_eq!(alternative.total_duration_seconds(), 105);
    }

    #[test]
    fn test_corridor_concatenates_steps() {
        let alternative = RouteAlternative {
            legs: vec![
                Leg { steps: vec![step(1, &[(4.7, -74.05), (4.68, -74.06)])] },
                Leg { steps: vec![step(1, &[(4.65, -74.07), (4.6, -74.08)])] },
            ],
            optimized_intermediate_order: None,
        };
        let corridor = alternative.corridor().unwrap();
        assert_eq!(corridor.points().len(), 4);
        assert!((corridor.points()[3].lat - 4.6).abs() < 1e-5);
    }

    #[test]
    fn test_intermediate_order_validation() {
        let mut alternative = RouteAlternative::default();
        assert_eq!(alternative.intermediate_order(3).unwrap(), vec![0, 1, 2]);

        alternative.optimized_intermediate_order = Some(vec![2, 0, 1]);
        assert_eq!(alternative.intermediate_order(3).unwrap(), vec![2, 0, 1]);

        alternative.optimized_intermediate_order = Some(vec![0, 0, 1]);
        assert!(alternative.intermediate_order(3).is_err());

        alternative.optimized_intermediate_order = Some(vec![0, 1]);
        assert!(alternative.intermediate_order(3).is_err());
    }

    #[test]
    fn test_retry_recovers_from_transient_failure() {
        let router = CallCounter::new(Scripted::new(vec![
            Err(unavailable()),
            Ok(vec![RouteAlternative::default()]),
        ]));
        let result = route_with_retry(&router, &request(), &quick_retry(3));
        assert!(result.is_ok());
        assert_eq!(router.calls(), 2);
    }

    #[test]
    fn test_retry_is_bounded() {
        let router = CallCounter::new(Scripted::new(vec![
            Err(unavailable()),
            Err(unavailable()),
            Err(unavailable()),
            Ok(vec![RouteAlternative::default()]),
        ]));
        let result = route_with_retry(&router, &request(), &quick_retry(3));
        assert!(matches!(result, Err(RoutingError::Status { .. })));
        assert_eq!(router.calls(), 3);
    }

    #[test]
    fn test_rejected_request_is_not_retried() {
        let denied = RoutingError::Status {
            status: "REQUEST_DENIED".to_string(),
            message: "invalid key".to_string(),
        };
        assert!(!denied.is_retryable());
        assert!(unavailable().is_retryable());

        let router = CallCounter::new(Scripted::new(vec![
            Err(denied),
            Ok(vec![RouteAlternative::default()]),
        ]));
        let result = route_with_retry(&router, &request(), &quick_retry(3));
        assert!(matches!(result, Err(RoutingError::Status { ref status, .. }) if status == "REQUEST_DENIED"));
        assert_eq!(router.calls(), 1);
    }

    #[test]
    fn test_osrm_invalid_query_is_not_retried() {
        let error = RoutingError::Status {
            status: "InvalidQuery".to_string(),
            message: String::new(),
        };
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_empty_response_is_no_route_without_retry() {
        let router = CallCounter::new(Scripted::new(vec![Ok(vec![])]));
        let result = route_with_retry(&router, &request(), &quick_retry(3));
        assert!(matches!(result, Err(RoutingError::NoRoute)));
        assert_eq!(router.calls(), 1);
    }

    #[test]
    fn test_backoff_grows() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
    }
}
