//! Corridor-based route consolidation.
//!
//! Each base group becomes an initial route, which is split into sub-routes
//! by repeatedly routing its farthest remaining passenger to the shared
//! destination and taking every passenger whose origin lies near that road
//! path. One routing call is made per sub-route.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::batch::LabeledTrip;
use crate::geodesy::geodesic_km;
use crate::routing::{RetryPolicy, RouteRequest, RoutingError, route_with_retry};
use crate::traits::RoutingService;

#[derive(Debug, Clone)]
pub struct ConsolidationOptions {
    /// Maximum distance from an origin to the seed's road path, in km.
    pub max_corridor_km: f64,
    /// Departure is this many minutes before the group's latest time.
    pub departure_buffer_minutes: u32,
    /// Nominal date the departure time is anchored on.
    pub departure_date: NaiveDate,
    pub retry: RetryPolicy,
    /// Worker threads for independent initial routes; 1 runs inline.
    pub max_concurrent_requests: usize,
}

impl ConsolidationOptions {
    pub fn new(departure_date: NaiveDate) -> Self {
        Self {
            max_corridor_km: 2.0,
            departure_buffer_minutes: 10,
            departure_date,
            retry: RetryPolicy::default(),
            max_concurrent_requests: 1,
        }
    }
}

/// Identity of a sub-route: the initial route it came from plus a
/// 1-based sequence number. Displays as `"{initial}_{sequence}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FinalRouteId {
    pub initial_route: usize,
    pub sequence: u32,
}

impl fmt::Display for FinalRouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.initial_route, self.sequence)
    }
}

/// A labeled trip placed on a sub-route.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedTrip {
    pub labeled: LabeledTrip,
    pub initial_route: usize,
    pub final_route: FinalRouteId,
    /// Geodesic origin-to-destination distance in kilometers.
    pub linear_distance_km: f64,
}

/// A sub-route whose seed could not be routed. The seed still gets its
/// own sub-route so the partition stays exhaustive.
#[derive(Debug)]
pub struct CorridorFailure {
    pub final_route: FinalRouteId,
    pub seed_service_id: String,
    pub error: RoutingError,
}

#[derive(Debug, Default)]
pub struct ConsolidationResult {
    /// Ordered by initial route, final route, then distance descending.
    pub trips: Vec<RoutedTrip>,
    pub failures: Vec<CorridorFailure>,
}

/// Splits every base group of the batch into corridor sub-routes.
pub fn consolidate<R>(
    labeled: Vec<LabeledTrip>,
    router: &R,
    options: &ConsolidationOptions,
) -> ConsolidationResult
where
    R: RoutingService + ?Sized,
{
    let groups = initial_routes(labeled);
    info!(
        initial_routes = groups.len(),
        workers = options.max_concurrent_requests,
        "consolidating routes"
    );

    let split = |(initial_route, rows): (usize, Vec<Candidate>)| {
        split_initial_route(initial_route, rows, router, options)
    };

    let outcomes: Vec<(Vec<RoutedTrip>, Vec<CorridorFailure>)> = if options.max_concurrent_requests > 1 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(options.max_concurrent_requests)
            .build()
        {
            Ok(pool) => pool.install(|| groups.into_par_iter().map(split).collect()),
            Err(err) => {
                warn!(error = %err, "could not start worker pool, consolidating sequentially");
                groups.into_iter().map(split).collect()
            }
        }
    } else {
        groups.into_iter().map(split).collect()
    };

    let mut result = ConsolidationResult::default();
    for (trips, failures) in outcomes {
        result.trips.extend(trips);
        result.failures.extend(failures);
    }
    sort_routed(&mut result.trips);
    result.failures.sort_by_key(|failure| failure.final_route);
    result
}

/// Departure time for a group: the latest scheduled time on `date`, minus
/// the buffer.
pub fn departure_time(latest: NaiveTime, date: NaiveDate, buffer_minutes: u32) -> NaiveDateTime {
    date.and_time(latest) - chrono::Duration::minutes(i64::from(buffer_minutes))
}

/// Final output order: (initial route, final route, distance descending).
pub fn sort_routed(trips: &mut [RoutedTrip]) {
    trips.sort_by(|a, b| {
        a.initial_route
            .cmp(&b.initial_route)
            .then(a.final_route.cmp(&b.final_route))
            .then(b.linear_distance_km.total_cmp(&a.linear_distance_km))
    });
}

// ============================================================================
// Partitioning
// ============================================================================

struct Candidate {
    labeled: LabeledTrip,
    linear_distance_km: f64,
}

/// Groups trips by base group, each sorted farthest-first.
fn initial_routes(labeled: Vec<LabeledTrip>) -> Vec<(usize, Vec<Candidate>)> {
    let mut groups: BTreeMap<usize, Vec<Candidate>> = BTreeMap::new();
    for trip in labeled {
        let linear_distance_km = geodesic_km(trip.located.origin, trip.located.destination);
        groups.entry(trip.base_group).or_default().push(Candidate {
            labeled: trip,
            linear_distance_km,
        });
    }

    groups
        .into_iter()
        .map(|(initial_route, mut rows)| {
            rows.sort_by(|a, b| b.linear_distance_km.total_cmp(&a.linear_distance_km));
            (initial_route, rows)
        })
        .collect()
}

fn split_initial_route<R>(
    initial_route: usize,
    rows: Vec<Candidate>,
    router: &R,
    options: &ConsolidationOptions,
) -> (Vec<RoutedTrip>, Vec<CorridorFailure>)
where
    R: RoutingService + ?Sized,
{
    let Some(latest) = rows.iter().map(|row| row.labeled.located.trip.service_time).max() else {
        return (Vec::new(), Vec::new());
    };
    let departure = departure_time(latest, options.departure_date, options.departure_buffer_minutes);
    debug!(initial_route, passengers = rows.len(), %departure, "splitting initial route");

    let mut routed = Vec::with_capacity(rows.len());
    let mut failures = Vec::new();
    let mut remaining = rows;
    let mut sequence = 1;

    while !remaining.is_empty() {
        let final_route = FinalRouteId { initial_route, sequence };
        let seed = &remaining[0].labeled.located;
        let request = RouteRequest::direct(seed.origin, seed.destination, departure);

        let corridor = route_with_retry(router, &request, &options.retry)
            .and_then(|route| route.corridor())
            .and_then(|corridor| {
                if corridor.is_empty() {
                    Err(RoutingError::EmptyCorridor)
                } else {
                    Ok(corridor)
                }
            });

        // The seed always rides its own sub-route, even if its origin is
        // off the returned path.
        let on_route: Vec<bool> = match &corridor {
            Ok(corridor) => remaining
                .iter()
                .enumerate()
                .map(|(index, row)| {
                    index == 0 || corridor.passes_near(row.labeled.located.origin, options.max_corridor_km)
                })
                .collect(),
            Err(_) => (0..remaining.len()).map(|index| index == 0).collect(),
        };

        if let Err(error) = corridor {
            warn!(%final_route, seed = %seed.trip.service_id, %error, "no corridor for seed");
            failures.push(CorridorFailure {
                final_route,
                seed_service_id: seed.trip.service_id.clone(),
                error,
            });
        }

        let (taken, mut left): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .zip(on_route)
            .partition(|(_, near)| *near);
        let mut taken: Vec<Candidate> = taken.into_iter().map(|(row, _)| row).collect();

        // A lone leftover joins this sub-route instead of costing another call.
        if left.len() == 1 {
            debug!(%final_route, "merging lone leftover passenger");
            taken.extend(left.drain(..).map(|(row, _)| row));
        }

        debug!(%final_route, passengers = taken.len(), "sub-route formed");
        routed.extend(taken.into_iter().map(|row| RoutedTrip {
            labeled: row.labeled,
            initial_route,
            final_route,
            linear_distance_km: row.linear_distance_km,
        }));

        remaining = left.into_iter().map(|(row, _)| row).collect();
        sequence += 1;
    }

    (routed, failures)
}
