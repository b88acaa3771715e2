//! Batch preparation: coordinate separation and labeling.
//!
//! Labeling is expressed as pure transformations: each stage consumes the
//! sequence produced by the previous one and returns a new labeled
//! sequence, so no row is mutated in place.

use serde::Serialize;
use tracing::debug;

use crate::base_group::assign_base_groups;
use crate::clustering::cluster_destinations;
use crate::trip::{Coordinate, TripRequest};
use crate::windowing::assign_time_windows;

/// Which coordinates a record lacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MissingCoordinate {
    Origin,
    Destination,
    Both,
}

/// A record excluded from consolidation, reported back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct UnprocessableTrip {
    pub trip: TripRequest,
    pub missing: MissingCoordinate,
}

/// A trip with both coordinates present.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedTrip {
    pub trip: TripRequest,
    pub origin: Coordinate,
    pub destination: Coordinate,
}

/// A located trip with its grouping labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTrip {
    pub located: LocatedTrip,
    pub destination_cluster: usize,
    pub time_window: usize,
    pub base_group: usize,
}

/// Parameters for [`label_batch`].
#[derive(Debug, Clone)]
pub struct LabelOptions {
    pub cluster_radius_m: f64,
    pub window_threshold_minutes: u32,
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self {
            cluster_radius_m: crate::clustering::DEFAULT_CLUSTER_RADIUS_M,
            window_threshold_minutes: crate::windowing::DEFAULT_WINDOW_THRESHOLD_MINUTES,
        }
    }
}

/// Splits trips into located ones and those missing a coordinate.
///
/// Relative order is preserved on both sides.
pub fn locate(trips: Vec<TripRequest>) -> (Vec<LocatedTrip>, Vec<UnprocessableTrip>) {
    let mut located = Vec::with_capacity(trips.len());
    let mut unprocessable = Vec::new();

    for trip in trips {
        match (trip.origin, trip.destination) {
            (Some(origin), Some(destination)) => located.push(LocatedTrip {
                trip,
                origin,
                destination,
            }),
            (origin, destination) => {
                let missing = match (origin, destination) {
                    (None, None) => MissingCoordinate::Both,
                    (None, _) => MissingCoordinate::Origin,
                    _ => MissingCoordinate::Destination,
                };
                unprocessable.push(UnprocessableTrip { trip, missing });
            }
        }
    }

    (located, unprocessable)
}

/// Assigns destination clusters, time windows and base groups.
///
/// Trips are first ordered by (destination city, scheduled time), which is
/// the scan order for both clustering and windowing. The result is ordered
/// by (time window, destination cluster), the order base groups are
/// numbered in.
pub fn label_batch(mut located: Vec<LocatedTrip>, options: &LabelOptions) -> Vec<LabeledTrip> {
    located.sort_by(|a, b| {
        a.trip
            .destination_city
            .cmp(&b.trip.destination_city)
            .then(a.trip.service_time.cmp(&b.trip.service_time))
    });

    let destinations: Vec<Coordinate> = located.iter().map(|trip| trip.destination).collect();
    let clusters = cluster_destinations(&destinations, options.cluster_radius_m);

    let times: Vec<_> = located.iter().map(|trip| trip.trip.service_time).collect();
    let windows = assign_time_windows(&times, options.window_threshold_minutes);

    let mut labeled: Vec<(LocatedTrip, usize, usize)> = located
        .into_iter()
        .zip(clusters)
        .zip(windows)
        .map(|((trip, cluster), window)| (trip, cluster, window))
        .collect();
    labeled.sort_by_key(|(_, cluster, window)| (*window, *cluster));

    let keys: Vec<(usize, usize)> = labeled
        .iter()
        .map(|(_, cluster, window)| (*window, *cluster))
        .collect();
    let groups = assign_base_groups(&keys);

    debug!(
        trips = labeled.len(),
        base_groups = groups.last().map_or(0, |last| last + 1),
        "labeled batch"
    );

    labeled
        .into_iter()
        .zip(groups)
        .map(|((located, destination_cluster, time_window), base_group)| LabeledTrip {
            located,
            destination_cluster,
            time_window,
            base_group,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::trip::Direction;

    fn trip(id: &str, time: (u32, u32), origin: Option<(f64, f64)>, destination: Option<(f64, f64)>) -> TripRequest {
        let mut trip = TripRequest::new(
            id,
            format!("user-{}", id),
            NaiveDate::from_ymd_opt(2023, 11, 4).unwrap(),
            NaiveTime::from_hms_opt(time.0, time.1, 0).unwrap(),
            Direction::Outbound,
        );
        trip.origin = origin.map(Coordinate::from);
        trip.destination = destination.map(Coordinate::from);
        trip
    }

    #[test]
    fn test_locate_separates_missing() {
        let trips = vec![
            trip("a", (8, 0), Some((4.7, -74.1)), Some((4.6, -74.08))),
            trip("b", (8, 0), None, Some((4.6, -74.08))),
            trip("c", (8, 0), Some((4.7, -74.1)), None),
            trip("d", (8, 0), None, None),
        ];
        let (located, unprocessable) = locate(trips);

        assert_eq!(located.len(), 1);
        assert_eq!(located[0].trip.service_id, "a");
        let missing: Vec<_> = unprocessable.iter().map(|u| (u.trip.service_id.as_str(), u.missing)).collect();
        assert_eq!(
            missing,
            vec![
                ("b", MissingCoordinate::Origin),
                ("c", MissingCoordinate::Destination),
                ("d", MissingCoordinate::Both),
            ]
        );
    }

    #[test]
    fn test_label_example_scenario() {
        let destination = Some((4.60, -74.08));
        let trips = vec![
            trip("late", (8, 40), Some((4.62, -74.08)), destination),
            trip("early", (8, 0), Some((4.7, -74.05)), destination),
            trip("mid", (8, 5), Some((4.7004, -74.05)), destination),
        ];
        let (located, _) = locate(trips);
        let labeled = label_batch(located, &LabelOptions::default());

        let summary: Vec<_> = labeled
            .iter()
            .map(|t| (t.located.trip.service_id.as_str(), t.time_window, t.destination_cluster, t.base_group))
            .collect();
        assert_eq!(
            summary,
            vec![("early", 0, 0, 0), ("mid", 0, 0, 0), ("late", 1, 0, 1)]
        );
    }

    #[test]
    fn test_label_separates_far_destinations_in_same_window() {
        let trips = vec![
            trip("a", (8, 0), Some((4.7, -74.05)), Some((4.60, -74.08))),
            trip("b", (8, 2), Some((4.7, -74.05)), Some((4.65, -74.10))),
            trip("c", (8, 4), Some((4.7, -74.05)), Some((4.60, -74.08))),
        ];
        let (located, _) = locate(trips);
        let labeled = label_batch(located, &LabelOptions::default());

        let groups: Vec<_> = labeled
            .iter()
            .map(|t| (t.located.trip.service_id.as_str(), t.base_group))
            .collect();
        assert_eq!(groups, vec![("a", 0), ("c", 0), ("b", 1)]);
    }
}
