//! End-to-end consolidation over a date range.
//!
//! Each service date is an independent batch. Outbound trips are labeled,
//! split into corridor sub-routes and duration checked; return trips are
//! labeled and inherit the outbound route of the same passenger that day.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::batch::{LabeledTrip, UnprocessableTrip, label_batch, locate};
use crate::config::PipelineConfig;
use crate::consolidation::{ConsolidationOptions, FinalRouteId, RoutedTrip, consolidate};
use crate::duration::{DurationOptions, Pickup, reconcile};
use crate::error::Result;
use crate::routing::{CallCounter, RoutingError};
use crate::traits::{RoutingService, TripSource};
use crate::trip::{Direction, TripRequest};

/// Pipeline step a group failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureStage {
    Corridor,
    Duration,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Corridor => f.write_str("corridor"),
            FailureStage::Duration => f.write_str("duration"),
        }
    }
}

/// A routing failure with the group it happened in.
#[derive(Debug)]
pub struct GroupFailure {
    pub service_date: NaiveDate,
    pub direction: Direction,
    pub stage: FailureStage,
    /// Date-prefixed final route label.
    pub route: String,
    pub seed_service_id: Option<String>,
    pub error: RoutingError,
}

/// A trip with every label the pipeline derived for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedTrip {
    pub trip: TripRequest,
    pub destination_cluster: usize,
    pub time_window: usize,
    /// Also the initial route id.
    pub base_group: usize,
    /// Date-prefixed route label, e.g. `"11-04_3_1"`. For return trips,
    /// the outbound route of the same passenger and date.
    pub final_route: Option<String>,
    pub linear_distance_km: Option<f64>,
    pub estimated_minutes: Option<f64>,
    pub real_minutes: Option<u64>,
    pub pickup_order: Option<u32>,
    pub valid: bool,
}

impl AnnotatedTrip {
    fn from_labeled(labeled: LabeledTrip) -> Self {
        Self {
            trip: labeled.located.trip,
            destination_cluster: labeled.destination_cluster,
            time_window: labeled.time_window,
            base_group: labeled.base_group,
            final_route: None,
            linear_distance_km: None,
            estimated_minutes: None,
            real_minutes: None,
            pickup_order: None,
            valid: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub outbound: Vec<AnnotatedTrip>,
    pub returns: Vec<AnnotatedTrip>,
    pub unprocessable: Vec<UnprocessableTrip>,
    pub failures: Vec<GroupFailure>,
    /// Routing-service calls made during the run.
    pub routing_calls: usize,
}

impl PipelineOutput {
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.returns.is_empty() && self.unprocessable.is_empty()
    }
}

pub struct Pipeline<S, R> {
    source: S,
    router: CallCounter<R>,
    config: PipelineConfig,
}

impl<S, R> Pipeline<S, R>
where
    S: TripSource,
    R: RoutingService,
{
    pub fn new(source: S, router: R, config: PipelineConfig) -> Self {
        Self {
            source,
            router: CallCounter::new(router),
            config,
        }
    }

    /// Runs every service date in `start..=end`.
    pub fn run(&self, start: NaiveDate, end: NaiveDate) -> Result<PipelineOutput> {
        self.config.validate()?;
        let calls_before = self.router.calls();

        let mut trips = self
            .source
            .fetch_trips(start, end, &self.config.service_type_ids)?;
        if let Some(city) = self.config.origin_city_id {
            trips.retain(|trip| trip.origin_city_id == Some(city));
        }

        let mut output = PipelineOutput::default();
        if trips.is_empty() {
            info!(%start, %end, "no trips match the filters");
            return Ok(output);
        }

        let mut by_date: BTreeMap<NaiveDate, Vec<TripRequest>> = BTreeMap::new();
        for trip in trips {
            by_date.entry(trip.service_date).or_default().push(trip);
        }

        for (date, day) in by_date {
            let (outbound, returns): (Vec<_>, Vec<_>) = day
                .into_iter()
                .partition(|trip| trip.direction == Direction::Outbound);
            info!(%date, outbound = outbound.len(), returns = returns.len(), "processing service date");

            let routed = self.run_outbound(date, outbound, &mut output);

            let outbound_routes = OutboundRoutes::new(&routed);
            let returns = self.run_returns(returns, &outbound_routes, &mut output.unprocessable);

            output.outbound.extend(routed);
            output.returns.extend(returns);
        }

        output.routing_calls = self.router.calls() - calls_before;
        info!(
            outbound = output.outbound.len(),
            returns = output.returns.len(),
            unprocessable = output.unprocessable.len(),
            failures = output.failures.len(),
            routing_calls = output.routing_calls,
            "pipeline finished"
        );
        Ok(output)
    }

    fn run_outbound(
        &self,
        date: NaiveDate,
        trips: Vec<TripRequest>,
        output: &mut PipelineOutput,
    ) -> Vec<AnnotatedTrip> {
        let (located, unprocessable) = locate(trips);
        if !unprocessable.is_empty() {
            warn!(%date, count = unprocessable.len(), "outbound trips without coordinates");
        }
        output.unprocessable.extend(unprocessable);
        if located.is_empty() {
            return Vec::new();
        }

        let labeled = label_batch(located, &self.config.label_options());
        let departure_date = self.config.departure_date.unwrap_or(date);
        if is_past(departure_date, self.config.timezone, Utc::now()) {
            warn!(%date, %departure_date, "departure date is in the past, traffic-aware routing may reject it");
        }
        let options = ConsolidationOptions {
            max_corridor_km: self.config.max_corridor_km(),
            departure_buffer_minutes: self.config.departure_buffer_minutes,
            departure_date,
            retry: self.config.retry.clone(),
            max_concurrent_requests: self.config.max_concurrent_requests,
        };
        let consolidated = consolidate(labeled, &self.router, &options);

        let failed_routes: Vec<FinalRouteId> = consolidated
            .failures
            .iter()
            .map(|failure| failure.final_route)
            .collect();
        output.failures.extend(consolidated.failures.into_iter().map(|failure| GroupFailure {
            service_date: date,
            direction: Direction::Outbound,
            stage: FailureStage::Corridor,
            route: route_label(date, failure.final_route),
            seed_service_id: Some(failure.seed_service_id),
            error: failure.error,
        }));

        let mut annotated = Vec::with_capacity(consolidated.trips.len());
        for route in chunk_by_route(consolidated.trips) {
            let final_route = route[0].final_route;
            let mut rows: Vec<AnnotatedTrip> = route
                .iter()
                .map(|routed| {
                    let mut row = AnnotatedTrip::from_labeled(routed.labeled.clone());
                    row.final_route = Some(route_label(date, routed.final_route));
                    row.linear_distance_km = Some(routed.linear_distance_km);
                    row
                })
                .collect();

            if self.config.reconcile_durations && !failed_routes.contains(&final_route) {
                self.reconcile_route(date, final_route, &route, &mut rows, &options, &mut output.failures);
            }
            annotated.extend(rows);
        }
        annotated
    }

    fn reconcile_route(
        &self,
        date: NaiveDate,
        final_route: FinalRouteId,
        route: &[RoutedTrip],
        rows: &mut [AnnotatedTrip],
        options: &ConsolidationOptions,
        failures: &mut Vec<GroupFailure>,
    ) {
        let pickups: Vec<Pickup> = route
            .iter()
            .map(|routed| Pickup {
                origin: routed.labeled.located.origin,
                scheduled: routed.labeled.located.trip.service_time,
            })
            .collect();
        let destination = route[0].labeled.located.destination;
        let duration_options = DurationOptions {
            average_speed_kmh: self.config.average_speed_kmh,
            max_duration_minutes: self.config.max_duration_minutes(),
            departure_buffer_minutes: self.config.departure_buffer_minutes,
            retry: self.config.retry.clone(),
        };

        match reconcile(&pickups, destination, options.departure_date, &self.router, &duration_options) {
            Ok(duration) => {
                if duration.exceeded() {
                    info!(route = %route_label(date, final_route), real_minutes = ?duration.real_minutes, "route exceeds maximum duration");
                }
                for (row, order) in rows.iter_mut().zip(&duration.pickup_order) {
                    row.estimated_minutes = Some(duration.estimated_minutes);
                    row.real_minutes = duration.real_minutes;
                    row.pickup_order = *order;
                    row.valid = duration.valid;
                }
            }
            Err(error) => {
                warn!(route = %route_label(date, final_route), %error, "duration reconciliation failed");
                failures.push(GroupFailure {
                    service_date: date,
                    direction: Direction::Outbound,
                    stage: FailureStage::Duration,
                    route: route_label(date, final_route),
                    seed_service_id: None,
                    error,
                });
            }
        }
    }

    fn run_returns(
        &self,
        trips: Vec<TripRequest>,
        outbound_routes: &OutboundRoutes<'_>,
        unprocessable: &mut Vec<UnprocessableTrip>,
    ) -> Vec<AnnotatedTrip> {
        let (located, missing) = locate(trips);
        unprocessable.extend(missing);

        label_batch(located, &self.config.label_options())
            .into_iter()
            .map(|labeled| {
                let mut row = AnnotatedTrip::from_labeled(labeled);
                row.final_route = outbound_routes
                    .route_for(&row.trip.user_id, row.trip.service_time)
                    .map(str::to_string);
                row
            })
            .collect()
    }
}

/// Outbound route labels of one service date, per user, in scheduled order.
struct OutboundRoutes<'a> {
    by_user: HashMap<&'a str, Vec<(NaiveTime, &'a str)>>,
}

impl<'a> OutboundRoutes<'a> {
    fn new(outbound: &'a [AnnotatedTrip]) -> Self {
        let mut by_user: HashMap<&str, Vec<(NaiveTime, &str)>> = HashMap::new();
        for row in outbound {
            if let Some(route) = row.final_route.as_deref() {
                by_user
                    .entry(row.trip.user_id.as_str())
                    .or_default()
                    .push((row.trip.service_time, route));
            }
        }
        for trips in by_user.values_mut() {
            trips.sort();
        }
        Self { by_user }
    }

    /// Route of the user's latest outbound trip scheduled at or before
    /// `time`, or of their earliest one when none precedes it.
    fn route_for(&self, user_id: &str, time: NaiveTime) -> Option<&'a str> {
        let trips = self.by_user.get(user_id)?;
        if trips.len() > 1 {
            debug!(user_id, outbound = trips.len(), "pairing return with outbound by time");
        }
        trips
            .iter()
            .rev()
            .find(|(scheduled, _)| *scheduled <= time)
            .or_else(|| trips.first())
            .map(|(_, route)| *route)
    }
}

/// True when `date` is before today in `zone`.
fn is_past(date: NaiveDate, zone: Tz, now: DateTime<Utc>) -> bool {
    date < now.with_timezone(&zone).date_naive()
}

/// Route label shown to operators: `"MM-DD_{initial}_{sequence}"`.
pub fn route_label(date: NaiveDate, route: FinalRouteId) -> String {
    format!("{}_{}", date.format("%m-%d"), route)
}

/// Splits trips sorted by final route into one vector per route.
fn chunk_by_route(trips: Vec<RoutedTrip>) -> Vec<Vec<RoutedTrip>> {
    let mut routes: Vec<Vec<RoutedTrip>> = Vec::new();
    for trip in trips {
        match routes.last_mut() {
            Some(route) if route[0].final_route == trip.final_route => route.push(trip),
            _ => routes.push(vec![trip]),
        }
    }
    routes
}
