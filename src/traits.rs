//! Seams to the external collaborators of the consolidation pipeline.
//!
//! Tests drive the pipeline through fakes of both; production uses CSV
//! exports and the Google Directions or OSRM adapters.

use chrono::NaiveDate;

use crate::error::Result;
use crate::routing::{RouteAlternative, RouteRequest, RoutingError};
use crate::trip::TripRequest;

/// Provides raw trip requests for a date range.
pub trait TripSource {
    /// Trips with `start <= service_date <= end` whose service type is in
    /// `service_type_ids` (all types when empty).
    ///
    /// Missing coordinates are returned as `None`, never dropped here.
    fn fetch_trips(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        service_type_ids: &[u32],
    ) -> Result<Vec<TripRequest>>;
}

/// Computes road routes through an ordered list of stops.
///
/// Implementations must be shareable across worker threads; the pipeline
/// may fan out over independent groups.
pub trait RoutingService: Sync {
    /// Route alternatives for the request. Only the first one is consumed.
    fn route(&self, request: &RouteRequest) -> std::result::Result<Vec<RouteAlternative>, RoutingError>;
}

impl<R: RoutingService + ?Sized> RoutingService for &R {
    fn route(&self, request: &RouteRequest) -> std::result::Result<Vec<RouteAlternative>, RoutingError> {
        (**self).route(request)
    }
}
