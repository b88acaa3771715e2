//! OSRM HTTP adapter.
//!
//! Direct requests use the `route` service. Requests that ask for an
//! optimized intermediate order use the `trip` service pinned to the first
//! and last coordinates. OSRM has no traffic model, so the departure time
//! is not sent.

use serde::Deserialize;

use super::{Leg, RouteAlternative, RouteRequest, RoutingError, Step};
use crate::traits::RoutingService;

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn url(&self, service: &str, request: &RouteRequest) -> String {
        let coords = std::iter::once(&request.origin)
            .chain(&request.intermediates)
            .chain(std::iter::once(&request.destination))
            .map(|coord| format!("{:.6},{:.6}", coord.lng, coord.lat))
            .collect::<Vec<_>>()
            .join(";");

        let options = if service == "trip" {
            "source=first&destination=last&roundtrip=false&steps=true&geometries=polyline&overview=false"
        } else {
            "steps=true&geometries=polyline&overview=false"
        };

        format!(
            "{}/{}/v1/{}/{}?{}",
            self.config.base_url, service, self.config.profile, coords, options
        )
    }
}

impl RoutingService for OsrmClient {
    fn route(&self, request: &RouteRequest) -> Result<Vec<RouteAlternative>, RoutingError> {
        let optimize = request.optimize_intermediates && request.intermediates.len() > 1;
        let service = if optimize { "trip" } else { "route" };

        let body = self
            .client
            .get(self.url(service, request))
            .send()
            .and_then(|resp| resp.json::<OsrmResponse>())?;

        match body.code.as_str() {
            "Ok" => {}
            "NoRoute" | "NoTrips" | "NoSegment" => return Ok(Vec::new()),
            _ => {
                return Err(RoutingError::Status {
                    status: body.code,
                    message: body.message.unwrap_or_default(),
                });
            }
        }

        if optimize {
            let order = intermediate_order(&body.waypoints, request.intermediates.len());
            Ok(body
                .trips
                .into_iter()
                .take(1)
                .map(|trip| trip.into_alternative(Some(order.clone())))
                .collect())
        } else {
            Ok(body
                .routes
                .into_iter()
                .map(|route| route.into_alternative(None))
                .collect())
        }
    }
}

/// Converts trip waypoint positions into the visiting order of the
/// intermediates. Waypoints are listed in input order, `waypoint_index`
/// being the position in the trip; intermediates occupy inputs `1..=count`.
fn intermediate_order(waypoints: &[OsrmWaypoint], count: usize) -> Vec<usize> {
    let mut visits: Vec<(usize, usize)> = waypoints
        .iter()
        .enumerate()
        .skip(1)
        .take(count)
        .map(|(input, waypoint)| (waypoint.waypoint_index, input - 1))
        .collect();
    visits.sort_unstable();
    visits.into_iter().map(|(_, intermediate)| intermediate).collect()
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
    #[serde(default)]
    trips: Vec<OsrmRoute>,
    #[serde(default)]
    waypoints: Vec<OsrmWaypoint>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

impl OsrmRoute {
    fn into_alternative(self, order: Option<Vec<usize>>) -> RouteAlternative {
        RouteAlternative {
            legs: self
                .legs
                .into_iter()
                .map(|leg| Leg {
                    steps: leg
                        .steps
                        .into_iter()
                        .map(|step| Step {
                            duration_seconds: step.duration.round() as u64,
                            encoded_polyline: step.geometry,
                        })
                        .collect(),
                })
                .collect(),
            optimized_intermediate_order: order,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    duration: f64,
    #[serde(default)]
    geometry: String,
}

#[derive(Debug, Deserialize)]
struct OsrmWaypoint {
    #[serde(default)]
    waypoint_index: usize,
}
