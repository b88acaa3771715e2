//! Google Directions HTTP adapter.

use chrono::{Duration, NaiveDateTime};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::debug;

use super::{Leg, RouteAlternative, RouteRequest, RoutingError, Step};
use crate::traits::RoutingService;
use crate::trip::Coordinate;

/// Environment variable holding the Directions API key.
pub const API_KEY_ENV: &str = "GOOGLE_MAPS_API_KEY";

#[derive(Debug, Clone)]
pub struct GoogleDirectionsConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    /// Zone of the wall-clock departure times in requests.
    pub timezone: Tz,
}

impl Default for GoogleDirectionsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://maps.googleapis.com/maps/api/directions/json".to_string(),
            api_key: String::new(),
            timeout_secs: 10,
            timezone: Tz::UTC,
        }
    }
}

impl GoogleDirectionsConfig {
    pub fn new(api_key: impl Into<String>, timezone: Tz) -> Self {
        Self {
            api_key: api_key.into(),
            timezone,
            ..Self::default()
        }
    }

    /// Config with the API key taken from [`API_KEY_ENV`].
    pub fn from_env(timezone: Tz) -> Option<Self> {
        let api_key = std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty())?;
        Some(Self::new(api_key, timezone))
    }
}

#[derive(Debug, Clone)]
pub struct GoogleDirectionsClient {
    config: GoogleDirectionsConfig,
    client: reqwest::blocking::Client,
}

impl GoogleDirectionsClient {
    pub fn new(config: GoogleDirectionsConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Unix time of a wall-clock departure in the configured zone. A time
    /// skipped by a DST jump moves forward by an hour.
    fn departure_timestamp(&self, departure: NaiveDateTime) -> i64 {
        let zone = self.config.timezone;
        departure
            .and_local_timezone(zone)
            .earliest()
            .or_else(|| (departure + Duration::hours(1)).and_local_timezone(zone).earliest())
            .map_or_else(|| departure.and_utc().timestamp(), |local| local.timestamp())
    }
}

fn waypoints_param(request: &RouteRequest) -> Option<String> {
    if request.intermediates.is_empty() {
        return None;
    }
    let mut parts: Vec<String> = Vec::with_capacity(request.intermediates.len() + 1);
    if request.optimize_intermediates {
        parts.push("optimize:true".to_string());
    }
    parts.extend(request.intermediates.iter().map(Coordinate::to_string));
    Some(parts.join("|"))
}

impl RoutingService for GoogleDirectionsClient {
    fn route(&self, request: &RouteRequest) -> Result<Vec<RouteAlternative>, RoutingError> {
        let mut query = vec![
            ("origin", request.origin.to_string()),
            ("destination", request.destination.to_string()),
            ("departure_time", self.departure_timestamp(request.departure).to_string()),
            ("key", self.config.api_key.clone()),
        ];
        if let Some(waypoints) = waypoints_param(request) {
            query.push(("waypoints", waypoints));
        }

        let body = self
            .client
            .get(&self.config.base_url)
            .query(&query)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<DirectionsResponse>())?;

        debug!(status = %body.status, routes = body.routes.len(), "directions response");

        match body.status.as_str() {
            "OK" => Ok(body
                .routes
                .into_iter()
                .map(|route| route.into_alternative(request.optimize_intermediates))
                .collect()),
            "ZERO_RESULTS" | "NOT_FOUND" => Ok(Vec::new()),
            _ => Err(RoutingError::Status {
                status: body.status,
                message: body.error_message.unwrap_or_default(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    #[serde(default)]
    legs: Vec<DirectionsLeg>,
    #[serde(default)]
    waypoint_order: Vec<usize>,
}

impl DirectionsRoute {
    fn into_alternative(self, optimized: bool) -> RouteAlternative {
        RouteAlternative {
            legs: self
                .legs
                .into_iter()
                .map(|leg| Leg {
                    steps: leg
                        .steps
                        .into_iter()
                        .map(|step| Step {
                            duration_seconds: step.duration.value,
                            encoded_polyline: step.polyline.points,
                        })
                        .collect(),
                })
                .collect(),
            optimized_intermediate_order: optimized.then_some(self.waypoint_order),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DirectionsLeg {
    #[serde(default)]
    steps: Vec<DirectionsStep>,
}

#[derive(Debug, Deserialize)]
struct DirectionsStep {
    duration: TextValue,
    polyline: EncodedPoints,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct EncodedPoints {
    points: String,
}
