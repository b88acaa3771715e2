//! Trip request data model.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// A (latitude, longitude) pair in decimal degrees.
///
/// Equality is exact; matching between trips never applies a tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Service direction of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    /// Passenger travels to the shared destination ("ida").
    Outbound,
    /// Passenger travels back from the shared destination ("retorno").
    Return,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outbound => "outbound",
            Direction::Return => "return",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ida" | "outbound" => Ok(Direction::Outbound),
            "retorno" | "return" => Ok(Direction::Return),
            other => Err(format!("unknown service direction '{}'", other)),
        }
    }
}

/// One passenger's trip as returned by the record provider.
///
/// Source fields are never rewritten; derived labels live in wrapper types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRequest {
    pub service_id: String,
    pub user_id: String,
    pub user_name: String,
    pub service_date: NaiveDate,
    pub service_time: NaiveTime,
    pub direction: Direction,
    pub service_type_id: u32,
    pub origin: Option<Coordinate>,
    pub destination: Option<Coordinate>,
    pub origin_city_id: Option<u32>,
    pub destination_city_id: Option<u32>,
    pub origin_city: String,
    pub destination_city: String,
    pub origin_address: String,
    pub destination_address: String,
}

impl TripRequest {
    /// Minimal trip with empty free-form fields.
    pub fn new(
        service_id: impl Into<String>,
        user_id: impl Into<String>,
        service_date: NaiveDate,
        service_time: NaiveTime,
        direction: Direction,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            user_id: user_id.into(),
            user_name: String::new(),
            service_date,
            service_time,
            direction,
            service_type_id: 0,
            origin: None,
            destination: None,
            origin_city_id: None,
            destination_city_id: None,
            origin_city: String::new(),
            destination_city: String::new(),
            origin_address: String::new(),
            destination_address: String::new(),
        }
    }
}
