//! Pipeline configuration.

use std::path::Path;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::batch::LabelOptions;
use crate::error::{Error, Result};
use crate::routing::RetryPolicy;

/// Tunables for one pipeline run. Every field has a default, so a partial
/// JSON document (or `{}`) is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Target in-vehicle time of a consolidated trip, in minutes.
    pub target_trip_minutes: f64,
    /// Ceiling for a validated route; falls back to `target_trip_minutes`.
    pub max_duration_minutes: Option<u64>,
    pub cluster_radius_m: f64,
    pub window_threshold_minutes: u32,
    pub departure_buffer_minutes: u32,
    pub average_speed_kmh: f64,
    pub service_type_ids: Vec<u32>,
    /// Only trips leaving from this city are consolidated.
    pub origin_city_id: Option<u32>,
    /// Nominal date for departure times; the service date when unset.
    ///
    /// Traffic-aware routing rejects departures in the past, so re-running
    /// historical dates against Google needs a future date here.
    pub departure_date: Option<NaiveDate>,
    /// Zone of the scheduled wall-clock times, as an IANA name.
    pub timezone: Tz,
    pub reconcile_durations: bool,
    /// Worker threads issuing routing calls concurrently.
    pub max_concurrent_requests: usize,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_trip_minutes: 30.0,
            max_duration_minutes: None,
            cluster_radius_m: crate::clustering::DEFAULT_CLUSTER_RADIUS_M,
            window_threshold_minutes: crate::windowing::DEFAULT_WINDOW_THRESHOLD_MINUTES,
            departure_buffer_minutes: 10,
            average_speed_kmh: crate::geodesy::DEFAULT_SPEED_KMH,
            service_type_ids: vec![14],
            origin_city_id: None,
            departure_date: None,
            timezone: chrono_tz::America::Bogota,
            reconcile_durations: true,
            max_concurrent_requests: 1,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads a JSON config file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.target_trip_minutes > 0.0) {
            return Err(Error::Config("target_trip_minutes must be positive".into()));
        }
        if !(self.cluster_radius_m > 0.0) {
            return Err(Error::Config("cluster_radius_m must be positive".into()));
        }
        if !(self.average_speed_kmh > 0.0) {
            return Err(Error::Config("average_speed_kmh must be positive".into()));
        }
        if self.max_duration_minutes == Some(0) {
            return Err(Error::Config("max_duration_minutes must be positive".into()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(Error::Config("max_concurrent_requests must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Corridor half-width: one kilometer per 15 minutes of target time.
    pub fn max_corridor_km(&self) -> f64 {
        self.target_trip_minutes / 15.0
    }

    pub fn max_duration_minutes(&self) -> u64 {
        self.max_duration_minutes
            .unwrap_or(self.target_trip_minutes.floor() as u64)
    }

    pub fn label_options(&self) -> LabelOptions {
        LabelOptions {
            cluster_radius_m: self.cluster_radius_m,
            window_threshold_minutes: self.window_threshold_minutes,
        }
    }
}
