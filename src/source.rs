//! Trip record providers.

use std::io::Read;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::traits::TripSource;
use crate::trip::{Coordinate, Direction, TripRequest};

/// Reads trips from a CSV export of the service table.
///
/// Header names follow the export (`SERVICIO_ID`, `FECHA_SERVICIO`,
/// `LATITUD_ORIGEN`, ...). Empty or unparseable coordinate cells become
/// missing coordinates; rows with an unusable date, time or direction are
/// skipped with a warning.
#[derive(Debug, Clone)]
pub struct CsvTripSource {
    path: PathBuf,
}

impl CsvTripSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TripSource for CsvTripSource {
    fn fetch_trips(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        service_type_ids: &[u32],
    ) -> Result<Vec<TripRequest>> {
        let file = std::fs::File::open(&self.path)?;
        let trips = read_trips(file)?;
        let total = trips.len();
        let selected: Vec<TripRequest> = trips
            .into_iter()
            .filter(|trip| in_range(trip, start, end, service_type_ids))
            .collect();
        info!(path = %self.path.display(), total, selected = selected.len(), "loaded trip records");
        Ok(selected)
    }
}

/// Trips held in memory, filtered like any other source.
#[derive(Debug, Clone, Default)]
pub struct MemoryTripSource {
    trips: Vec<TripRequest>,
}

impl MemoryTripSource {
    pub fn new(trips: Vec<TripRequest>) -> Self {
        Self { trips }
    }
}

impl TripSource for MemoryTripSource {
    fn fetch_trips(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        service_type_ids: &[u32],
    ) -> Result<Vec<TripRequest>> {
        Ok(self
            .trips
            .iter()
            .filter(|trip| in_range(trip, start, end, service_type_ids))
            .cloned()
            .collect())
    }
}

fn in_range(trip: &TripRequest, start: NaiveDate, end: NaiveDate, service_type_ids: &[u32]) -> bool {
    trip.service_date >= start
        && trip.service_date <= end
        && (service_type_ids.is_empty() || service_type_ids.contains(&trip.service_type_id))
}

/// Parses every usable row of a CSV export.
pub fn read_trips<R: Read>(reader: R) -> Result<Vec<TripRequest>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut trips = Vec::new();
    for (index, row) in csv_reader.deserialize::<CsvTripRow>().enumerate() {
        // Header is line 1
        let line = index + 2;
        match row?.into_trip() {
            Ok(trip) => trips.push(trip),
            Err(reason) => warn!(line, %reason, "skipping malformed trip record"),
        }
    }
    Ok(trips)
}

#[derive(Debug, Deserialize)]
struct CsvTripRow {
    #[serde(rename = "SERVICIO_ID")]
    service_id: String,
    #[serde(rename = "IDENTIFICACION_USUARIO", default)]
    user_id: String,
    #[serde(rename = "NOMBRE_USUARIO", default)]
    user_name: String,
    #[serde(rename = "FECHA_SERVICIO")]
    service_date: String,
    #[serde(rename = "HORA_SERVICIO")]
    service_time: String,
    #[serde(rename = "DETALLE_SERVICIO")]
    direction: String,
    #[serde(rename = "TIPO_PRODUCTO_ID", default)]
    service_type_id: Option<u32>,
    #[serde(rename = "LATITUD_ORIGEN", default)]
    origin_lat: String,
    #[serde(rename = "LONGITUD_ORIGEN", default)]
    origin_lng: String,
    #[serde(rename = "LATITUD_DESTINO", default)]
    destination_lat: String,
    #[serde(rename = "LONGITUD_DESTINO", default)]
    destination_lng: String,
    #[serde(rename = "CIUDAD_ID_ORIGEN", default)]
    origin_city_id: Option<u32>,
    #[serde(rename = "CIUDAD_ID_DESTINO", default)]
    destination_city_id: Option<u32>,
    #[serde(rename = "CIUDAD_ORIGEN", default)]
    origin_city: String,
    #[serde(rename = "CIUDAD_DESTINO", default)]
    destination_city: String,
    #[serde(rename = "DIRECCION_ORIGEN", default)]
    origin_address: String,
    #[serde(rename = "DIRECCION_DESTINO", default)]
    destination_address: String,
}

impl CsvTripRow {
    fn into_trip(self) -> std::result::Result<TripRequest, String> {
        let service_date = NaiveDate::parse_from_str(self.service_date.trim(), "%Y-%m-%d")
            .map_err(|err| format!("FECHA_SERVICIO '{}': {}", self.service_date, err))?;
        let service_time = NaiveTime::parse_from_str(self.service_time.trim(), "%H:%M:%S")
            .map_err(|err| format!("HORA_SERVICIO '{}': {}", self.service_time, err))?;
        let direction: Direction = self.direction.parse()?;

        Ok(TripRequest {
            service_id: self.service_id,
            user_id: self.user_id,
            user_name: self.user_name,
            service_date,
            service_time,
            direction,
            service_type_id: self.service_type_id.unwrap_or_default(),
            origin: parse_coordinate(&self.origin_lat, &self.origin_lng),
            destination: parse_coordinate(&self.destination_lat, &self.destination_lng),
            origin_city_id: self.origin_city_id,
            destination_city_id: self.destination_city_id,
            origin_city: self.origin_city,
            destination_city: self.destination_city,
            origin_address: self.origin_address,
            destination_address: self.destination_address,
        })
    }
}

fn parse_coordinate(lat: &str, lng: &str) -> Option<Coordinate> {
    let lat: f64 = lat.trim().parse().ok()?;
    let lng: f64 = lng.trim().parse().ok()?;
    (lat.is_finite() && lng.is_finite()).then_some(Coordinate::new(lat, lng))
}
