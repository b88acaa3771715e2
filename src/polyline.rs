//! Polyline representation for route corridors.
//!
//! Routing services return geometry in the compact encoded polyline format.
//! Decoding happens once at the boundary; the consolidation core only works
//! with decoded coordinate sequences.

use geo_types::{Coord, LineString};
use serde::{Deserialize, Serialize};

use crate::geodesy::haversine_km;
use crate::trip::Coordinate;

/// Precision of Google-style encoded polylines (5 decimal places).
pub const POLYLINE_PRECISION: u32 = 5;

/// A route geometry as decoded coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Coordinate>,
}

impl Polyline {
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self { points }
    }

    /// Decodes an encoded polyline string.
    pub fn decode(encoded: &str) -> Result<Self, String> {
        if encoded.is_empty() {
            return Ok(Self::default());
        }
        let line = ::polyline::decode_polyline(encoded, POLYLINE_PRECISION)
            .map_err(|err| err.to_string())?;
        let points = line
            .coords()
            .map(|coord| Coordinate::new(coord.y, coord.x))
            .collect();
        Ok(Self { points })
    }

    /// Encodes the points back into the compact polyline format.
    pub fn encode(&self) -> Result<String, String> {
        let line: LineString<f64> = self
            .points
            .iter()
            .map(|point| Coord { x: point.lng, y: point.lat })
            .collect();
        ::polyline::encode_coordinates(line, POLYLINE_PRECISION).map_err(|err| err.to_string())
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Appends another polyline, used to stitch step geometries together.
    pub fn extend(&mut self, other: Polyline) {
        self.points.extend(other.points);
    }

    /// True if `point` lies within `max_km` of any vertex.
    ///
    /// Vertex distance only, not point-to-segment distance.
    pub fn passes_near(&self, point: Coordinate, max_km: f64) -> bool {
        self.points
            .iter()
            .any(|vertex| haversine_km(point, *vertex) <= max_km)
    }
}
