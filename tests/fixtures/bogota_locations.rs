//! Bogotá locations for realistic test fixtures.
//!
//! Approximate coordinates of well-known places, good enough for
//! distance-based tests and routable with OSRM Colombia data.

use route_consolidator::trip::Coordinate;

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

// ============================================================================
// Destinations (offices, campuses)
// ============================================================================

pub const DESTINATIONS: &[Location] = &[
    Location::new("Centro Internacional", 4.6137, -74.0705),
    Location::new("Zona Franca Fontibón", 4.6716, -74.1540),
    Location::new("Ciudad Universitaria", 4.6381, -74.0840),
    Location::new("Parque de la 93", 4.6765, -74.0484),
];

// ============================================================================
// Northern neighborhoods (pickups along Autopista Norte / Carrera 7)
// ============================================================================

pub const NORTH_PICKUPS: &[Location] = &[
    Location::new("Usaquén", 4.6949, -74.0308),
    Location::new("Cedritos", 4.7224, -74.0420),
    Location::new("Santa Bárbara", 4.6990, -74.0426),
    Location::new("Toberín", 4.7470, -74.0460),
    Location::new("Chicó", 4.6765, -74.0480),
];

// ============================================================================
// Western neighborhoods (pickups along Calle 26 / Avenida Boyacá)
// ============================================================================

pub const WEST_PICKUPS: &[Location] = &[
    Location::new("Modelia", 4.6711, -74.1180),
    Location::new("Hayuelos", 4.6640, -74.1320),
    Location::new("Salitre", 4.6530, -74.1000),
    Location::new("Normandía", 4.6810, -74.1120),
];

/// Every location in the fixture set.
pub fn all_locations() -> Vec<Location> {
    DESTINATIONS
        .iter()
        .chain(NORTH_PICKUPS)
        .chain(WEST_PICKUPS)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_in_bogota_area() {
        for loc in all_locations() {
            assert!(loc.lat > 4.45 && loc.lat < 4.85, "{} lat {}", loc.name, loc.lat);
            assert!(loc.lng > -74.25 && loc.lng < -73.95, "{} lng {}", loc.name, loc.lng);
        }
    }
}
