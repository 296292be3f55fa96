//! Great-circle distance on a spherical Earth

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Distance in meters to `other`
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        haversine_distance(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Haversine distance in meters between two points.
///
/// Coordinates are not validated; out-of-range input yields a number
/// without geographic meaning.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    const KATHMANDU: Coordinates = Coordinates {
        lat: 27.7172,
        lon: 85.3240,
    };
    const POKHARA: Coordinates = Coordinates {
        lat: 28.2096,
        lon: 83.9856,
    };

    #[test]
    fn test_distance_to_self_is_zero() {
        assert_eq!(KATHMANDU.distance_to(&KATHMANDU), 0.0);
        assert_eq!(haversine_distance(-33.9, 151.2, -33.9, 151.2), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let pairs = [
            (KATHMANDU, POKHARA),
            (Coordinates::new(0.0, 0.0), Coordinates::new(0.0, 179.9)),
            (Coordinates::new(89.9, 10.0), Coordinates::new(-89.9, -170.0)),
            (Coordinates::new(27.6710, 85.4298), Coordinates::new(27.6588, 85.3247)),
        ];

        for (a, b) in pairs {
            let ab = a.distance_to(&b);
            let ba = b.distance_to(&a);
            assert!((ab - ba).abs() < 1e-6, "{ab} != {ba}");
            assert!(ab >= 0.0);
        }
    }

    #[test]
    fn test_kathmandu_to_pokhara() {
        // ~142 km as the crow flies
        let d = KATHMANDU.distance_to(&POKHARA);
        assert!((140_000.0..145_000.0).contains(&d), "got {d}");
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = haversine_distance(0.0, 0.0, 1.0, 0.0);
        let expected = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        assert!((d - expected).abs() < 1e-6);
    }

    #[test]
    fn test_antipodes() {
        let d = haversine_distance(0.0, 0.0, 0.0, 180.0);
        assert!((d - EARTH_RADIUS_M * std::f64::consts::PI).abs() < 1e-3);
    }
}
