//! Geographic coordinates and great-circle distances.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres
const EARTH_RADIUS_KM: f64 = 6371.0088;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether this is a real position. (0, 0) and non-finite values are
    /// placeholders emitted by upstream tools for "unknown".
    pub fn is_usable(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    /// Haversine distance in kilometres.
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlng = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero_for_same_point() {
        let p = Coordinates::new(41.8781, -87.6298);
        assert!(p.distance_km(&p).abs() < 1e-9);
    }

    #[test]
    fn test_distance_chicago_to_milwaukee() {
        let chicago = Coordinates::new(41.8781, -87.6298);
        let milwaukee = Coordinates::new(43.0389, -87.9065);
        let d = chicago.distance_km(&milwaukee);
        assert!((d - 131.0).abs() < 3.0, "got {d}");
        assert!((d - milwaukee.distance_km(&chicago)).abs() < 1e-9);
    }

    #[test]
    fn test_is_usable() {
        assert!(Coordinates::new(41.9, -87.6).is_usable());
        assert!(!Coordinates::new(0.0, 0.0).is_usable());
        assert!(!Coordinates::new(f64::NAN, 1.0).is_usable());
    }
}
