//! Geographic primitives: points, fixes and circular regions.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Mean Earth radius (IUGG) in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_meters(*self, *other)
    }

    /// Linear interpolation in coordinate space. Good enough for the short
    /// hops between consecutive simulated fixes.
    pub fn lerp(&self, other: &GeoPoint, t: f64) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude + (other.latitude - self.latitude) * t,
            longitude: self.longitude + (other.longitude - self.longitude) * t,
        }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Haversine distance between two points in meters.
pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_METERS * c
}

/// A single position report from the location subsystem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub point: GeoPoint,
    pub timestamp: SystemTime,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self::at(GeoPoint::new(latitude, longitude), SystemTime::now())
    }

    pub fn at(point: GeoPoint, timestamp: SystemTime) -> Self {
        Self { point, timestamp }
    }
}

/// A circular geofence. Containment is inclusive of the boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularRegion {
    pub center: GeoPoint,
    pub radius: f64,
}

impl CircularRegion {
    pub fn new(center: GeoPoint, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        self.center.distance_to(&point) <= self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = GeoPoint::new(51.474753, -0.057528);
        assert_eq!(p.distance_to(&p), 0.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        // 2πR / 360
        assert_relative_eq!(a.distance_to(&b), 111_195.08, epsilon = 1.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = GeoPoint::new(51.474753, -0.057528);
        let b = GeoPoint::new(51.5, -0.12);
        assert_relative_eq!(a.distance_to(&b), b.distance_to(&a), epsilon = 1e-9);
        assert!(a.distance_to(&b) > 4_000.0 && a.distance_to(&b) < 6_000.0);
    }

    #[test]
    fn test_region_contains_boundary() {
        let center = GeoPoint::new(0.0, 0.0);
        let edge = GeoPoint::new(0.001, 0.0);
        let radius = center.distance_to(&edge);
        let region = CircularRegion::new(center, radius);
        assert!(region.contains(edge));
        assert!(!CircularRegion::new(center, radius - 0.01).contains(edge));
    }
}
