//! Great-circle math on a spherical earth.

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A (latitude, longitude) pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Haversine distance in meters.
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    if a == b {
        return 0.0;
    }
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // clamp guards asin against h drifting past 1.0 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_METERS * c
}

/// Initial bearing from `a` to `b` in degrees, normalized to [0, 360).
pub fn bearing_degrees(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Speed in km/h; zero when no time has elapsed so callers never see inf/NaN.
pub fn speed_kmh(distance_meters: f64, duration_seconds: f64) -> f64 {
    if duration_seconds <= 0.0 {
        return 0.0;
    }
    (distance_meters / 1000.0) / (duration_seconds / 3600.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANGALORE: GeoPoint = GeoPoint { lat: 12.9716, lon: 77.5946 };
    const CHENNAI: GeoPoint = GeoPoint { lat: 13.0827, lon: 80.2707 };

    #[test]
    fn test_distance_is_symmetric() {
        let samples = [
            (BANGALORE, CHENNAI),
            (GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 179.9)),
            (GeoPoint::new(-33.8688, 151.2093), GeoPoint::new(51.5074, -0.1278)),
            (GeoPoint::new(89.9, 10.0), GeoPoint::new(-89.9, -170.0)),
        ];
        for (a, b) in samples {
            assert_eq!(distance_meters(a, b), distance_meters(b, a));
        }
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        assert_eq!(distance_meters(BANGALORE, BANGALORE), 0.0);
        assert_eq!(distance_meters(CHENNAI, CHENNAI), 0.0);
    }

    #[test]
    fn test_known_distance_bangalore_chennai() {
        // roughly 290 km as the crow flies
        let d = distance_meters(BANGALORE, CHENNAI);
        assert!((d - 290_000.0).abs() < 5_000.0, "got {d}");
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = distance_meters(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
        let expected = EARTH_RADIUS_METERS * 1.0_f64.to_radians();
        assert!((d - expected).abs() < 1e-6);
    }

    #[test]
    fn test_antipodal_points_do_not_produce_nan() {
        let d = distance_meters(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 180.0));
        assert!(d.is_finite());
        assert!((d - EARTH_RADIUS_METERS * std::f64::consts::PI).abs() < 1.0);
    }

    #[test]
    fn test_speed_kmh() {
        assert_eq!(speed_kmh(3000.0, 60.0), 180.0);
        assert_eq!(speed_kmh(1000.0, 3600.0), 1.0);
        assert_eq!(speed_kmh(500.0, 0.0), 0.0);
        assert_eq!(speed_kmh(500.0, -5.0), 0.0);
    }

    #[test]
    fn test_bearing_due_north_and_east() {
        let origin = GeoPoint::new(0.0, 0.0);
        assert!((bearing_degrees(origin, GeoPoint::new(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((bearing_degrees(origin, GeoPoint::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
    }
}
