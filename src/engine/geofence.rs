use serde::{Deserialize, Serialize};

use crate::engine::geo::{GeoPoint, distance_meters};
use crate::model::location::{AuthorizedArea, LocationSample};

/// An area paired with how far the sample was from its center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaDistance {
    pub area: AuthorizedArea,
    pub distance_meters: f64,
    pub contains: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceVerdict {
    pub is_within_any_area: bool,
    pub nearest_area: Option<AreaDistance>,
    /// every active area, closest first
    pub candidate_areas: Vec<AreaDistance>,
    /// employee has no active area at all; needs administrative setup
    pub no_areas_assigned: bool,
    /// reported accuracy was worse than the configured threshold
    pub low_accuracy: bool,
}

impl GeofenceVerdict {
    /// Closest area that actually contains the sample, if any.
    pub fn containing_area(&self) -> Option<&AreaDistance> {
        self.candidate_areas.iter().find(|c| c.contains)
    }
}

#[derive(Debug, Clone)]
pub struct GeofenceResolver {
    low_accuracy_meters: f64,
}

impl GeofenceResolver {
    pub fn new(low_accuracy_meters: f64) -> Self {
        Self { low_accuracy_meters }
    }

    /// Evaluates every active area so `nearest_area` is the true minimum even
    /// when containment succeeds through a farther, larger area.
    pub fn resolve(&self, sample: &LocationSample, areas: &[AuthorizedArea]) -> GeofenceVerdict {
        let point = GeoPoint::new(sample.latitude, sample.longitude);

        let mut candidates: Vec<AreaDistance> = areas
            .iter()
            .filter(|a| a.is_active)
            .map(|area| {
                let d = distance_meters(point, GeoPoint::new(area.center_lat, area.center_lon));
                AreaDistance {
                    area: area.clone(),
                    distance_meters: d,
                    contains: d <= area.radius_meters,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.distance_meters
                .total_cmp(&b.distance_meters)
                .then(a.area.id.cmp(&b.area.id))
        });

        GeofenceVerdict {
            is_within_any_area: candidates.iter().any(|c| c.contains),
            nearest_area: candidates.first().cloned(),
            no_areas_assigned: candidates.is_empty(),
            low_accuracy: sample.accuracy_meters > self.low_accuracy_meters,
            candidate_areas: candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample(lat: f64, lon: f64, accuracy: f64) -> LocationSample {
        let at = NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        LocationSample::new(lat, lon, accuracy, at)
    }

    fn area(id: u64, lat: f64, lon: f64, radius: f64) -> AuthorizedArea {
        AuthorizedArea {
            id,
            name: format!("Area {id}"),
            center_lat: lat,
            center_lon: lon,
            radius_meters: radius,
            is_active: true,
        }
    }

    fn resolver() -> GeofenceResolver {
        GeofenceResolver::new(100.0)
    }

    #[test]
    fn test_point_at_center_is_contained() {
        let areas = vec![area(1, 12.9716, 77.5946, 100.0)];
        let verdict = resolver().resolve(&sample(12.9716, 77.5946, 10.0), &areas);

        assert!(verdict.is_within_any_area);
        assert!(!verdict.no_areas_assigned);
        assert_eq!(verdict.nearest_area.unwrap().distance_meters, 0.0);
    }

    #[test]
    fn test_radius_boundary_is_inclusive() {
        let s = sample(12.9750, 77.5946, 10.0);
        let d = distance_meters(
            GeoPoint::new(s.latitude, s.longitude),
            GeoPoint::new(12.9716, 77.5946),
        );

        let exact = vec![area(1, 12.9716, 77.5946, d)];
        assert!(resolver().resolve(&s, &exact).is_within_any_area);

        // shrinking the radius by epsilon puts the same point just outside
        let shrunk = vec![area(1, 12.9716, 77.5946, d - 1e-6)];
        assert!(!resolver().resolve(&s, &shrunk).is_within_any_area);
    }

    #[test]
    fn test_nearest_area_is_true_minimum_even_when_contained_by_farther_area() {
        // small area 300m away does not contain the point, big area 2km away does
        let near_small = area(1, 12.9743, 77.5946, 50.0);
        let far_large = area(2, 12.9896, 77.5946, 5_000.0);
        let verdict = resolver().resolve(&sample(12.9716, 77.5946, 10.0), &[far_large, near_small]);

        assert!(verdict.is_within_any_area);
        let nearest = verdict.nearest_area.as_ref().unwrap();
        assert_eq!(nearest.area.id, 1);
        assert!(!nearest.contains);
        assert_eq!(verdict.containing_area().unwrap().area.id, 2);
        assert_eq!(verdict.candidate_areas.len(), 2);
        assert!(verdict.candidate_areas[0].distance_meters <= verdict.candidate_areas[1].distance_meters);
    }

    #[test]
    fn test_no_areas_is_distinct_from_outside_all() {
        let none = resolver().resolve(&sample(12.9716, 77.5946, 10.0), &[]);
        assert!(!none.is_within_any_area);
        assert!(none.no_areas_assigned);
        assert!(none.nearest_area.is_none());

        let outside = resolver().resolve(
            &sample(13.0166, 77.5946, 10.0),
            &[area(1, 12.9716, 77.5946, 100.0)],
        );
        assert!(!outside.is_within_any_area);
        assert!(!outside.no_areas_assigned);
        assert!(outside.nearest_area.is_some());
    }

    #[test]
    fn test_inactive_areas_are_ignored() {
        let mut closed = area(1, 12.9716, 77.5946, 100.0);
        closed.is_active = false;
        let verdict = resolver().resolve(&sample(12.9716, 77.5946, 10.0), &[closed]);

        assert!(!verdict.is_within_any_area);
        assert!(verdict.no_areas_assigned);
    }

    #[test]
    fn test_low_accuracy_is_flagged_not_rejected() {
        let areas = vec![area(1, 12.9716, 77.5946, 100.0)];
        let verdict = resolver().resolve(&sample(12.9716, 77.5946, 350.0), &areas);

        assert!(verdict.is_within_any_area);
        assert!(verdict.low_accuracy);
    }
}
