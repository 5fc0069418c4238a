use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::AttendancePolicy;
use crate::engine::geo::{GeoPoint, bearing_degrees, distance_meters, speed_kmh};
use crate::error::{EngineError, EngineResult};
use crate::model::movement::{
    Anomaly, AnomalyType, MovementTrail, NewSiteVisitPoint, Severity, SiteVisitPoint, TrailSegment,
};
use crate::store::TrailStore;

/// Per-pair anomaly rules. Policy values, not physics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyThresholds {
    pub max_speed_kmh: f64,
    /// fastest travel still considered possible (flight)
    pub max_plausible_speed_kmh: f64,
    pub jump_min_meters: f64,
    pub jump_accuracy_ratio: f64,
    pub missing_route_gap_secs: i64,
}

impl From<&AttendancePolicy> for AnomalyThresholds {
    fn from(policy: &AttendancePolicy) -> Self {
        Self {
            max_speed_kmh: policy.max_speed_kmh,
            max_plausible_speed_kmh: policy.max_plausible_speed_kmh,
            jump_min_meters: policy.location_jump_min_meters,
            jump_accuracy_ratio: policy.location_jump_accuracy_ratio,
            missing_route_gap_secs: policy.missing_route_gap_secs,
        }
    }
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self::from(&AttendancePolicy::default())
    }
}

fn geo_point(point: &SiteVisitPoint) -> GeoPoint {
    GeoPoint::new(point.location.latitude, point.location.longitude)
}

/// Rules are independent; one pair can raise several anomalies.
fn detect(
    prev: &SiteVisitPoint,
    next: &SiteVisitPoint,
    segment: &TrailSegment,
    rules: &AnomalyThresholds,
) -> Vec<Anomaly> {
    let d = segment.distance_meters;
    let t = segment.duration_seconds;
    let mut found = Vec::new();

    let mut raise = |anomaly_type, severity, description: String| {
        found.push(Anomaly {
            anomaly_type,
            severity,
            point_id: next.id,
            description,
            detected_at: next.timestamp,
        });
    };

    if segment.speed_kmh > rules.max_speed_kmh {
        raise(
            AnomalyType::ExcessiveSpeed,
            Severity::High,
            format!(
                "{:.1} km/h between points {} and {} exceeds {:.0} km/h",
                segment.speed_kmh, prev.id, next.id, rules.max_speed_kmh
            ),
        );
    }

    let reachable_meters = rules.max_plausible_speed_kmh * t as f64 / 3.6;
    if (t == 0 && d > 0.0) || d > reachable_meters {
        raise(
            AnomalyType::ImpossibleDistance,
            Severity::High,
            format!(
                "{d:.0} m covered in {t} s between points {} and {}",
                prev.id, next.id
            ),
        );
    }

    let worst_accuracy = prev
        .location
        .accuracy_meters
        .max(next.location.accuracy_meters);
    if d >= rules.jump_min_meters && worst_accuracy >= d * rules.jump_accuracy_ratio {
        raise(
            AnomalyType::LocationJump,
            Severity::Medium,
            format!(
                "{d:.0} m jump with {worst_accuracy:.0} m GPS accuracy between points {} and {}",
                prev.id, next.id
            ),
        );
    }

    if t > rules.missing_route_gap_secs {
        raise(
            AnomalyType::MissingRoute,
            Severity::Low,
            format!(
                "no location recorded for {:.1} h between points {} and {}",
                t as f64 / 3600.0,
                prev.id,
                next.id
            ),
        );
    }

    found
}

/// Pure and deterministic: the same points always give the same trail. Every
/// timestamp in the result comes from the points themselves.
pub fn compute_trail(
    employee_id: u64,
    date: NaiveDate,
    mut points: Vec<SiteVisitPoint>,
    rules: &AnomalyThresholds,
) -> MovementTrail {
    points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

    let mut segments = Vec::with_capacity(points.len().saturating_sub(1));
    let mut anomalies = Vec::new();

    for pair in points.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let distance = distance_meters(geo_point(prev), geo_point(next));
        let duration = (next.timestamp - prev.timestamp).num_seconds();

        let segment = TrailSegment {
            from_point_id: prev.id,
            to_point_id: next.id,
            distance_meters: distance,
            duration_seconds: duration,
            speed_kmh: speed_kmh(distance, duration as f64),
            bearing_degrees: bearing_degrees(geo_point(prev), geo_point(next)),
        };
        anomalies.extend(detect(prev, next, &segment, rules));
        segments.push(segment);
    }

    let as_of = points
        .last()
        .map(|p| p.timestamp)
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN));

    MovementTrail {
        employee_id,
        date,
        total_distance_meters: segments.iter().map(|s| s.distance_meters).sum(),
        total_duration_seconds: segments.iter().map(|s| s.duration_seconds).sum(),
        is_validated: anomalies.is_empty(),
        points,
        segments,
        anomalies,
        as_of,
    }
}

pub struct MovementTrailTracker {
    store: Arc<dyn TrailStore>,
    rules: AnomalyThresholds,
}

impl MovementTrailTracker {
    pub fn new(store: Arc<dyn TrailStore>, rules: AnomalyThresholds) -> Self {
        Self { store, rules }
    }

    #[instrument(skip(self, point), fields(employee_id = point.employee_id, kind = %point.kind))]
    pub async fn record_point(&self, mut point: NewSiteVisitPoint) -> EngineResult<SiteVisitPoint> {
        point.location.validate()?;
        point.label = point
            .label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        let stored = self.store.append_point(&point).await?;
        info!(point_id = stored.id, site_id = stored.site_id, "Site visit recorded");
        Ok(stored)
    }

    /// Recomputes from the stored points and replaces the previous trail wholesale.
    #[instrument(skip(self))]
    pub async fn recompute(&self, employee_id: u64, date: NaiveDate) -> EngineResult<MovementTrail> {
        let points = self.store.points_for_day(employee_id, date).await?;
        let trail = compute_trail(employee_id, date, points, &self.rules);
        self.store.replace_trail(&trail).await?;

        if trail.is_validated {
            info!(
                points = trail.points.len(),
                distance_m = trail.total_distance_meters,
                "Movement trail validated"
            );
        } else {
            warn!(
                points = trail.points.len(),
                anomalies = trail.anomalies.len(),
                "Movement trail has anomalies"
            );
        }
        Ok(trail)
    }

    pub async fn get_trail(&self, employee_id: u64, date: NaiveDate) -> EngineResult<MovementTrail> {
        self.store
            .get_trail(employee_id, date)
            .await?
            .ok_or_else(|| {
                EngineError::not_found(format!("movement trail for employee {employee_id} on {date}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::geo::EARTH_RADIUS_METERS;
    use chrono::NaiveDateTime;
    use crate::model::location::LocationSample;
    use crate::model::movement::VisitKind;
    use crate::store::MemoryStore;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    // degrees of latitude spanning `meters` along a meridian
    fn lat_offset(meters: f64) -> f64 {
        (meters / EARTH_RADIUS_METERS).to_degrees()
    }

    fn point(id: u64, ts: NaiveDateTime, north_m: f64, accuracy: f64) -> SiteVisitPoint {
        SiteVisitPoint {
            id,
            employee_id: 7,
            timestamp: ts,
            location: LocationSample::new(12.9716 + lat_offset(north_m), 77.5946, accuracy, ts),
            site_id: None,
            label: None,
            kind: VisitKind::Arrive,
        }
    }

    fn trail(points: Vec<SiteVisitPoint>) -> MovementTrail {
        compute_trail(7, at(0, 0, 0).date(), points, &AnomalyThresholds::default())
    }

    #[test]
    fn test_fast_hop_flags_excessive_speed_only() {
        let t = trail(vec![
            point(1, at(10, 0, 0), 0.0, 10.0),
            point(2, at(10, 1, 0), 3000.0, 10.0),
        ]);

        assert!((t.segments[0].speed_kmh - 180.0).abs() < 0.01);
        assert_eq!(t.anomalies.len(), 1);
        assert_eq!(t.anomalies[0].anomaly_type, AnomalyType::ExcessiveSpeed);
        assert_eq!(t.anomalies[0].severity, Severity::High);
        assert_eq!(t.anomalies[0].point_id, 2);
        assert!(!t.is_validated);
    }

    #[test]
    fn test_same_instant_teleport_is_impossible_distance() {
        let t = trail(vec![
            point(1, at(10, 0, 0), 0.0, 5.0),
            point(2, at(10, 0, 0), 40.0, 5.0),
        ]);
        let kinds: Vec<_> = t.anomalies.iter().map(|a| a.anomaly_type).collect();
        assert_eq!(kinds, vec![AnomalyType::ImpossibleDistance]);
    }

    #[test]
    fn test_faster_than_flight_is_impossible_distance() {
        // 100 km in 5 minutes
        let t = trail(vec![
            point(1, at(10, 0, 0), 0.0, 5.0),
            point(2, at(10, 5, 0), 100_000.0, 5.0),
        ]);
        let kinds: Vec<_> = t.anomalies.iter().map(|a| a.anomaly_type).collect();
        assert_eq!(
            kinds,
            vec![AnomalyType::ExcessiveSpeed, AnomalyType::ImpossibleDistance]
        );
    }

    #[test]
    fn test_jump_with_poor_accuracy_is_location_jump() {
        // 600 m in 30 min is walking pace, but the fix is only good to 400 m
        let t = trail(vec![
            point(1, at(10, 0, 0), 0.0, 10.0),
            point(2, at(10, 30, 0), 600.0, 400.0),
        ]);
        assert_eq!(t.anomalies.len(), 1);
        assert_eq!(t.anomalies[0].anomaly_type, AnomalyType::LocationJump);
        assert_eq!(t.anomalies[0].severity, Severity::Medium);
    }

    #[test]
    fn test_long_gap_is_missing_route() {
        let t = trail(vec![
            point(1, at(8, 0, 0), 0.0, 10.0),
            point(2, at(13, 0, 0), 200.0, 10.0),
        ]);
        assert_eq!(t.anomalies.len(), 1);
        assert_eq!(t.anomalies[0].anomaly_type, AnomalyType::MissingRoute);
        assert_eq!(t.anomalies[0].severity, Severity::Low);
    }

    #[test]
    fn test_totals_are_pairwise_sums_over_sorted_points() {
        let t = trail(vec![
            point(3, at(11, 0, 0), 1500.0, 10.0),
            point(1, at(9, 0, 0), 0.0, 10.0),
            point(2, at(10, 0, 0), 1000.0, 10.0),
        ]);

        let ids: Vec<_> = t.points.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(t.segments.len(), 2);
        assert_eq!(t.total_duration_seconds, 7200);
        assert!((t.total_distance_meters - 1500.0).abs() < 0.5);
        assert!(t.is_validated);
    }

    #[test]
    fn test_empty_and_single_point_trails_validate() {
        let empty = trail(vec![]);
        assert!(empty.is_validated);
        assert_eq!(empty.total_distance_meters, 0.0);

        let single = trail(vec![point(1, at(9, 0, 0), 0.0, 10.0)]);
        assert!(single.segments.is_empty());
        assert!(single.is_validated);
    }

    #[test]
    fn test_recomputation_is_deterministic() {
        let points = vec![
            point(2, at(10, 1, 0), 3000.0, 10.0),
            point(1, at(10, 0, 0), 0.0, 10.0),
            point(3, at(15, 30, 0), 3500.0, 900.0),
        ];
        let first = trail(points.clone());
        let second = trail(points);

        assert_eq!(
            first.total_distance_meters.to_bits(),
            second.total_distance_meters.to_bits()
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_trail_timestamps_come_from_points() {
        let t = trail(vec![
            point(1, at(10, 0, 0), 0.0, 10.0),
            point(2, at(10, 1, 0), 3000.0, 10.0),
            point(3, at(16, 0, 0), 3200.0, 10.0),
        ]);

        let detected: Vec<_> = t.anomalies.iter().map(|a| (a.point_id, a.detected_at)).collect();
        assert_eq!(
            detected,
            vec![(2, at(10, 1, 0)), (3, at(16, 0, 0))]
        );
        assert_eq!(t.as_of, at(16, 0, 0));

        assert_eq!(trail(vec![]).as_of, at(0, 0, 0));
    }

    #[tokio::test]
    async fn test_tracker_records_and_replaces_trail() {
        let store = Arc::new(MemoryStore::new());
        let tracker = MovementTrailTracker::new(store.clone(), AnomalyThresholds::default());
        let date = at(0, 0, 0).date();

        let err = tracker.get_trail(7, date).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        for (ts, north) in [(at(10, 0, 0), 0.0), (at(10, 1, 0), 3000.0)] {
            let p = point(0, ts, north, 10.0);
            tracker
                .record_point(NewSiteVisitPoint {
                    employee_id: 7,
                    timestamp: ts,
                    location: p.location,
                    site_id: Some(1),
                    label: Some("  ".into()),
                    kind: VisitKind::Arrive,
                })
                .await
                .unwrap();
        }

        let first = tracker.recompute(7, date).await.unwrap();
        assert_eq!(first.anomalies.len(), 1);
        assert!(first.points.iter().all(|p| p.label.is_none()));

        let again = tracker.recompute(7, date).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(tracker.get_trail(7, date).await.unwrap(), again);
    }

    #[tokio::test]
    async fn test_record_point_rejects_bad_coordinates() {
        let store = Arc::new(MemoryStore::new());
        let tracker = MovementTrailTracker::new(store, AnomalyThresholds::default());
        let err = tracker
            .record_point(NewSiteVisitPoint {
                employee_id: 7,
                timestamp: at(10, 0, 0),
                location: LocationSample::new(91.0, 0.0, 5.0, at(10, 0, 0)),
                site_id: None,
                label: None,
                kind: VisitKind::Depart,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
