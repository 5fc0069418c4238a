use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use crate::model::location::LocationSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitKind {
    Arrive,
    Depart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SiteVisitPoint {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "2026-01-05T10:00:00", format = "date-time", value_type = String)]
    pub timestamp: NaiveDateTime,
    pub location: LocationSample,
    /// registered site, if the visit was to one
    pub site_id: Option<u64>,
    /// free-form name for ad hoc locations
    pub label: Option<String>,
    pub kind: VisitKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NewSiteVisitPoint {
    pub employee_id: u64,
    #[schema(format = "date-time", value_type = String)]
    pub timestamp: NaiveDateTime,
    pub location: LocationSample,
    pub site_id: Option<u64>,
    pub label: Option<String>,
    pub kind: VisitKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyType {
    ExcessiveSpeed,
    ImpossibleDistance,
    LocationJump,
    MissingRoute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Anomaly {
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    /// the later point of the offending pair
    pub point_id: u64,
    pub description: String,
    /// timestamp of `point_id`
    #[schema(format = "date-time", value_type = String)]
    pub detected_at: NaiveDateTime,
}

/// One leg between consecutive points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrailSegment {
    pub from_point_id: u64,
    pub to_point_id: u64,
    pub distance_meters: f64,
    pub duration_seconds: i64,
    pub speed_kmh: f64,
    pub bearing_degrees: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MovementTrail {
    pub employee_id: u64,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub points: Vec<SiteVisitPoint>,
    pub segments: Vec<TrailSegment>,
    pub total_distance_meters: f64,
    pub total_duration_seconds: i64,
    pub anomalies: Vec<Anomaly>,
    pub is_validated: bool,
    /// timestamp of the last point; start of the day for an empty trail
    #[schema(format = "date-time", value_type = String)]
    pub as_of: NaiveDateTime,
}
