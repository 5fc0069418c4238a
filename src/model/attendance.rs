use chrono::{NaiveDate, NaiveDateTime};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use crate::engine::geofence::GeofenceVerdict;
use crate::model::location::LocationSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    HalfDay,
    OnLeave,
    Holiday,
    WorkFromHome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckMethod {
    Gps,
    Web,
    Biometric,
    Manual,
}

/// How the check-in fact came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    Geofence,
    ApprovedException,
}

/// Per employee-per-day lifecycle, derived from the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayState {
    NotStarted,
    CheckedIn,
    CheckedOut,
}

/// Where the employee was at a check event, and what the geofence said about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationSnapshot {
    pub sample: LocationSample,
    #[schema(value_type = Object)]
    pub verdict: GeofenceVerdict,
}

/// Serialized with a derived, read-only `work_hours`.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct AttendanceDay {
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "2026-01-05T09:05:00", format = "date-time", value_type = Option<String>)]
    pub check_in_at: Option<NaiveDateTime>,
    #[schema(example = "2026-01-05T18:00:00", format = "date-time", value_type = Option<String>)]
    pub check_out_at: Option<NaiveDateTime>,
    pub status: AttendanceStatus,
    pub method: CheckMethod,
    pub provenance: Provenance,
    pub check_in_location: Option<LocationSnapshot>,
    pub check_out_location: Option<LocationSnapshot>,
    pub notes: Option<String>,
}

impl AttendanceDay {
    pub fn state(&self) -> DayState {
        match (self.check_in_at, self.check_out_at) {
            (_, Some(_)) => DayState::CheckedOut,
            (Some(_), None) => DayState::CheckedIn,
            (None, None) => DayState::NotStarted,
        }
    }

    /// Hours between check-in and check-out, rounded to 2 decimals.
    pub fn work_hours(&self) -> Option<f64> {
        match (self.check_in_at, self.check_out_at) {
            (Some(start), Some(end)) => Some(work_hours_between(start, end)),
            _ => None,
        }
    }

    /// A closed PRESENT/LATE day shorter than `half_day_hours`. Read-only view;
    /// the stored status is left as check-in decided it.
    pub fn is_half_day(&self, half_day_hours: f64) -> bool {
        matches!(self.status, AttendanceStatus::Present | AttendanceStatus::Late)
            && self.work_hours().is_some_and(|h| h < half_day_hours)
    }
}

impl Serialize for AttendanceDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("AttendanceDay", 11)?;
        s.serialize_field("employee_id", &self.employee_id)?;
        s.serialize_field("date", &self.date)?;
        s.serialize_field("check_in_at", &self.check_in_at)?;
        s.serialize_field("check_out_at", &self.check_out_at)?;
        s.serialize_field("status", &self.status)?;
        s.serialize_field("method", &self.method)?;
        s.serialize_field("provenance", &self.provenance)?;
        s.serialize_field("check_in_location", &self.check_in_location)?;
        s.serialize_field("check_out_location", &self.check_out_location)?;
        s.serialize_field("notes", &self.notes)?;
        s.serialize_field("work_hours", &self.work_hours())?;
        s.end()
    }
}

pub fn work_hours_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    let seconds = (end - start).num_seconds().max(0) as f64;
    (seconds / 3600.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dt(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_work_hours_rounded_to_two_decimals() {
        assert_eq!(work_hours_between(dt(9, 0), dt(17, 30)), 8.5);
        // 8h 20m = 8.333.. hours
        assert_eq!(work_hours_between(dt(9, 0), dt(17, 20)), 8.33);
        assert_eq!(work_hours_between(dt(9, 0), dt(9, 0)), 0.0);
    }

    fn closed_day(status: AttendanceStatus, out: NaiveDateTime) -> AttendanceDay {
        AttendanceDay {
            employee_id: 1,
            date: dt(9, 0).date(),
            check_in_at: Some(dt(9, 0)),
            check_out_at: Some(out),
            status,
            method: CheckMethod::Gps,
            provenance: Provenance::Geofence,
            check_in_location: None,
            check_out_location: None,
            notes: None,
        }
    }

    #[test]
    fn test_work_hours_is_serialized() {
        let json = serde_json::to_value(closed_day(AttendanceStatus::Present, dt(17, 30))).unwrap();
        assert_eq!(json["work_hours"], serde_json::json!(8.5));
        assert_eq!(json["status"], "PRESENT");

        let mut open = closed_day(AttendanceStatus::Late, dt(17, 30));
        open.check_out_at = None;
        let json = serde_json::to_value(&open).unwrap();
        assert!(json["work_hours"].is_null());

        // the extra field does not break reading the record back
        let back: AttendanceDay = serde_json::from_value(json).unwrap();
        assert_eq!(back, open);
    }

    #[test]
    fn test_half_day_is_derived_not_stored() {
        let short = closed_day(AttendanceStatus::Late, dt(12, 30));
        assert!(short.is_half_day(4.0));
        assert_eq!(short.status, AttendanceStatus::Late);

        assert!(!closed_day(AttendanceStatus::Present, dt(17, 0)).is_half_day(4.0));
        assert!(!closed_day(AttendanceStatus::WorkFromHome, dt(10, 0)).is_half_day(4.0));
    }

    #[test]
    fn test_status_strings_match_storage_format() {
        assert_eq!(AttendanceStatus::HalfDay.to_string(), "HALF_DAY");
        assert_eq!(
            AttendanceStatus::from_str("WORK_FROM_HOME").ok(),
            Some(AttendanceStatus::WorkFromHome)
        );
        assert_eq!(CheckMethod::Gps.to_string(), "GPS");
        assert_eq!(
            Provenance::from_str("APPROVED_EXCEPTION").ok(),
            Some(Provenance::ApprovedException)
        );
    }
}
