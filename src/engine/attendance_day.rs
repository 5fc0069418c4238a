use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::clock::Clock;
use crate::config::{AttendancePolicy, ZeroAreaPolicy};
use crate::directory::Directory;
use crate::engine::approval::ApprovalWorkflow;
use crate::engine::geofence::{GeofenceResolver, GeofenceVerdict};
use crate::error::{Conflict, EngineError, EngineResult};
use crate::model::attendance::{
    AttendanceDay, AttendanceStatus, CheckMethod, DayState, LocationSnapshot, Provenance,
    work_hours_between,
};
use crate::model::attendance_request::AttendanceRequest;
use crate::model::location::LocationSample;
use crate::store::{AttendanceStore, CheckOutWrite};

#[derive(Debug, Clone)]
pub struct CheckInCommand {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub sample: LocationSample,
    pub method: CheckMethod,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckInStatus {
    Present,
    Late,
    PendingApproval,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckInOutcome {
    pub status: CheckInStatus,
    pub attendance_day: Option<AttendanceDay>,
    /// set when the check-in was deferred to approval
    pub request: Option<AttendanceRequest>,
    #[schema(value_type = Object)]
    pub verdict: GeofenceVerdict,
    /// minutes after nominal work start, for late check-ins
    pub minutes_late: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckOutOutcome {
    pub attendance_day: AttendanceDay,
    #[schema(example = 8.5)]
    pub work_hours: f64,
    pub outside_geofence: bool,
    /// worked less than the half-day threshold; the stored status is unchanged
    pub half_day: bool,
}

/// NOT_STARTED -> CHECKED_IN -> CHECKED_OUT per (employee, date).
pub struct AttendanceService {
    store: Arc<dyn AttendanceStore>,
    directory: Arc<dyn Directory>,
    approvals: Arc<ApprovalWorkflow>,
    clock: Arc<dyn Clock>,
    policy: Arc<AttendancePolicy>,
    resolver: GeofenceResolver,
}

impl AttendanceService {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        directory: Arc<dyn Directory>,
        approvals: Arc<ApprovalWorkflow>,
        clock: Arc<dyn Clock>,
        policy: Arc<AttendancePolicy>,
    ) -> Self {
        let resolver = GeofenceResolver::new(policy.low_accuracy_meters);
        Self {
            store,
            directory,
            approvals,
            clock,
            policy,
            resolver,
        }
    }

    #[instrument(skip(self, cmd), fields(employee_id = cmd.employee_id, date = %cmd.date, method = %cmd.method))]
    pub async fn check_in(&self, cmd: CheckInCommand) -> EngineResult<CheckInOutcome> {
        cmd.sample.validate()?;

        let now = self.clock.now();
        if cmd.date != now.date() {
            return Err(EngineError::validation(format!(
                "check-in is only accepted for today ({}); submit an attendance request for other dates",
                now.date()
            )));
        }

        // fast path only; insert_day is the real guard
        if self.store.get_day(cmd.employee_id, cmd.date).await?.is_some() {
            return Err(Conflict::AlreadyCheckedIn.into());
        }

        let areas = self.directory.assigned_areas(cmd.employee_id).await?;
        let verdict = self.resolver.resolve(&cmd.sample, &areas);

        if verdict.low_accuracy {
            warn!(
                accuracy_meters = cmd.sample.accuracy_meters,
                "Low-confidence GPS fix at check-in"
            );
        }

        if !verdict.is_within_any_area {
            return self.defer_to_approval(cmd, now, verdict).await;
        }

        let status = if now.time() > self.policy.late_cutoff {
            AttendanceStatus::Late
        } else {
            AttendanceStatus::Present
        };

        let day = AttendanceDay {
            employee_id: cmd.employee_id,
            date: cmd.date,
            check_in_at: Some(now),
            check_out_at: None,
            status,
            method: cmd.method,
            provenance: Provenance::Geofence,
            check_in_location: Some(LocationSnapshot {
                sample: cmd.sample,
                verdict: verdict.clone(),
            }),
            check_out_location: None,
            notes: cmd.notes.filter(|n| !n.trim().is_empty()),
        };
        self.store.insert_day(&day).await?;

        let area = verdict.containing_area().map(|c| c.area.name.as_str());
        info!(status = %status, area, "Checked in");

        let (status, minutes_late) = match status {
            AttendanceStatus::Late => (
                CheckInStatus::Late,
                Some((now.time() - self.policy.work_start).num_minutes().max(0)),
            ),
            _ => (CheckInStatus::Present, None),
        };

        Ok(CheckInOutcome {
            status,
            attendance_day: Some(day),
            request: None,
            verdict,
            minutes_late,
        })
    }

    async fn defer_to_approval(
        &self,
        cmd: CheckInCommand,
        now: chrono::NaiveDateTime,
        verdict: GeofenceVerdict,
    ) -> EngineResult<CheckInOutcome> {
        if verdict.no_areas_assigned {
            warn!("No active authorized area assigned; administrative setup required");
            if self.policy.zero_area_policy == ZeroAreaPolicy::Block {
                return Err(EngineError::PolicyViolation(
                    "no authorized work area is assigned to this employee".into(),
                ));
            }
        }

        let reason = match cmd.notes.as_deref().map(str::trim) {
            Some(notes) if !notes.is_empty() => notes.to_string(),
            _ => system_reason(&verdict),
        };

        let request = self
            .approvals
            .open_from_check_in(
                cmd.employee_id,
                cmd.date,
                now,
                LocationSnapshot {
                    sample: cmd.sample,
                    verdict: verdict.clone(),
                },
                cmd.method,
                &reason,
            )
            .await?;

        info!(request_id = request.id, "Check-in outside authorized areas, pending approval");

        Ok(CheckInOutcome {
            status: CheckInStatus::PendingApproval,
            attendance_day: None,
            request: Some(request),
            verdict,
            minutes_late: None,
        })
    }

    /// Exit is not gated: the geofence is evaluated and reported only.
    #[instrument(skip(self, sample))]
    pub async fn check_out(
        &self,
        employee_id: u64,
        date: NaiveDate,
        sample: LocationSample,
    ) -> EngineResult<CheckOutOutcome> {
        sample.validate()?;
        let now = self.clock.now();

        let day = self
            .store
            .get_day(employee_id, date)
            .await?
            .ok_or(Conflict::NotCheckedIn)?;
        let check_in_at = match (day.state(), day.check_in_at) {
            (DayState::CheckedOut, _) => return Err(Conflict::AlreadyCheckedOut.into()),
            (DayState::CheckedIn, Some(at)) => at,
            _ => return Err(Conflict::NotCheckedIn.into()),
        };

        if now < check_in_at {
            return Err(EngineError::validation("check-out cannot precede check-in"));
        }

        let areas = match self.directory.assigned_areas(employee_id).await {
            Ok(areas) => areas,
            Err(e) => {
                warn!(error = %e, "Area lookup failed at check-out, continuing");
                vec![]
            }
        };
        let verdict = self.resolver.resolve(&sample, &areas);
        let outside_geofence = !verdict.is_within_any_area;
        if outside_geofence {
            let nearest_m = verdict.nearest_area.as_ref().map(|n| n.distance_meters.round());
            warn!(nearest_m, "Check-out outside all authorized areas");
        }

        let updated = self
            .store
            .record_check_out(&CheckOutWrite {
                employee_id,
                date,
                check_out_at: now,
                location: LocationSnapshot { sample, verdict },
            })
            .await?;

        let work_hours = work_hours_between(check_in_at, now);
        let half_day = updated.is_half_day(self.policy.half_day_hours);
        info!(work_hours, half_day, status = %updated.status, "Checked out");

        Ok(CheckOutOutcome {
            attendance_day: updated,
            work_hours,
            outside_geofence,
            half_day,
        })
    }

    pub async fn get_day(&self, employee_id: u64, date: NaiveDate) -> EngineResult<AttendanceDay> {
        self.store
            .get_day(employee_id, date)
            .await?
            .ok_or_else(|| {
                EngineError::not_found(format!("attendance for employee {employee_id} on {date}"))
            })
    }
}

fn system_reason(verdict: &GeofenceVerdict) -> String {
    match &verdict.nearest_area {
        Some(nearest) => format!(
            "Check-in {:.0} m from nearest authorized area '{}' (radius {:.0} m)",
            nearest.distance_meters, nearest.area.name, nearest.area.radius_meters
        ),
        None => "Check-in with no authorized work area assigned; administrative setup required"
            .to_string(),
    }
}
