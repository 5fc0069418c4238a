use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::config::AttendancePolicy;
use crate::directory::Directory;
use crate::engine::geofence::GeofenceResolver;
use crate::engine::notify::NotificationDispatcher;
use crate::error::{Conflict, EngineError, EngineResult};
use crate::model::attendance::{
    AttendanceDay, AttendanceStatus, CheckMethod, LocationSnapshot, Provenance,
};
use crate::model::attendance_request::{
    AttendanceRequest, Decision, RequestDecision, RequestStatus,
};
use crate::model::location::LocationSample;
use crate::model::role::{Actor, can_decide_approvals, can_decide_for_anyone};
use crate::notifier::TemplateKind;
use crate::store::AttendanceStore;

const DEFAULT_REJECTION_REASON: &str = "Rejected without comment";

/// Direct submission of an attendance exception by the employee.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub requested_check_in_at: NaiveDateTime,
    pub sample: LocationSample,
    pub method: Option<CheckMethod>,
    pub reason: String,
}

/// PENDING -> {APPROVED, REJECTED}. Owns the only path that creates an
/// attendance day without passing the geofence gate.
pub struct ApprovalWorkflow {
    store: Arc<dyn AttendanceStore>,
    directory: Arc<dyn Directory>,
    notifications: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    policy: Arc<AttendancePolicy>,
    resolver: GeofenceResolver,
}

impl ApprovalWorkflow {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        directory: Arc<dyn Directory>,
        notifications: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        policy: Arc<AttendancePolicy>,
    ) -> Self {
        let resolver = GeofenceResolver::new(policy.low_accuracy_meters);
        Self {
            store,
            directory,
            notifications,
            clock,
            policy,
            resolver,
        }
    }

    /// Trimmed reason, or a validation error when it is too short to serve as evidence.
    pub fn validate_reason(&self, reason: &str) -> EngineResult<String> {
        let trimmed = reason.trim();
        if trimmed.chars().count() < self.policy.min_reason_len {
            return Err(EngineError::validation(format!(
                "reason must be at least {} characters",
                self.policy.min_reason_len
            )));
        }
        Ok(trimmed.to_string())
    }

    #[instrument(skip(self, cmd), fields(employee_id = cmd.employee_id, date = %cmd.date))]
    pub async fn submit(&self, cmd: SubmitRequest) -> EngineResult<AttendanceRequest> {
        cmd.sample.validate()?;
        let reason = self.validate_reason(&cmd.reason)?;

        if cmd.requested_check_in_at.date() != cmd.date {
            return Err(EngineError::validation(
                "requested_check_in_at must fall on the request date",
            ));
        }

        if self.store.get_day(cmd.employee_id, cmd.date).await?.is_some() {
            return Err(Conflict::AlreadyCheckedIn.into());
        }

        let areas = self.directory.assigned_areas(cmd.employee_id).await?;
        let verdict = self.resolver.resolve(&cmd.sample, &areas);
        if let Some(inside) = verdict.containing_area() {
            return Err(EngineError::validation(format!(
                "location is inside authorized area '{}'; use a regular check-in",
                inside.area.name
            )));
        }

        self.open(
            cmd.employee_id,
            cmd.date,
            cmd.requested_check_in_at,
            LocationSnapshot {
                sample: cmd.sample,
                verdict,
            },
            cmd.method.unwrap_or(CheckMethod::Gps),
            reason,
        )
        .await
    }

    /// Exception raised by a check-in that failed the geofence gate.
    pub async fn open_from_check_in(
        &self,
        employee_id: u64,
        date: NaiveDate,
        checked_in_at: NaiveDateTime,
        location: LocationSnapshot,
        method: CheckMethod,
        reason: &str,
    ) -> EngineResult<AttendanceRequest> {
        let reason = self.validate_reason(reason)?;
        self.open(employee_id, date, checked_in_at, location, method, reason)
            .await
    }

    async fn open(
        &self,
        employee_id: u64,
        date: NaiveDate,
        requested_check_in_at: NaiveDateTime,
        location: LocationSnapshot,
        method: CheckMethod,
        reason: String,
    ) -> EngineResult<AttendanceRequest> {
        let request = AttendanceRequest {
            id: 0,
            employee_id,
            date,
            requested_check_in_at,
            location,
            method,
            reason,
            status: RequestStatus::Pending,
            decided_by: None,
            decided_at: None,
            rejection_reason: None,
            decision_comments: None,
            created_at: self.clock.now(),
        };

        let stored = self.store.insert_pending_request(&request).await?;
        info!(
            request_id = stored.id,
            employee_id,
            date = %date,
            "Attendance request created"
        );

        let routing = self
            .notifications
            .route_to_approvers(
                employee_id,
                TemplateKind::AttendanceRequestSubmitted,
                request_payload(&stored),
            )
            .await;
        debug!(request_id = stored.id, ?routing, "Approval routed");

        Ok(stored)
    }

    #[instrument(skip(self, comments), fields(user_id = actor.user_id, role = %actor.role))]
    pub async fn decide(
        &self,
        actor: &Actor,
        request_id: u64,
        decision: Decision,
        comments: Option<String>,
    ) -> EngineResult<AttendanceRequest> {
        if !can_decide_approvals(actor.role) {
            return Err(EngineError::Unauthorized(format!(
                "role {} cannot decide attendance requests",
                actor.role
            )));
        }

        let request = self.get_request(request_id).await?;

        if actor.is_employee(request.employee_id) {
            return Err(EngineError::Unauthorized(
                "cannot decide your own attendance request".into(),
            ));
        }

        if !can_decide_for_anyone(actor.role) {
            let manager = self.directory.manager_of(request.employee_id).await?;
            if manager.is_none() || manager != actor.employee_id {
                return Err(EngineError::Unauthorized(
                    "managers may only decide requests of their direct reports".into(),
                ));
            }
        }

        // the store re-checks atomically; this only avoids a pointless write
        if request.status.is_terminal() {
            return Err(Conflict::AlreadyDecided.into());
        }

        let now = self.clock.now();
        let comments = comments
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let record = RequestDecision {
            request_id,
            status: decision.resulting_status(),
            decided_by: actor.user_id,
            decided_at: now,
            rejection_reason: match decision {
                Decision::Approve => None,
                Decision::Reject => Some(
                    comments
                        .clone()
                        .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string()),
                ),
            },
            comments,
        };

        let materialize = match decision {
            Decision::Approve => Some(approved_day(&request)),
            Decision::Reject => None,
        };

        let decided = self
            .store
            .decide_request(&record, materialize.as_ref())
            .await?;

        info!(
            request_id,
            employee_id = decided.employee_id,
            status = %decided.status,
            decided_by = actor.user_id,
            "Attendance request decided"
        );

        let kind = match decision {
            Decision::Approve => TemplateKind::AttendanceRequestApproved,
            Decision::Reject => TemplateKind::AttendanceRequestRejected,
        };
        if !self
            .notifications
            .notify_employee(decided.employee_id, kind, request_payload(&decided))
            .await
        {
            warn!(request_id, "Employee was not notified of decision");
        }

        Ok(decided)
    }

    pub async fn get_request(&self, request_id: u64) -> EngineResult<AttendanceRequest> {
        self.store
            .get_request(request_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("attendance request {request_id}")))
    }

    pub async fn list_pending(&self) -> EngineResult<Vec<AttendanceRequest>> {
        self.store.list_pending_requests().await
    }

    /// Pending requests the actor may decide: all for HR/admin, direct reports for managers.
    pub async fn list_pending_for(&self, actor: &Actor) -> EngineResult<Vec<AttendanceRequest>> {
        if !can_decide_approvals(actor.role) {
            return Err(EngineError::Unauthorized(format!(
                "role {} cannot review attendance requests",
                actor.role
            )));
        }

        let pending = self.list_pending().await?;
        if can_decide_for_anyone(actor.role) {
            return Ok(pending);
        }

        let mut visible = Vec::new();
        for request in pending {
            if actor.is_employee(request.employee_id) {
                continue;
            }
            let manager = self.directory.manager_of(request.employee_id).await?;
            if manager.is_some() && manager == actor.employee_id {
                visible.push(request);
            }
        }
        Ok(visible)
    }
}

/// The attendance fact a regular check-in would have produced at the requested time.
fn approved_day(request: &AttendanceRequest) -> AttendanceDay {
    AttendanceDay {
        employee_id: request.employee_id,
        date: request.date,
        check_in_at: Some(request.requested_check_in_at),
        check_out_at: None,
        status: AttendanceStatus::Present,
        method: request.method,
        provenance: Provenance::ApprovedException,
        check_in_location: Some(request.location.clone()),
        check_out_location: None,
        notes: Some(request.reason.clone()),
    }
}

fn request_payload(request: &AttendanceRequest) -> Value {
    json!({
        "request_id": request.id,
        "employee_id": request.employee_id,
        "date": request.date,
        "requested_check_in_at": request.requested_check_in_at,
        "reason": request.reason,
        "status": request.status,
        "rejection_reason": request.rejection_reason,
        "nearest_area": request.location.verdict.nearest_area.as_ref().map(|n| json!({
            "name": n.area.name,
            "distance_meters": n.distance_meters.round(),
        })),
    })
}
