//! Location-aware attendance engine.

pub mod approval;
pub mod attendance_day;
pub mod geo;
pub mod geofence;
pub mod movement_trail;
pub mod notify;
pub mod reimbursement_batch;

use chrono::NaiveDateTime;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::AttendancePolicy;
use crate::directory::Directory;
use crate::notifier::Notifier;
use crate::store::{AttendanceStore, ReimbursementStore, TrailStore};

use approval::ApprovalWorkflow;
use attendance_day::AttendanceService;
use movement_trail::{AnomalyThresholds, MovementTrailTracker};
use notify::NotificationDispatcher;
use reimbursement_batch::ReimbursementLedger;

/// Storage handles, one per aggregate.
#[derive(Clone)]
pub struct Stores {
    pub attendance: Arc<dyn AttendanceStore>,
    pub trails: Arc<dyn TrailStore>,
    pub reimbursements: Arc<dyn ReimbursementStore>,
}

impl Stores {
    /// All three aggregates backed by the same store.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: AttendanceStore + TrailStore + ReimbursementStore + 'static,
    {
        Self {
            attendance: store.clone(),
            trails: store.clone(),
            reimbursements: store,
        }
    }
}

/// Every service wired against the same collaborators. Shared as `web::Data<Engine>`.
pub struct Engine {
    clock: Arc<dyn Clock>,
    pub attendance: AttendanceService,
    pub approvals: Arc<ApprovalWorkflow>,
    pub trails: MovementTrailTracker,
    pub reimbursements: ReimbursementLedger,
}

impl Engine {
    pub fn new(
        stores: Stores,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        policy: AttendancePolicy,
        notify_timeout: Duration,
    ) -> Self {
        let policy = Arc::new(policy);
        let notifications = Arc::new(NotificationDispatcher::new(
            notifier,
            directory.clone(),
            notify_timeout,
        ));

        let approvals = Arc::new(ApprovalWorkflow::new(
            stores.attendance.clone(),
            directory.clone(),
            notifications.clone(),
            clock.clone(),
            policy.clone(),
        ));

        Self {
            clock: clock.clone(),
            attendance: AttendanceService::new(
                stores.attendance,
                directory,
                approvals.clone(),
                clock.clone(),
                policy.clone(),
            ),
            approvals,
            trails: MovementTrailTracker::new(
                stores.trails,
                AnomalyThresholds::from(policy.as_ref()),
            ),
            reimbursements: ReimbursementLedger::new(stores.reimbursements, notifications, clock),
        }
    }

    /// The engine's notion of "now"; request defaults derive from it.
    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }
}
