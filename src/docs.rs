use crate::api::attendance::{CheckInRequest, CheckOutRequest};
use crate::api::attendance_request::{CreateAttendanceRequest, DecisionRequest, PendingRequestList};
use crate::api::movement::RecordPointRequest;
use crate::api::reimbursement::{CreateBatchRequest, FailBatchRequest, ReferenceRequest};
use crate::engine::attendance_day::{CheckInOutcome, CheckInStatus, CheckOutOutcome};
use crate::model::attendance::{
    AttendanceDay, AttendanceStatus, CheckMethod, LocationSnapshot, Provenance,
};
use crate::model::attendance_request::{AttendanceRequest, Decision, RequestStatus};
use crate::model::location::{AuthorizedArea, LocationSample};
use crate::model::movement::{
    Anomaly, AnomalyType, MovementTrail, Severity, SiteVisitPoint, TrailSegment, VisitKind,
};
use crate::model::reimbursement::{BatchStatus, ReimbursementBatch};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Attendance Engine API",
        version = "1.0.0",
        description = r#"
## Location-aware attendance

Turns GPS samples into attendance facts and arbitrates the exceptions.

### Key Features
- **Check-in / check-out** gated by authorized-area geofences
- **Attendance requests** for check-ins outside every area, decided by managers, HR or admins
- **Movement trails** with distance, duration and anomaly detection per day
- **Reimbursement batches** with compensating rollback on failure

### Security
Every endpoint expects a **JWT Bearer** access token issued by the HR identity service.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::get_attendance_day,

        crate::api::attendance_request::create_request,
        crate::api::attendance_request::list_pending,
        crate::api::attendance_request::get_request,
        crate::api::attendance_request::decide_request,

        crate::api::movement::record_point,
        crate::api::movement::recompute_trail,
        crate::api::movement::get_trail,

        crate::api::reimbursement::create_batch,
        crate::api::reimbursement::get_batch,
        crate::api::reimbursement::start_processing,
        crate::api::reimbursement::complete_batch,
        crate::api::reimbursement::fail_batch
    ),
    components(
        schemas(
            CheckInRequest,
            CheckOutRequest,
            CheckInOutcome,
            CheckInStatus,
            CheckOutOutcome,
            AttendanceDay,
            AttendanceStatus,
            CheckMethod,
            Provenance,
            LocationSample,
            LocationSnapshot,
            AuthorizedArea,
            CreateAttendanceRequest,
            DecisionRequest,
            Decision,
            PendingRequestList,
            AttendanceRequest,
            RequestStatus,
            RecordPointRequest,
            SiteVisitPoint,
            VisitKind,
            MovementTrail,
            TrailSegment,
            Anomaly,
            AnomalyType,
            Severity,
            CreateBatchRequest,
            ReferenceRequest,
            FailBatchRequest,
            ReimbursementBatch,
            BatchStatus
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Geofenced check-in and check-out"),
        (name = "Attendance Requests", description = "Exception approval workflow"),
        (name = "Movement", description = "Site visits and daily movement trails"),
        (name = "Reimbursement", description = "Reimbursement batch lifecycle"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
