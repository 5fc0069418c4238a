use crate::auth::auth::AuthUser;
use crate::engine::Engine;
use crate::engine::approval::SubmitRequest;
use crate::error::EngineError;
use crate::model::attendance::CheckMethod;
use crate::model::attendance_request::{AttendanceRequest, Decision};
use crate::model::location::LocationSample;
use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateAttendanceRequest {
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "2026-01-05T09:05:00", format = "date-time", value_type = String)]
    pub requested_check_in_at: NaiveDateTime,
    #[schema(example = 13.0166)]
    pub latitude: f64,
    #[schema(example = 77.5946)]
    pub longitude: f64,
    #[schema(example = 20.0)]
    pub accuracy_meters: f64,
    pub method: Option<CheckMethod>,
    /// at least 10 characters
    #[schema(example = "Visiting client site for onboarding")]
    pub reason: String,
}

#[derive(Deserialize, ToSchema)]
pub struct DecisionRequest {
    #[schema(example = "approve")]
    pub decision: Decision,
    #[schema(example = "Confirmed with the client")]
    pub comments: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PendingRequestList {
    pub data: Vec<AttendanceRequest>,
    #[schema(example = 1)]
    pub total: usize,
}

/* =========================
Submit attendance request
========================= */
#[utoipa::path(
    post,
    path = "/api/attendance-requests",
    request_body(content = CreateAttendanceRequest, content_type = "application/json"),
    responses(
        (status = 201, description = "Attendance request created", body = AttendanceRequest),
        (status = 400, description = "Reason too short, invalid coordinates, or location already inside an authorized area"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "A pending request already exists, or the day is already recorded")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance Requests"
)]
pub async fn create_request(
    auth: AuthUser,
    engine: web::Data<Engine>,
    payload: web::Json<CreateAttendanceRequest>,
) -> Result<HttpResponse, EngineError> {
    let employee_id = auth.require_employee()?;
    let payload = payload.into_inner();

    let request = engine
        .approvals
        .submit(SubmitRequest {
            employee_id,
            date: payload.date,
            requested_check_in_at: payload.requested_check_in_at,
            sample: LocationSample::new(
                payload.latitude,
                payload.longitude,
                payload.accuracy_meters,
                payload.requested_check_in_at,
            ),
            method: payload.method,
            reason: payload.reason,
        })
        .await?;

    Ok(HttpResponse::Created().json(request))
}

/* =========================
Pending requests for the caller to decide
========================= */
#[utoipa::path(
    get,
    path = "/api/attendance-requests",
    responses(
        (status = 200, description = "Pending requests the caller may decide", body = PendingRequestList),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Role cannot review attendance requests")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance Requests"
)]
pub async fn list_pending(
    auth: AuthUser,
    engine: web::Data<Engine>,
) -> Result<HttpResponse, EngineError> {
    let data = engine.approvals.list_pending_for(&auth.actor()).await?;
    let total = data.len();
    Ok(HttpResponse::Ok().json(PendingRequestList { data, total }))
}

/* =========================
Get one request
========================= */
#[utoipa::path(
    get,
    path = "/api/attendance-requests/{id}",
    params(
        ("id" = u64, Path, description = "Attendance request id")
    ),
    responses(
        (status = 200, description = "Attendance request", body = AttendanceRequest),
        (status = 403, description = "Not allowed to view this request"),
        (status = 404, description = "Unknown request id")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance Requests"
)]
pub async fn get_request(
    auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<u64>,
) -> Result<HttpResponse, EngineError> {
    let request = engine.approvals.get_request(path.into_inner()).await?;
    auth.require_view_of(request.employee_id)?;
    Ok(HttpResponse::Ok().json(request))
}

/* =========================
Approve / reject (Manager, HR, Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/attendance-requests/{id}/decision",
    params(
        ("id" = u64, Path, description = "Attendance request id")
    ),
    request_body(content = DecisionRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Request decided", body = AttendanceRequest),
        (status = 403, description = "Caller may not decide this request"),
        (status = 404, description = "Unknown request id"),
        (status = 409, description = "Request already processed", body = Object, example = json!({
            "message": "conflict: attendance request already processed"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance Requests"
)]
pub async fn decide_request(
    auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<u64>,
    payload: web::Json<DecisionRequest>,
) -> Result<HttpResponse, EngineError> {
    let payload = payload.into_inner();
    let decided = engine
        .approvals
        .decide(&auth.actor(), path.into_inner(), payload.decision, payload.comments)
        .await?;
    Ok(HttpResponse::Ok().json(decided))
}
