use crate::auth::auth::AuthUser;
use crate::engine::Engine;
use crate::engine::attendance_day::{CheckInCommand, CheckInOutcome, CheckInStatus, CheckOutOutcome};
use crate::error::EngineError;
use crate::model::attendance::{AttendanceDay, CheckMethod};
use crate::model::location::LocationSample;
use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CheckInRequest {
    #[schema(example = 12.9716)]
    pub latitude: f64,
    #[schema(example = 77.5946)]
    pub longitude: f64,
    #[schema(example = 15.0)]
    pub accuracy_meters: f64,
    /// when the device took the fix; defaults to server time
    #[schema(example = "2026-01-05T09:05:00", format = "date-time", value_type = Option<String>)]
    pub captured_at: Option<NaiveDateTime>,
    pub method: Option<CheckMethod>,
    /// used as the approval reason when the location is outside every authorized area
    #[schema(example = "Visiting client site for onboarding")]
    pub notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CheckOutRequest {
    /// defaults to today; set it to close an overnight shift
    #[schema(example = "2026-01-05", format = "date", value_type = Option<String>)]
    pub date: Option<NaiveDate>,
    #[schema(example = 12.9716)]
    pub latitude: f64,
    #[schema(example = 77.5946)]
    pub longitude: f64,
    #[schema(example = 15.0)]
    pub accuracy_meters: f64,
    #[schema(example = "2026-01-05T18:00:00", format = "date-time", value_type = Option<String>)]
    pub captured_at: Option<NaiveDateTime>,
}

/* =========================
Check in
========================= */
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body(content = CheckInRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Checked in inside an authorized area", body = CheckInOutcome),
        (status = 202, description = "Outside every authorized area, attendance request created", body = CheckInOutcome),
        (status = 400, description = "Invalid coordinates or reason"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile"),
        (status = 409, description = "Already checked in for today", body = Object, example = json!({
            "message": "conflict: already checked in for this date"
        })),
        (status = 422, description = "No authorized area assigned and policy blocks check-in")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    engine: web::Data<Engine>,
    payload: web::Json<CheckInRequest>,
) -> Result<HttpResponse, EngineError> {
    let employee_id = auth.require_employee()?;
    let now = engine.now();
    let payload = payload.into_inner();

    let outcome = engine
        .attendance
        .check_in(CheckInCommand {
            employee_id,
            date: now.date(),
            sample: LocationSample::new(
                payload.latitude,
                payload.longitude,
                payload.accuracy_meters,
                payload.captured_at.unwrap_or(now),
            ),
            method: payload.method.unwrap_or(CheckMethod::Gps),
            notes: payload.notes,
        })
        .await?;

    Ok(match outcome.status {
        CheckInStatus::PendingApproval => HttpResponse::Accepted().json(outcome),
        _ => HttpResponse::Ok().json(outcome),
    })
}

/* =========================
Check out
========================= */
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    request_body(content = CheckOutRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Checked out", body = CheckOutOutcome),
        (status = 400, description = "Invalid coordinates"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Not checked in, or already checked out")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    engine: web::Data<Engine>,
    payload: web::Json<CheckOutRequest>,
) -> Result<HttpResponse, EngineError> {
    let employee_id = auth.require_employee()?;
    let now = engine.now();
    let payload = payload.into_inner();

    let outcome = engine
        .attendance
        .check_out(
            employee_id,
            payload.date.unwrap_or(now.date()),
            LocationSample::new(
                payload.latitude,
                payload.longitude,
                payload.accuracy_meters,
                payload.captured_at.unwrap_or(now),
            ),
        )
        .await?;

    Ok(HttpResponse::Ok().json(outcome))
}

/* =========================
Attendance for one day
========================= */
#[utoipa::path(
    get,
    path = "/api/attendance/{employee_id}/{date}",
    params(
        ("employee_id" = u64, Path, description = "Employee id"),
        ("date" = String, Path, description = "Calendar date, YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Attendance day", body = AttendanceDay),
        (status = 403, description = "Not allowed to view this employee"),
        (status = 404, description = "No attendance recorded for that date")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn get_attendance_day(
    auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<(u64, NaiveDate)>,
) -> Result<HttpResponse, EngineError> {
    let (employee_id, date) = path.into_inner();
    auth.require_view_of(employee_id)?;

    let day = engine.attendance.get_day(employee_id, date).await?;
    Ok(HttpResponse::Ok().json(day))
}
