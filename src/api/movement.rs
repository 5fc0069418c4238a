use crate::auth::auth::AuthUser;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::model::location::LocationSample;
use crate::model::movement::{MovementTrail, NewSiteVisitPoint, SiteVisitPoint, VisitKind};
use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct RecordPointRequest {
    /// defaults to server time
    #[schema(example = "2026-01-05T11:30:00", format = "date-time", value_type = Option<String>)]
    pub timestamp: Option<NaiveDateTime>,
    #[schema(example = 12.9352)]
    pub latitude: f64,
    #[schema(example = 77.6245)]
    pub longitude: f64,
    #[schema(example = 20.0)]
    pub accuracy_meters: f64,
    /// registered site, if any
    #[schema(example = 4)]
    pub site_id: Option<u64>,
    /// free-text name for ad hoc locations
    #[schema(example = "Customer warehouse")]
    pub label: Option<String>,
    pub kind: VisitKind,
}

/* =========================
Record a site visit point
========================= */
#[utoipa::path(
    post,
    path = "/api/movement/points",
    request_body(content = RecordPointRequest, content_type = "application/json"),
    responses(
        (status = 201, description = "Point recorded", body = SiteVisitPoint),
        (status = 400, description = "Invalid coordinates"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Movement"
)]
pub async fn record_point(
    auth: AuthUser,
    engine: web::Data<Engine>,
    payload: web::Json<RecordPointRequest>,
) -> Result<HttpResponse, EngineError> {
    let employee_id = auth.require_employee()?;
    let payload = payload.into_inner();
    let timestamp = payload.timestamp.unwrap_or_else(|| engine.now());

    let point = engine
        .trails
        .record_point(NewSiteVisitPoint {
            employee_id,
            timestamp,
            location: LocationSample::new(
                payload.latitude,
                payload.longitude,
                payload.accuracy_meters,
                timestamp,
            ),
            site_id: payload.site_id,
            label: payload.label,
            kind: payload.kind,
        })
        .await?;

    Ok(HttpResponse::Created().json(point))
}

/* =========================
Recompute a day's trail
========================= */
#[utoipa::path(
    post,
    path = "/api/movement/{employee_id}/{date}/recompute",
    params(
        ("employee_id" = u64, Path, description = "Employee id"),
        ("date" = String, Path, description = "Calendar date, YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Trail recomputed from stored points and replaced", body = MovementTrail),
        (status = 403, description = "Not allowed to view this employee")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Movement"
)]
pub async fn recompute_trail(
    auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<(u64, NaiveDate)>,
) -> Result<HttpResponse, EngineError> {
    let (employee_id, date) = path.into_inner();
    auth.require_view_of(employee_id)?;

    let trail = engine.trails.recompute(employee_id, date).await?;
    Ok(HttpResponse::Ok().json(trail))
}

/* =========================
Stored trail
========================= */
#[utoipa::path(
    get,
    path = "/api/movement/{employee_id}/{date}",
    params(
        ("employee_id" = u64, Path, description = "Employee id"),
        ("date" = String, Path, description = "Calendar date, YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Last computed trail", body = MovementTrail),
        (status = 403, description = "Not allowed to view this employee"),
        (status = 404, description = "Trail not computed yet")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Movement"
)]
pub async fn get_trail(
    auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<(u64, NaiveDate)>,
) -> Result<HttpResponse, EngineError> {
    let (employee_id, date) = path.into_inner();
    auth.require_view_of(employee_id)?;

    let trail = engine.trails.get_trail(employee_id, date).await?;
    Ok(HttpResponse::Ok().json(trail))
}
