use crate::auth::auth::AuthUser;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::model::reimbursement::ReimbursementBatch;
use crate::model::role::can_manage_reimbursements;
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateBatchRequest {
    #[schema(example = json!([10, 11, 12]))]
    pub claim_ids: Vec<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct ReferenceRequest {
    /// bank or payment-run reference
    #[schema(example = "BANK-2026-0131")]
    pub reference_number: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct FailBatchRequest {
    #[schema(example = "Bank rejected the payment file")]
    pub reason: String,
}

/* =========================
Create batch
========================= */
#[utoipa::path(
    post,
    path = "/api/reimbursement-batches",
    request_body(content = CreateBatchRequest, content_type = "application/json"),
    responses(
        (status = 201, description = "Batch created in PENDING", body = ReimbursementBatch),
        (status = 400, description = "No claims given"),
        (status = 403, description = "Role cannot manage batches"),
        (status = 404, description = "Unknown claim"),
        (status = 409, description = "Claim not approved or already batched")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Reimbursement"
)]
pub async fn create_batch(
    auth: AuthUser,
    engine: web::Data<Engine>,
    payload: web::Json<CreateBatchRequest>,
) -> Result<HttpResponse, EngineError> {
    let batch = engine
        .reimbursements
        .create_batch(&auth.actor(), &payload.claim_ids)
        .await?;
    Ok(HttpResponse::Created().json(batch))
}

/* =========================
Get batch
========================= */
#[utoipa::path(
    get,
    path = "/api/reimbursement-batches/{id}",
    params(
        ("id" = u64, Path, description = "Batch id")
    ),
    responses(
        (status = 200, description = "Batch", body = ReimbursementBatch),
        (status = 403, description = "Role cannot manage batches"),
        (status = 404, description = "Unknown batch")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Reimbursement"
)]
pub async fn get_batch(
    auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<u64>,
) -> Result<HttpResponse, EngineError> {
    if !can_manage_reimbursements(auth.role) {
        return Err(EngineError::Unauthorized("HR/Admin only".into()));
    }
    let batch = engine.reimbursements.get_batch(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(batch))
}

/* =========================
PENDING -> PROCESSING
========================= */
#[utoipa::path(
    put,
    path = "/api/reimbursement-batches/{id}/processing",
    params(
        ("id" = u64, Path, description = "Batch id")
    ),
    request_body(content = ReferenceRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Batch is processing", body = ReimbursementBatch),
        (status = 409, description = "Batch is not PENDING")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Reimbursement"
)]
pub async fn start_processing(
    auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<u64>,
    payload: web::Json<ReferenceRequest>,
) -> Result<HttpResponse, EngineError> {
    let batch = engine
        .reimbursements
        .start_processing(&auth.actor(), path.into_inner(), payload.into_inner().reference_number)
        .await?;
    Ok(HttpResponse::Ok().json(batch))
}

/* =========================
PROCESSING -> COMPLETED
========================= */
#[utoipa::path(
    put,
    path = "/api/reimbursement-batches/{id}/complete",
    params(
        ("id" = u64, Path, description = "Batch id")
    ),
    request_body(content = ReferenceRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Batch completed, claims reimbursed", body = ReimbursementBatch),
        (status = 409, description = "Batch is not PROCESSING")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Reimbursement"
)]
pub async fn complete_batch(
    auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<u64>,
    payload: web::Json<ReferenceRequest>,
) -> Result<HttpResponse, EngineError> {
    let batch = engine
        .reimbursements
        .complete_batch(&auth.actor(), path.into_inner(), payload.into_inner().reference_number)
        .await?;
    Ok(HttpResponse::Ok().json(batch))
}

/* =========================
PROCESSING -> FAILED
========================= */
#[utoipa::path(
    put,
    path = "/api/reimbursement-batches/{id}/fail",
    params(
        ("id" = u64, Path, description = "Batch id")
    ),
    request_body(content = FailBatchRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Batch failed, claims released", body = ReimbursementBatch),
        (status = 400, description = "Missing failure reason"),
        (status = 409, description = "Batch is not PROCESSING")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Reimbursement"
)]
pub async fn fail_batch(
    auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<u64>,
    payload: web::Json<FailBatchRequest>,
) -> Result<HttpResponse, EngineError> {
    let batch = engine
        .reimbursements
        .fail_batch(&auth.actor(), path.into_inner(), &payload.reason)
        .await?;
    Ok(HttpResponse::Ok().json(batch))
}
