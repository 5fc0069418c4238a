use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
    Reimbursed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReimbursementClaim {
    #[schema(example = 10)]
    pub id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = 1250.0)]
    pub amount: f64,
    pub status: ClaimStatus,
    pub batch_id: Option<u64>,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub reimbursed_at: Option<NaiveDateTime>,
}

impl ReimbursementClaim {
    /// Approved and not linked to any batch.
    pub fn is_batchable(&self) -> bool {
        self.status == ClaimStatus::Approved && self.batch_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        matches!(
            (self, next),
            (BatchStatus::Pending, BatchStatus::Processing)
                | (BatchStatus::Processing, BatchStatus::Completed)
                | (BatchStatus::Processing, BatchStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReimbursementBatch {
    #[schema(example = 1)]
    pub id: u64,
    pub status: BatchStatus,
    #[schema(example = "RB-2026-0001")]
    pub reference_number: Option<String>,
    #[schema(example = 3750.0)]
    pub total_amount: f64,
    pub member_claim_ids: Vec<u64>,
    pub created_by: u64,
    #[schema(format = "date-time", value_type = String)]
    pub created_at: NaiveDateTime,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub processed_at: Option<NaiveDateTime>,
    pub failure_reason: Option<String>,
}
