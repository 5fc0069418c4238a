use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use crate::model::attendance::{CheckMethod, LocationSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn resulting_status(self) -> RequestStatus {
        match self {
            Decision::Approve => RequestStatus::Approved,
            Decision::Reject => RequestStatus::Rejected,
        }
    }
}

/// A disputed check-in waiting for (or carrying) an approver's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceRequest {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "2026-01-05T09:05:00", format = "date-time", value_type = String)]
    pub requested_check_in_at: NaiveDateTime,
    pub location: LocationSnapshot,
    pub method: CheckMethod,
    #[schema(example = "Visiting client site for onboarding")]
    pub reason: String,
    pub status: RequestStatus,
    pub decided_by: Option<u64>,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub decided_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub decision_comments: Option<String>,
    #[schema(format = "date-time", value_type = String)]
    pub created_at: NaiveDateTime,
}

/// Fields the workflow fills in when a pending request is decided.
#[derive(Debug, Clone)]
pub struct RequestDecision {
    pub request_id: u64,
    pub status: RequestStatus,
    pub decided_by: u64,
    pub decided_at: NaiveDateTime,
    pub rejection_reason: Option<String>,
    pub comments: Option<String>,
}
