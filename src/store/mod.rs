//! Persistence contracts. Every state transition goes through a single
//! conditional write here; services never read-branch-write.

pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::EngineResult;
use crate::model::attendance::{AttendanceDay, LocationSnapshot};
use crate::model::attendance_request::{AttendanceRequest, RequestDecision};
use crate::model::movement::{MovementTrail, NewSiteVisitPoint, SiteVisitPoint};
use crate::model::reimbursement::{ReimbursementBatch, ReimbursementClaim};

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

/// Check-out fields written by the conditional update. Status is not among
/// them: it is fixed at check-in and only an approval may replace it.
#[derive(Debug, Clone)]
pub struct CheckOutWrite {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub check_out_at: NaiveDateTime,
    pub location: LocationSnapshot,
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn get_day(&self, employee_id: u64, date: NaiveDate) -> EngineResult<Option<AttendanceDay>>;

    /// Create-if-absent on (employee_id, date).
    /// Fails with `Conflict::AlreadyCheckedIn` when a record exists.
    async fn insert_day(&self, day: &AttendanceDay) -> EngineResult<()>;

    /// Sets check-out iff the day is checked in and not yet checked out.
    /// Fails with `NotCheckedIn` / `AlreadyCheckedOut` otherwise.
    async fn record_check_out(&self, write: &CheckOutWrite) -> EngineResult<AttendanceDay>;

    async fn get_request(&self, request_id: u64) -> EngineResult<Option<AttendanceRequest>>;

    async fn list_pending_requests(&self) -> EngineResult<Vec<AttendanceRequest>>;

    /// Persists a PENDING request; the store assigns the id.
    /// Fails with `Conflict::DuplicateRequest` if one is already pending for (employee_id, date).
    async fn insert_pending_request(&self, request: &AttendanceRequest) -> EngineResult<AttendanceRequest>;

    /// Moves a PENDING request to its decided status and, in the same atomic
    /// unit, writes the approved attendance day when one is given.
    /// Fails with `NotFound` or `Conflict::AlreadyDecided`.
    async fn decide_request(
        &self,
        decision: &RequestDecision,
        materialize: Option<&AttendanceDay>,
    ) -> EngineResult<AttendanceRequest>;
}

#[async_trait]
pub trait TrailStore: Send + Sync {
    async fn append_point(&self, point: &NewSiteVisitPoint) -> EngineResult<SiteVisitPoint>;

    async fn points_for_day(&self, employee_id: u64, date: NaiveDate) -> EngineResult<Vec<SiteVisitPoint>>;

    /// Replaces the stored trail for (employee_id, date) wholesale.
    async fn replace_trail(&self, trail: &MovementTrail) -> EngineResult<()>;

    async fn get_trail(&self, employee_id: u64, date: NaiveDate) -> EngineResult<Option<MovementTrail>>;
}

/// Result of a terminal batch transition: the batch and its member claims after the write.
#[derive(Debug, Clone)]
pub struct BatchTransition {
    pub batch: ReimbursementBatch,
    pub claims: Vec<ReimbursementClaim>,
}

#[async_trait]
pub trait ReimbursementStore: Send + Sync {
    async fn get_claim(&self, claim_id: u64) -> EngineResult<Option<ReimbursementClaim>>;

    async fn get_batch(&self, batch_id: u64) -> EngineResult<Option<ReimbursementBatch>>;

    /// Links every claim to a new PENDING batch, all or nothing.
    /// Fails with `NotFound` for unknown claims and `Conflict::ClaimUnavailable`
    /// when any claim is not approved or already batched.
    async fn create_batch(
        &self,
        claim_ids: &[u64],
        created_by: u64,
        created_at: NaiveDateTime,
    ) -> EngineResult<ReimbursementBatch>;

    /// PENDING -> PROCESSING.
    async fn mark_processing(
        &self,
        batch_id: u64,
        reference_number: Option<&str>,
    ) -> EngineResult<ReimbursementBatch>;

    /// PROCESSING -> COMPLETED; every member claim becomes REIMBURSED at `completed_at`.
    async fn complete_batch(
        &self,
        batch_id: u64,
        reference_number: &str,
        completed_at: NaiveDateTime,
    ) -> EngineResult<BatchTransition>;

    /// PROCESSING -> FAILED; every member claim is released from the batch.
    async fn fail_batch(
        &self,
        batch_id: u64,
        reason: &str,
        failed_at: NaiveDateTime,
    ) -> EngineResult<BatchTransition>;
}
