use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Conflict, EngineError, EngineResult};
use crate::model::attendance::AttendanceDay;
use crate::model::attendance_request::{AttendanceRequest, RequestDecision, RequestStatus};
use crate::model::movement::{MovementTrail, NewSiteVisitPoint, SiteVisitPoint};
use crate::model::reimbursement::{BatchStatus, ClaimStatus, ReimbursementBatch, ReimbursementClaim};
use crate::store::{
    AttendanceStore, BatchTransition, CheckOutWrite, ReimbursementStore, TrailStore,
};

#[derive(Default)]
struct MemoryState {
    days: HashMap<(u64, NaiveDate), AttendanceDay>,
    requests: BTreeMap<u64, AttendanceRequest>,
    next_request_id: u64,
    points: BTreeMap<u64, SiteVisitPoint>,
    next_point_id: u64,
    trails: HashMap<(u64, NaiveDate), MovementTrail>,
    claims: BTreeMap<u64, ReimbursementClaim>,
    batches: BTreeMap<u64, ReimbursementBatch>,
    next_batch_id: u64,
}

/// Process-local store. A single mutex makes every conditional write atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| EngineError::Storage("memory store poisoned".into()))
    }

    /// Registers a claim produced by the upstream expense workflow.
    pub fn insert_claim(&self, claim: ReimbursementClaim) -> EngineResult<()> {
        self.lock()?.claims.insert(claim.id, claim);
        Ok(())
    }

    fn claims_of(state: &MemoryState, batch: &ReimbursementBatch) -> Vec<ReimbursementClaim> {
        batch
            .member_claim_ids
            .iter()
            .filter_map(|id| state.claims.get(id).cloned())
            .collect()
    }
}

/// Overwrites the check-in side of a day, dropping a check-out that would now precede it.
fn merge_approved_day(existing: Option<&AttendanceDay>, approved: &AttendanceDay) -> AttendanceDay {
    let mut merged = approved.clone();
    if let Some(prev) = existing {
        let still_valid = match (prev.check_out_at, approved.check_in_at) {
            (Some(out), Some(inn)) => out >= inn,
            _ => false,
        };
        if still_valid {
            merged.check_out_at = prev.check_out_at;
            merged.check_out_location = prev.check_out_location.clone();
        }
    }
    merged
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn get_day(&self, employee_id: u64, date: NaiveDate) -> EngineResult<Option<AttendanceDay>> {
        Ok(self.lock()?.days.get(&(employee_id, date)).cloned())
    }

    async fn insert_day(&self, day: &AttendanceDay) -> EngineResult<()> {
        let mut state = self.lock()?;
        let key = (day.employee_id, day.date);
        if state.days.contains_key(&key) {
            return Err(Conflict::AlreadyCheckedIn.into());
        }
        state.days.insert(key, day.clone());
        Ok(())
    }

    async fn record_check_out(&self, write: &CheckOutWrite) -> EngineResult<AttendanceDay> {
        let mut state = self.lock()?;
        let day = match state.days.get_mut(&(write.employee_id, write.date)) {
            Some(day) if day.check_in_at.is_some() => day,
            _ => return Err(Conflict::NotCheckedIn.into()),
        };
        if day.check_out_at.is_some() {
            return Err(Conflict::AlreadyCheckedOut.into());
        }
        day.check_out_at = Some(write.check_out_at);
        day.check_out_location = Some(write.location.clone());
        Ok(day.clone())
    }

    async fn get_request(&self, request_id: u64) -> EngineResult<Option<AttendanceRequest>> {
        Ok(self.lock()?.requests.get(&request_id).cloned())
    }

    async fn list_pending_requests(&self) -> EngineResult<Vec<AttendanceRequest>> {
        Ok(self
            .lock()?
            .requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .cloned()
            .collect())
    }

    async fn insert_pending_request(&self, request: &AttendanceRequest) -> EngineResult<AttendanceRequest> {
        let mut state = self.lock()?;
        let duplicate = state.requests.values().any(|r| {
            r.employee_id == request.employee_id
                && r.date == request.date
                && r.status == RequestStatus::Pending
        });
        if duplicate {
            return Err(Conflict::DuplicateRequest.into());
        }

        state.next_request_id += 1;
        let mut stored = request.clone();
        stored.id = state.next_request_id;
        stored.status = RequestStatus::Pending;
        state.requests.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn decide_request(
        &self,
        decision: &RequestDecision,
        materialize: Option<&AttendanceDay>,
    ) -> EngineResult<AttendanceRequest> {
        let mut state = self.lock()?;
        let request = state
            .requests
            .get_mut(&decision.request_id)
            .ok_or_else(|| EngineError::not_found(format!("attendance request {}", decision.request_id)))?;
        if request.status != RequestStatus::Pending {
            return Err(Conflict::AlreadyDecided.into());
        }

        request.status = decision.status;
        request.decided_by = Some(decision.decided_by);
        request.decided_at = Some(decision.decided_at);
        request.rejection_reason = decision.rejection_reason.clone();
        request.decision_comments = decision.comments.clone();
        let decided = request.clone();

        if let Some(day) = materialize {
            let key = (day.employee_id, day.date);
            let merged = merge_approved_day(state.days.get(&key), day);
            state.days.insert(key, merged);
        }
        Ok(decided)
    }
}

#[async_trait]
impl TrailStore for MemoryStore {
    async fn append_point(&self, point: &NewSiteVisitPoint) -> EngineResult<SiteVisitPoint> {
        let mut state = self.lock()?;
        state.next_point_id += 1;
        let stored = SiteVisitPoint {
            id: state.next_point_id,
            employee_id: point.employee_id,
            timestamp: point.timestamp,
            location: point.location.clone(),
            site_id: point.site_id,
            label: point.label.clone(),
            kind: point.kind,
        };
        state.points.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn points_for_day(&self, employee_id: u64, date: NaiveDate) -> EngineResult<Vec<SiteVisitPoint>> {
        Ok(self
            .lock()?
            .points
            .values()
            .filter(|p| p.employee_id == employee_id && p.timestamp.date() == date)
            .cloned()
            .collect())
    }

    async fn replace_trail(&self, trail: &MovementTrail) -> EngineResult<()> {
        self.lock()?
            .trails
            .insert((trail.employee_id, trail.date), trail.clone());
        Ok(())
    }

    async fn get_trail(&self, employee_id: u64, date: NaiveDate) -> EngineResult<Option<MovementTrail>> {
        Ok(self.lock()?.trails.get(&(employee_id, date)).cloned())
    }
}

#[async_trait]
impl ReimbursementStore for MemoryStore {
    async fn get_claim(&self, claim_id: u64) -> EngineResult<Option<ReimbursementClaim>> {
        Ok(self.lock()?.claims.get(&claim_id).cloned())
    }

    async fn get_batch(&self, batch_id: u64) -> EngineResult<Option<ReimbursementBatch>> {
        Ok(self.lock()?.batches.get(&batch_id).cloned())
    }

    async fn create_batch(
        &self,
        claim_ids: &[u64],
        created_by: u64,
        created_at: NaiveDateTime,
    ) -> EngineResult<ReimbursementBatch> {
        let mut state = self.lock()?;

        let mut total_amount = 0.0;
        for id in claim_ids {
            let claim = state
                .claims
                .get(id)
                .ok_or_else(|| EngineError::not_found(format!("claim {id}")))?;
            if !claim.is_batchable() {
                return Err(Conflict::ClaimUnavailable.into());
            }
            total_amount += claim.amount;
        }

        state.next_batch_id += 1;
        let batch = ReimbursementBatch {
            id: state.next_batch_id,
            status: BatchStatus::Pending,
            reference_number: None,
            total_amount,
            member_claim_ids: claim_ids.to_vec(),
            created_by,
            created_at,
            processed_at: None,
            failure_reason: None,
        };
        for id in claim_ids {
            if let Some(claim) = state.claims.get_mut(id) {
                claim.batch_id = Some(batch.id);
            }
        }
        state.batches.insert(batch.id, batch.clone());
        Ok(batch)
    }

    async fn mark_processing(
        &self,
        batch_id: u64,
        reference_number: Option<&str>,
    ) -> EngineResult<ReimbursementBatch> {
        let mut state = self.lock()?;
        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| EngineError::not_found(format!("batch {batch_id}")))?;
        if !batch.status.can_transition_to(BatchStatus::Processing) {
            return Err(Conflict::InvalidBatchTransition.into());
        }
        batch.status = BatchStatus::Processing;
        if let Some(reference) = reference_number {
            batch.reference_number = Some(reference.to_string());
        }
        Ok(batch.clone())
    }

    async fn complete_batch(
        &self,
        batch_id: u64,
        reference_number: &str,
        completed_at: NaiveDateTime,
    ) -> EngineResult<BatchTransition> {
        let mut state = self.lock()?;
        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| EngineError::not_found(format!("batch {batch_id}")))?;
        if !batch.status.can_transition_to(BatchStatus::Completed) {
            return Err(Conflict::InvalidBatchTransition.into());
        }
        batch.status = BatchStatus::Completed;
        batch.reference_number = Some(reference_number.to_string());
        batch.processed_at = Some(completed_at);
        let batch = batch.clone();

        for id in &batch.member_claim_ids {
            if let Some(claim) = state.claims.get_mut(id) {
                claim.status = ClaimStatus::Reimbursed;
                claim.reimbursed_at = Some(completed_at);
            }
        }
        let claims = Self::claims_of(&state, &batch);
        Ok(BatchTransition { batch, claims })
    }

    async fn fail_batch(
        &self,
        batch_id: u64,
        reason: &str,
        failed_at: NaiveDateTime,
    ) -> EngineResult<BatchTransition> {
        let mut state = self.lock()?;
        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| EngineError::not_found(format!("batch {batch_id}")))?;
        if !batch.status.can_transition_to(BatchStatus::Failed) {
            return Err(Conflict::InvalidBatchTransition.into());
        }
        batch.status = BatchStatus::Failed;
        batch.failure_reason = Some(reason.to_string());
        batch.processed_at = Some(failed_at);
        let batch = batch.clone();

        for id in &batch.member_claim_ids {
            if let Some(claim) = state.claims.get_mut(id) {
                if claim.batch_id == Some(batch_id) {
                    claim.batch_id = None;
                    claim.status = ClaimStatus::Approved;
                }
            }
        }
        let claims = Self::claims_of(&state, &batch);
        Ok(BatchTransition { batch, claims })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::geofence::GeofenceVerdict;
    use crate::model::attendance::{AttendanceStatus, CheckMethod, LocationSnapshot, Provenance};
    use crate::model::location::LocationSample;
    use std::sync::Arc;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn snapshot() -> LocationSnapshot {
        LocationSnapshot {
            sample: LocationSample::new(12.9716, 77.5946, 10.0, at(9, 5)),
            verdict: GeofenceVerdict {
                is_within_any_area: true,
                nearest_area: None,
                candidate_areas: vec![],
                no_areas_assigned: false,
                low_accuracy: false,
            },
        }
    }

    fn day(employee_id: u64, check_in: NaiveDateTime) -> AttendanceDay {
        AttendanceDay {
            employee_id,
            date: check_in.date(),
            check_in_at: Some(check_in),
            check_out_at: None,
            status: AttendanceStatus::Present,
            method: CheckMethod::Gps,
            provenance: Provenance::Geofence,
            check_in_location: Some(snapshot()),
            check_out_location: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_check_ins_yield_one_record() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.insert_day(&day(1, at(9, 5))).await }));
        }

        let mut ok = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(()) => ok += 1,
                Err(e) => {
                    assert_eq!(e.conflict(), Some(Conflict::AlreadyCheckedIn));
                    conflicts += 1;
                }
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 7);
    }

    #[tokio::test]
    async fn test_check_out_is_write_once() {
        let store = MemoryStore::new();
        let write = CheckOutWrite {
            employee_id: 1,
            date: at(9, 0).date(),
            check_out_at: at(18, 0),
            location: snapshot(),
        };

        let err = store.record_check_out(&write).await.unwrap_err();
        assert_eq!(err.conflict(), Some(Conflict::NotCheckedIn));

        store.insert_day(&day(1, at(9, 5))).await.unwrap();
        let out = store.record_check_out(&write).await.unwrap();
        assert_eq!(out.check_out_at, Some(at(18, 0)));
        assert_eq!(out.status, AttendanceStatus::Present);

        let err = store.record_check_out(&write).await.unwrap_err();
        assert_eq!(err.conflict(), Some(Conflict::AlreadyCheckedOut));
    }

    #[tokio::test]
    async fn test_approved_day_drops_check_out_that_would_precede_check_in() {
        let mut prev = day(1, at(8, 0));
        prev.check_out_at = Some(at(9, 0));
        let mut approved = day(1, at(9, 30));
        approved.provenance = Provenance::ApprovedException;

        let merged = merge_approved_day(Some(&prev), &approved);
        assert_eq!(merged.check_in_at, Some(at(9, 30)));
        assert_eq!(merged.check_out_at, None);

        prev.check_out_at = Some(at(18, 0));
        let merged = merge_approved_day(Some(&prev), &approved);
        assert_eq!(merged.check_out_at, Some(at(18, 0)));
    }

    #[tokio::test]
    async fn test_claims_cannot_join_two_open_batches() {
        let store = MemoryStore::new();
        store
            .insert_claim(ReimbursementClaim {
                id: 1,
                employee_id: 7,
                amount: 50.0,
                status: ClaimStatus::Approved,
                batch_id: None,
                reimbursed_at: None,
            })
            .unwrap();

        store.create_batch(&[1], 99, at(10, 0)).await.unwrap();
        let err = store.create_batch(&[1], 99, at(10, 5)).await.unwrap_err();
        assert_eq!(err.conflict(), Some(Conflict::ClaimUnavailable));

        let err = store.create_batch(&[42], 99, at(10, 5)).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
