use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::engine::notify::NotificationDispatcher;
use crate::error::{Conflict, EngineError, EngineResult};
use crate::model::reimbursement::{BatchStatus, ReimbursementBatch};
use crate::model::role::{Actor, can_manage_reimbursements};
use crate::notifier::TemplateKind;
use crate::store::{BatchTransition, ReimbursementStore};

/// PENDING -> PROCESSING -> {COMPLETED, FAILED}.
pub struct ReimbursementLedger {
    store: Arc<dyn ReimbursementStore>,
    notifications: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl ReimbursementLedger {
    pub fn new(
        store: Arc<dyn ReimbursementStore>,
        notifications: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifications,
            clock,
        }
    }

    fn authorize(actor: &Actor) -> EngineResult<()> {
        if can_manage_reimbursements(actor.role) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized(format!(
                "role {} cannot manage reimbursement batches",
                actor.role
            )))
        }
    }

    async fn batch_in(&self, batch_id: u64, expected: BatchStatus) -> EngineResult<ReimbursementBatch> {
        let batch = self.get_batch(batch_id).await?;
        if batch.status != expected {
            return Err(Conflict::InvalidBatchTransition.into());
        }
        Ok(batch)
    }

    #[instrument(skip(self, claim_ids), fields(user_id = actor.user_id, claims = claim_ids.len()))]
    pub async fn create_batch(&self, actor: &Actor, claim_ids: &[u64]) -> EngineResult<ReimbursementBatch> {
        Self::authorize(actor)?;

        let ids: Vec<u64> = claim_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if ids.is_empty() {
            return Err(EngineError::validation("a batch needs at least one claim"));
        }

        let batch = self
            .store
            .create_batch(&ids, actor.user_id, self.clock.now())
            .await?;
        info!(
            batch_id = batch.id,
            total_amount = batch.total_amount,
            "Reimbursement batch created"
        );
        Ok(batch)
    }

    #[instrument(skip(self), fields(user_id = actor.user_id))]
    pub async fn start_processing(
        &self,
        actor: &Actor,
        batch_id: u64,
        reference_number: Option<String>,
    ) -> EngineResult<ReimbursementBatch> {
        Self::authorize(actor)?;
        let reference = reference_number
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());

        let batch = self.store.mark_processing(batch_id, reference).await?;
        info!(batch_id, "Reimbursement batch processing");
        Ok(batch)
    }

    /// Marks every member claim REIMBURSED with one shared timestamp.
    #[instrument(skip(self), fields(user_id = actor.user_id))]
    pub async fn complete_batch(
        &self,
        actor: &Actor,
        batch_id: u64,
        reference_number: Option<String>,
    ) -> EngineResult<ReimbursementBatch> {
        Self::authorize(actor)?;
        let current = self.batch_in(batch_id, BatchStatus::Processing).await?;

        let reference = reference_number
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .or(current.reference_number)
            .unwrap_or_else(|| generate_reference(batch_id));

        let transition = self
            .store
            .complete_batch(batch_id, &reference, self.clock.now())
            .await?;
        info!(
            batch_id,
            reference = %reference,
            claims = transition.claims.len(),
            "Reimbursement batch completed"
        );

        self.fan_out(&transition, TemplateKind::ReimbursementCompleted).await;
        Ok(transition.batch)
    }

    /// Releases every member claim so it can join a future batch.
    #[instrument(skip(self, reason), fields(user_id = actor.user_id))]
    pub async fn fail_batch(
        &self,
        actor: &Actor,
        batch_id: u64,
        reason: &str,
    ) -> EngineResult<ReimbursementBatch> {
        Self::authorize(actor)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::validation("a failure reason is required"));
        }
        self.batch_in(batch_id, BatchStatus::Processing).await?;

        let transition = self
            .store
            .fail_batch(batch_id, reason, self.clock.now())
            .await?;
        warn!(
            batch_id,
            reason,
            released = transition.claims.len(),
            "Reimbursement batch failed, claims released"
        );

        self.fan_out(&transition, TemplateKind::ReimbursementFailed).await;
        Ok(transition.batch)
    }

    pub async fn get_batch(&self, batch_id: u64) -> EngineResult<ReimbursementBatch> {
        self.store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("batch {batch_id}")))
    }

    /// One notification per affected employee, however many claims they had.
    async fn fan_out(&self, transition: &BatchTransition, kind: TemplateKind) {
        let employees: BTreeSet<u64> = transition.claims.iter().map(|c| c.employee_id).collect();
        let batch = &transition.batch;
        let payload = json!({
            "batch_id": batch.id,
            "status": batch.status,
            "reference_number": batch.reference_number,
            "failure_reason": batch.failure_reason,
            "processed_at": batch.processed_at,
        });

        let delivered = self
            .notifications
            .notify_employees(&employees, kind, &payload)
            .await;
        if delivered < employees.len() {
            warn!(
                batch_id = batch.id,
                delivered,
                expected = employees.len(),
                "Some batch notifications were not delivered"
            );
        }
    }
}

fn generate_reference(batch_id: u64) -> String {
    let suffix = uuid::Uuid::new_v4().to_simple().to_string();
    format!("RB-{batch_id}-{}", &suffix[..8]).to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::directory::MockDirectory;
    use crate::directory::Directory;
    use crate::model::reimbursement::{ClaimStatus, ReimbursementClaim};
    use crate::model::role::Role;
    use crate::notifier::MockNotifier;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::time::Duration;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 31)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn claim(id: u64, employee_id: u64, amount: f64) -> ReimbursementClaim {
        ReimbursementClaim {
            id,
            employee_id,
            amount,
            status: ClaimStatus::Approved,
            batch_id: None,
            reimbursed_at: None,
        }
    }

    fn hr() -> Actor {
        Actor::new(1, Some(30), Role::Hr)
    }

    fn ledger_with(store: Arc<MemoryStore>, notifier: MockNotifier) -> ReimbursementLedger {
        let mut directory = MockDirectory::new();
        directory
            .expect_contact_channel()
            .returning(|id| Ok(Some(format!("{id}@company.com"))));
        let directory: Arc<dyn Directory> = Arc::new(directory);
        let notifications = Arc::new(NotificationDispatcher::new(
            Arc::new(notifier),
            directory,
            Duration::from_millis(100),
        ));
        ReimbursementLedger::new(store, notifications, Arc::new(FixedClock::new(at(17))))
    }

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        // employee 7 has two claims in the batch
        store.insert_claim(claim(1, 7, 100.0)).unwrap();
        store.insert_claim(claim(2, 7, 250.0)).unwrap();
        store.insert_claim(claim(3, 8, 50.0)).unwrap();
        store
    }

    fn counting_notifier(times: usize) -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(times).returning(|_, _, _| Ok(()));
        notifier
    }

    #[tokio::test]
    async fn test_create_batch_dedupes_and_totals() {
        let ledger = ledger_with(seeded_store(), counting_notifier(0));
        let batch = ledger.create_batch(&hr(), &[3, 1, 2, 1]).await.unwrap();

        assert_eq!(batch.status, BatchStatus::Pending);
        assert_eq!(batch.member_claim_ids, vec![1, 2, 3]);
        assert_eq!(batch.total_amount, 400.0);

        let err = ledger.create_batch(&hr(), &[]).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = ledger.create_batch(&hr(), &[2]).await.unwrap_err();
        assert_eq!(err.conflict(), Some(Conflict::ClaimUnavailable));
    }

    #[tokio::test]
    async fn test_completion_reimburses_and_notifies_each_employee_once() {
        let store = seeded_store();
        let ledger = ledger_with(store.clone(), counting_notifier(2));
        let batch = ledger.create_batch(&hr(), &[1, 2, 3]).await.unwrap();

        let err = ledger.complete_batch(&hr(), batch.id, None).await.unwrap_err();
        assert_eq!(err.conflict(), Some(Conflict::InvalidBatchTransition));

        ledger
            .start_processing(&hr(), batch.id, Some("BANK-0042".into()))
            .await
            .unwrap();
        let done = ledger.complete_batch(&hr(), batch.id, None).await.unwrap();

        assert_eq!(done.status, BatchStatus::Completed);
        assert_eq!(done.reference_number.as_deref(), Some("BANK-0042"));
        for id in [1, 2, 3] {
            let claim = store.get_claim(id).await.unwrap().unwrap();
            assert_eq!(claim.status, ClaimStatus::Reimbursed);
            assert_eq!(claim.reimbursed_at, Some(at(17)));
        }
    }

    #[tokio::test]
    async fn test_failure_releases_all_claims() {
        let store = seeded_store();
        let ledger = ledger_with(store.clone(), counting_notifier(2));
        let batch = ledger.create_batch(&hr(), &[1, 2, 3]).await.unwrap();
        ledger.start_processing(&hr(), batch.id, None).await.unwrap();

        let err = ledger.fail_batch(&hr(), batch.id, "  ").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let failed = ledger
            .fail_batch(&hr(), batch.id, "bank rejected file")
            .await
            .unwrap();
        assert_eq!(failed.status, BatchStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("bank rejected file"));

        for id in [1, 2, 3] {
            let claim = store.get_claim(id).await.unwrap().unwrap();
            assert_eq!(claim.status, ClaimStatus::Approved);
            assert_eq!(claim.batch_id, None);
        }

        // released claims are eligible again
        let again = ledger.create_batch(&hr(), &[1, 2, 3]).await.unwrap();
        assert_ne!(again.id, batch.id);

        let err = ledger
            .fail_batch(&hr(), batch.id, "second failure")
            .await
            .unwrap_err();
        assert_eq!(err.conflict(), Some(Conflict::InvalidBatchTransition));
    }

    #[tokio::test]
    async fn test_generated_reference_when_none_supplied() {
        let ledger = ledger_with(seeded_store(), counting_notifier(1));
        let batch = ledger.create_batch(&hr(), &[3]).await.unwrap();
        ledger.start_processing(&hr(), batch.id, None).await.unwrap();

        let done = ledger.complete_batch(&hr(), batch.id, Some(" ".into())).await.unwrap();
        let reference = done.reference_number.unwrap();
        assert!(reference.starts_with(&format!("RB-{}-", batch.id)));
        assert_eq!(reference.len(), format!("RB-{}-", batch.id).len() + 8);
    }

    #[tokio::test]
    async fn test_only_privileged_roles_manage_batches() {
        let ledger = ledger_with(seeded_store(), counting_notifier(0));
        let employee = Actor::new(9, Some(7), Role::Employee);

        let err = ledger.create_batch(&employee, &[1]).await.unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));

        let system = Actor::new(2, None, Role::System);
        assert!(ledger.create_batch(&system, &[1]).await.is_ok());

        let err = ledger.get_batch(99).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
