use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::mysql::MySqlDatabaseError;
use sqlx::{FromRow, MySqlPool};
use std::str::FromStr;

use crate::error::{Conflict, EngineError, EngineResult};
use crate::model::attendance::AttendanceDay;
use crate::model::attendance_request::{AttendanceRequest, RequestDecision};
use crate::model::location::LocationSample;
use crate::model::movement::{MovementTrail, NewSiteVisitPoint, SiteVisitPoint};
use crate::model::reimbursement::{ReimbursementBatch, ReimbursementClaim};
use crate::store::{
    AttendanceStore, BatchTransition, CheckOutWrite, ReimbursementStore, TrailStore,
};

/// MySQL-backed store. Conditional writes are `UPDATE ... WHERE status = ?`
/// checked through `rows_affected`, or inserts guarded by unique keys.
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

// ER_DUP_ENTRY, ER_DUP_ENTRY_WITH_KEY_NAME
const DUPLICATE_ENTRY_ERRORS: [u16; 2] = [1062, 1586];

// SQLSTATE 23000 also covers foreign-key and NOT NULL violations, so match the error number
fn is_duplicate_entry(number: u16) -> bool {
    DUPLICATE_ENTRY_ERRORS.contains(&number)
}

fn is_duplicate_key(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .is_some_and(|my| is_duplicate_entry(my.number())),
        _ => false,
    }
}

fn parse_enum<T: FromStr>(raw: &str, column: &str) -> EngineResult<T> {
    T::from_str(raw).map_err(|_| EngineError::Storage(format!("unexpected {column} value '{raw}'")))
}

fn to_json<T: Serialize>(value: &T) -> EngineResult<String> {
    serde_json::to_string(value).map_err(|e| EngineError::Storage(e.to_string()))
}

fn to_json_opt<T: Serialize>(value: &Option<T>) -> EngineResult<Option<String>> {
    value.as_ref().map(to_json).transpose()
}

fn from_json<T: DeserializeOwned>(raw: &str) -> EngineResult<T> {
    serde_json::from_str(raw).map_err(|e| EngineError::Storage(e.to_string()))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/* =========================
Row mappings
========================= */

const DAY_COLUMNS: &str = "employee_id, date, check_in_at, check_out_at, status, method, provenance, \
     check_in_location, check_out_location, notes";

#[derive(FromRow)]
struct DayRow {
    employee_id: u64,
    date: NaiveDate,
    check_in_at: Option<NaiveDateTime>,
    check_out_at: Option<NaiveDateTime>,
    status: String,
    method: String,
    provenance: String,
    check_in_location: Option<String>,
    check_out_location: Option<String>,
    notes: Option<String>,
}

impl TryFrom<DayRow> for AttendanceDay {
    type Error = EngineError;

    fn try_from(row: DayRow) -> EngineResult<Self> {
        Ok(AttendanceDay {
            employee_id: row.employee_id,
            date: row.date,
            check_in_at: row.check_in_at,
            check_out_at: row.check_out_at,
            status: parse_enum(&row.status, "status")?,
            method: parse_enum(&row.method, "method")?,
            provenance: parse_enum(&row.provenance, "provenance")?,
            check_in_location: row.check_in_location.as_deref().map(from_json).transpose()?,
            check_out_location: row.check_out_location.as_deref().map(from_json).transpose()?,
            notes: row.notes,
        })
    }
}

const REQUEST_COLUMNS: &str = "id, employee_id, date, requested_check_in_at, location, method, reason, \
     status, decided_by, decided_at, rejection_reason, decision_comments, created_at";

#[derive(FromRow)]
struct RequestRow {
    id: u64,
    employee_id: u64,
    date: NaiveDate,
    requested_check_in_at: NaiveDateTime,
    location: String,
    method: String,
    reason: String,
    status: String,
    decided_by: Option<u64>,
    decided_at: Option<NaiveDateTime>,
    rejection_reason: Option<String>,
    decision_comments: Option<String>,
    created_at: NaiveDateTime,
}

impl TryFrom<RequestRow> for AttendanceRequest {
    type Error = EngineError;

    fn try_from(row: RequestRow) -> EngineResult<Self> {
        Ok(AttendanceRequest {
            id: row.id,
            employee_id: row.employee_id,
            date: row.date,
            requested_check_in_at: row.requested_check_in_at,
            location: from_json(&row.location)?,
            method: parse_enum(&row.method, "method")?,
            reason: row.reason,
            status: parse_enum(&row.status, "status")?,
            decided_by: row.decided_by,
            decided_at: row.decided_at,
            rejection_reason: row.rejection_reason,
            decision_comments: row.decision_comments,
            created_at: row.created_at,
        })
    }
}

const POINT_COLUMNS: &str = "id, employee_id, recorded_at, latitude, longitude, accuracy_meters, \
     captured_at, site_id, label, kind";

#[derive(FromRow)]
struct PointRow {
    id: u64,
    employee_id: u64,
    recorded_at: NaiveDateTime,
    latitude: f64,
    longitude: f64,
    accuracy_meters: f64,
    captured_at: NaiveDateTime,
    site_id: Option<u64>,
    label: Option<String>,
    kind: String,
}

impl TryFrom<PointRow> for SiteVisitPoint {
    type Error = EngineError;

    fn try_from(row: PointRow) -> EngineResult<Self> {
        Ok(SiteVisitPoint {
            id: row.id,
            employee_id: row.employee_id,
            timestamp: row.recorded_at,
            location: LocationSample::new(
                row.latitude,
                row.longitude,
                row.accuracy_meters,
                row.captured_at,
            ),
            site_id: row.site_id,
            label: row.label,
            kind: parse_enum(&row.kind, "kind")?,
        })
    }
}

const CLAIM_COLUMNS: &str = "id, employee_id, amount, status, batch_id, reimbursed_at";

#[derive(FromRow)]
struct ClaimRow {
    id: u64,
    employee_id: u64,
    amount: f64,
    status: String,
    batch_id: Option<u64>,
    reimbursed_at: Option<NaiveDateTime>,
}

impl TryFrom<ClaimRow> for ReimbursementClaim {
    type Error = EngineError;

    fn try_from(row: ClaimRow) -> EngineResult<Self> {
        Ok(ReimbursementClaim {
            id: row.id,
            employee_id: row.employee_id,
            amount: row.amount,
            status: parse_enum(&row.status, "status")?,
            batch_id: row.batch_id,
            reimbursed_at: row.reimbursed_at,
        })
    }
}

#[derive(FromRow)]
struct BatchRow {
    id: u64,
    status: String,
    reference_number: Option<String>,
    total_amount: f64,
    created_by: u64,
    created_at: NaiveDateTime,
    processed_at: Option<NaiveDateTime>,
    failure_reason: Option<String>,
}

/* =========================
Attendance days & requests
========================= */

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn get_day(&self, employee_id: u64, date: NaiveDate) -> EngineResult<Option<AttendanceDay>> {
        let sql = format!(
            "SELECT {DAY_COLUMNS} FROM attendance_days WHERE employee_id = ? AND date = ?"
        );
        let row = sqlx::query_as::<_, DayRow>(&sql)
            .bind(employee_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AttendanceDay::try_from).transpose()
    }

    async fn insert_day(&self, day: &AttendanceDay) -> EngineResult<()> {
        let sql = format!(
            "INSERT INTO attendance_days ({DAY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        let result = sqlx::query(&sql)
            .bind(day.employee_id)
            .bind(day.date)
            .bind(day.check_in_at)
            .bind(day.check_out_at)
            .bind(day.status.to_string())
            .bind(day.method.to_string())
            .bind(day.provenance.to_string())
            .bind(to_json_opt(&day.check_in_location)?)
            .bind(to_json_opt(&day.check_out_location)?)
            .bind(day.notes.as_deref())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(Conflict::AlreadyCheckedIn.into()),
            Err(e) => {
                tracing::error!(error = %e, employee_id = day.employee_id, "Check-in insert failed");
                Err(e.into())
            }
        }
    }

    async fn record_check_out(&self, write: &CheckOutWrite) -> EngineResult<AttendanceDay> {
        let result = sqlx::query(
            r#"
            UPDATE attendance_days
            SET check_out_at = ?, check_out_location = ?
            WHERE employee_id = ?
            AND date = ?
            AND check_in_at IS NOT NULL
            AND check_out_at IS NULL
            "#,
        )
        .bind(write.check_out_at)
        .bind(to_json(&write.location)?)
        .bind(write.employee_id)
        .bind(write.date)
        .execute(&self.pool)
        .await?;

        let current = self.get_day(write.employee_id, write.date).await?;
        if result.rows_affected() == 0 {
            return Err(match current {
                Some(day) if day.check_in_at.is_some() => Conflict::AlreadyCheckedOut.into(),
                _ => Conflict::NotCheckedIn.into(),
            });
        }
        current.ok_or_else(|| EngineError::Storage("checked-out day vanished".into()))
    }

    async fn get_request(&self, request_id: u64) -> EngineResult<Option<AttendanceRequest>> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM attendance_requests WHERE id = ?");
        let row = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AttendanceRequest::try_from).transpose()
    }

    async fn list_pending_requests(&self) -> EngineResult<Vec<AttendanceRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM attendance_requests WHERE status = 'PENDING' ORDER BY created_at, id"
        );
        sqlx::query_as::<_, RequestRow>(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AttendanceRequest::try_from)
            .collect()
    }

    async fn insert_pending_request(&self, request: &AttendanceRequest) -> EngineResult<AttendanceRequest> {
        // uq_pending_request covers (employee_id, date) only while status = 'PENDING'
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_requests
                (employee_id, date, requested_check_in_at, location, method, reason, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 'PENDING', ?)
            "#,
        )
        .bind(request.employee_id)
        .bind(request.date)
        .bind(request.requested_check_in_at)
        .bind(to_json(&request.location)?)
        .bind(request.method.to_string())
        .bind(request.reason.as_str())
        .bind(request.created_at)
        .execute(&self.pool)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_id(),
            Err(e) if is_duplicate_key(&e) => return Err(Conflict::DuplicateRequest.into()),
            Err(e) => return Err(e.into()),
        };

        self.get_request(id)
            .await?
            .ok_or_else(|| EngineError::Storage(format!("inserted request {id} not readable")))
    }

    async fn decide_request(
        &self,
        decision: &RequestDecision,
        materialize: Option<&AttendanceDay>,
    ) -> EngineResult<AttendanceRequest> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE attendance_requests
            SET status = ?, decided_by = ?, decided_at = ?, rejection_reason = ?, decision_comments = ?
            WHERE id = ?
            AND status = 'PENDING'
            "#,
        )
        .bind(decision.status.to_string())
        .bind(decision.decided_by)
        .bind(decision.decided_at)
        .bind(decision.rejection_reason.as_deref())
        .bind(decision.comments.as_deref())
        .bind(decision.request_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return match self.get_request(decision.request_id).await? {
                Some(_) => Err(Conflict::AlreadyDecided.into()),
                None => Err(EngineError::not_found(format!(
                    "attendance request {}",
                    decision.request_id
                ))),
            };
        }

        if let Some(day) = materialize {
            // check_out_at is assigned first: later assignments already see the new check_in_at
            let sql = format!(
                r#"
                INSERT INTO attendance_days ({DAY_COLUMNS})
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON DUPLICATE KEY UPDATE
                    check_out_location = IF(check_out_at IS NOT NULL AND check_out_at < VALUES(check_in_at), NULL, check_out_location),
                    check_out_at = IF(check_out_at IS NOT NULL AND check_out_at < VALUES(check_in_at), NULL, check_out_at),
                    check_in_at = VALUES(check_in_at),
                    status = VALUES(status),
                    method = VALUES(method),
                    provenance = VALUES(provenance),
                    check_in_location = VALUES(check_in_location),
                    notes = VALUES(notes)
                "#
            );
            sqlx::query(&sql)
                .bind(day.employee_id)
                .bind(day.date)
                .bind(day.check_in_at)
                .bind(day.check_out_at)
                .bind(day.status.to_string())
                .bind(day.method.to_string())
                .bind(day.provenance.to_string())
                .bind(to_json_opt(&day.check_in_location)?)
                .bind(to_json_opt(&day.check_out_location)?)
                .bind(day.notes.as_deref())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.get_request(decision.request_id)
            .await?
            .ok_or_else(|| EngineError::Storage("decided request vanished".into()))
    }
}

/* =========================
Site visits & trails
========================= */

#[async_trait]
impl TrailStore for MySqlStore {
    async fn append_point(&self, point: &NewSiteVisitPoint) -> EngineResult<SiteVisitPoint> {
        let done = sqlx::query(
            r#"
            INSERT INTO site_visit_points
                (employee_id, visit_date, recorded_at, latitude, longitude, accuracy_meters,
                 captured_at, site_id, label, kind)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(point.employee_id)
        .bind(point.timestamp.date())
        .bind(point.timestamp)
        .bind(point.location.latitude)
        .bind(point.location.longitude)
        .bind(point.location.accuracy_meters)
        .bind(point.location.captured_at)
        .bind(point.site_id)
        .bind(point.label.as_deref())
        .bind(point.kind.to_string())
        .execute(&self.pool)
        .await?;

        Ok(SiteVisitPoint {
            id: done.last_insert_id(),
            employee_id: point.employee_id,
            timestamp: point.timestamp,
            location: point.location.clone(),
            site_id: point.site_id,
            label: point.label.clone(),
            kind: point.kind,
        })
    }

    async fn points_for_day(&self, employee_id: u64, date: NaiveDate) -> EngineResult<Vec<SiteVisitPoint>> {
        let sql = format!(
            "SELECT {POINT_COLUMNS} FROM site_visit_points \
             WHERE employee_id = ? AND visit_date = ? ORDER BY recorded_at, id"
        );
        sqlx::query_as::<_, PointRow>(&sql)
            .bind(employee_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(SiteVisitPoint::try_from)
            .collect()
    }

    async fn replace_trail(&self, trail: &MovementTrail) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO movement_trails
                (employee_id, date, total_distance_meters, total_duration_seconds, is_validated,
                 anomaly_count, as_of, trail)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                total_distance_meters = VALUES(total_distance_meters),
                total_duration_seconds = VALUES(total_duration_seconds),
                is_validated = VALUES(is_validated),
                anomaly_count = VALUES(anomaly_count),
                as_of = VALUES(as_of),
                trail = VALUES(trail)
            "#,
        )
        .bind(trail.employee_id)
        .bind(trail.date)
        .bind(trail.total_distance_meters)
        .bind(trail.total_duration_seconds)
        .bind(trail.is_validated)
        .bind(trail.anomalies.len() as u32)
        .bind(trail.as_of)
        .bind(to_json(trail)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_trail(&self, employee_id: u64, date: NaiveDate) -> EngineResult<Option<MovementTrail>> {
        let raw = sqlx::query_scalar::<_, String>(
            "SELECT trail FROM movement_trails WHERE employee_id = ? AND date = ?",
        )
        .bind(employee_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        raw.as_deref().map(from_json).transpose()
    }
}

/* =========================
Reimbursement batches
========================= */

impl MySqlStore {
    async fn load_batch(&self, batch_id: u64) -> EngineResult<Option<ReimbursementBatch>> {
        let row = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT id, status, reference_number, total_amount, created_by, created_at,
                   processed_at, failure_reason
            FROM reimbursement_batches
            WHERE id = ?
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let member_claim_ids = sqlx::query_scalar::<_, u64>(
            "SELECT claim_id FROM reimbursement_batch_members WHERE batch_id = ? ORDER BY claim_id",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ReimbursementBatch {
            id: row.id,
            status: parse_enum(&row.status, "status")?,
            reference_number: row.reference_number,
            total_amount: row.total_amount,
            member_claim_ids,
            created_by: row.created_by,
            created_at: row.created_at,
            processed_at: row.processed_at,
            failure_reason: row.failure_reason,
        }))
    }

    async fn member_claims(&self, batch_id: u64) -> EngineResult<Vec<ReimbursementClaim>> {
        let sql = format!(
            "SELECT {CLAIM_COLUMNS} FROM reimbursement_claims WHERE id IN \
             (SELECT claim_id FROM reimbursement_batch_members WHERE batch_id = ?) ORDER BY id"
        );
        sqlx::query_as::<_, ClaimRow>(&sql)
            .bind(batch_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(ReimbursementClaim::try_from)
            .collect()
    }

    /// Explains why a conditional batch update touched nothing.
    async fn batch_transition_error(&self, batch_id: u64) -> EngineError {
        match self.load_batch(batch_id).await {
            Ok(Some(_)) => Conflict::InvalidBatchTransition.into(),
            Ok(None) => EngineError::not_found(format!("batch {batch_id}")),
            Err(e) => e,
        }
    }

    async fn transition_result(&self, batch_id: u64) -> EngineResult<BatchTransition> {
        let batch = self
            .load_batch(batch_id)
            .await?
            .ok_or_else(|| EngineError::Storage(format!("batch {batch_id} vanished")))?;
        let claims = self.member_claims(batch_id).await?;
        Ok(BatchTransition { batch, claims })
    }
}

#[async_trait]
impl ReimbursementStore for MySqlStore {
    async fn get_claim(&self, claim_id: u64) -> EngineResult<Option<ReimbursementClaim>> {
        let sql = format!("SELECT {CLAIM_COLUMNS} FROM reimbursement_claims WHERE id = ?");
        let row = sqlx::query_as::<_, ClaimRow>(&sql)
            .bind(claim_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ReimbursementClaim::try_from).transpose()
    }

    async fn get_batch(&self, batch_id: u64) -> EngineResult<Option<ReimbursementBatch>> {
        self.load_batch(batch_id).await
    }

    async fn create_batch(
        &self,
        claim_ids: &[u64],
        created_by: u64,
        created_at: NaiveDateTime,
    ) -> EngineResult<ReimbursementBatch> {
        let mut tx = self.pool.begin().await?;

        let select_sql = format!(
            "SELECT {CLAIM_COLUMNS} FROM reimbursement_claims WHERE id IN ({}) FOR UPDATE",
            placeholders(claim_ids.len())
        );
        let mut select_q = sqlx::query_as::<_, ClaimRow>(&select_sql);
        for id in claim_ids {
            select_q = select_q.bind(*id);
        }
        let claims: Vec<ReimbursementClaim> = select_q
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(ReimbursementClaim::try_from)
            .collect::<EngineResult<_>>()?;

        if let Some(missing) = claim_ids
            .iter()
            .find(|id| !claims.iter().any(|c| c.id == **id))
        {
            tx.rollback().await?;
            return Err(EngineError::not_found(format!("claim {missing}")));
        }
        if claims.iter().any(|c| !c.is_batchable()) {
            tx.rollback().await?;
            return Err(Conflict::ClaimUnavailable.into());
        }

        let total_amount: f64 = claims.iter().map(|c| c.amount).sum();
        let batch_id = sqlx::query(
            r#"
            INSERT INTO reimbursement_batches (status, total_amount, created_by, created_at)
            VALUES ('PENDING', ?, ?, ?)
            "#,
        )
        .bind(total_amount)
        .bind(created_by)
        .bind(created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_id();

        let link_sql = format!(
            "UPDATE reimbursement_claims SET batch_id = ? \
             WHERE id IN ({}) AND status = 'APPROVED' AND batch_id IS NULL",
            placeholders(claim_ids.len())
        );
        let mut link_q = sqlx::query(&link_sql).bind(batch_id);
        for id in claim_ids {
            link_q = link_q.bind(*id);
        }
        let linked = link_q.execute(&mut *tx).await?.rows_affected();
        if linked != claim_ids.len() as u64 {
            tx.rollback().await?;
            return Err(Conflict::ClaimUnavailable.into());
        }

        for id in claim_ids {
            sqlx::query("INSERT INTO reimbursement_batch_members (batch_id, claim_id) VALUES (?, ?)")
                .bind(batch_id)
                .bind(*id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.load_batch(batch_id)
            .await?
            .ok_or_else(|| EngineError::Storage(format!("batch {batch_id} not readable")))
    }

    async fn mark_processing(
        &self,
        batch_id: u64,
        reference_number: Option<&str>,
    ) -> EngineResult<ReimbursementBatch> {
        let result = sqlx::query(
            r#"
            UPDATE reimbursement_batches
            SET status = 'PROCESSING', reference_number = COALESCE(?, reference_number)
            WHERE id = ?
            AND status = 'PENDING'
            "#,
        )
        .bind(reference_number)
        .bind(batch_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.batch_transition_error(batch_id).await);
        }
        self.load_batch(batch_id)
            .await?
            .ok_or_else(|| EngineError::Storage(format!("batch {batch_id} vanished")))
    }

    async fn complete_batch(
        &self,
        batch_id: u64,
        reference_number: &str,
        completed_at: NaiveDateTime,
    ) -> EngineResult<BatchTransition> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE reimbursement_batches
            SET status = 'COMPLETED', reference_number = ?, processed_at = ?
            WHERE id = ?
            AND status = 'PROCESSING'
            "#,
        )
        .bind(reference_number)
        .bind(completed_at)
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(self.batch_transition_error(batch_id).await);
        }

        sqlx::query(
            "UPDATE reimbursement_claims SET status = 'REIMBURSED', reimbursed_at = ? WHERE batch_id = ?",
        )
        .bind(completed_at)
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.transition_result(batch_id).await
    }

    async fn fail_batch(
        &self,
        batch_id: u64,
        reason: &str,
        failed_at: NaiveDateTime,
    ) -> EngineResult<BatchTransition> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE reimbursement_batches
            SET status = 'FAILED', failure_reason = ?, processed_at = ?
            WHERE id = ?
            AND status = 'PROCESSING'
            "#,
        )
        .bind(reason)
        .bind(failed_at)
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(self.batch_transition_error(batch_id).await);
        }

        // compensating release: claims go back to their pre-batch approved state
        sqlx::query(
            "UPDATE reimbursement_claims SET batch_id = NULL, status = 'APPROVED' WHERE batch_id = ?",
        )
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.transition_result(batch_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_duplicate_entries_count_as_duplicate_keys() {
        assert!(is_duplicate_entry(1062));
        assert!(is_duplicate_entry(1586));
        // foreign key, NOT NULL
        assert!(!is_duplicate_entry(1452));
        assert!(!is_duplicate_entry(1048));
        assert!(!is_duplicate_key(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
