//! Calibration persistence
//!
//! Batch rows are locked before gauge rows, gauge rows before membership
//! rows. Every membership change also touches its batch row, so two units
//! of work racing on the same batch cannot both pass a completeness check
//! taken from stale snapshots.

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

use super::state::{BatchState, MembershipState};
use super::types::{CalibrationBatch, Certificate, Membership};
use crate::core_types::{ActorId, BatchId, GaugeId};
use crate::error::GaugeError;
use crate::gauge::GaugeStatus;

const BATCH_COLUMNS: &str = "id, status, created_by, created_at, sent_at, closed_at, updated_at";

const MEMBERSHIP_COLUMNS: &str = r#"
    m.id, m.batch_id, m.gauge_id, m.state, m.certificate_verified, m.prior_status,
    m.added_at, m.received_at, m.released_at
"#;

pub struct CalibrationDb;

impl CalibrationDb {
    // ========================================================================
    // Batches
    // ========================================================================

    pub async fn insert_batch(
        conn: &mut PgConnection,
        created_by: ActorId,
    ) -> Result<CalibrationBatch, GaugeError> {
        let sql = format!(
            r#"
            INSERT INTO calibration_batches (status, created_by, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            RETURNING {BATCH_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(BatchState::PendingAssembly.id())
            .bind(created_by)
            .fetch_one(conn)
            .await?;
        row_to_batch(&row)
    }

    pub async fn find_batch(
        conn: &mut PgConnection,
        batch_id: BatchId,
    ) -> Result<Option<CalibrationBatch>, GaugeError> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM calibration_batches WHERE id = $1");
        let row = sqlx::query(&sql).bind(batch_id).fetch_optional(conn).await?;
        row.as_ref().map(row_to_batch).transpose()
    }

    pub async fn lock_batch(
        conn: &mut PgConnection,
        batch_id: BatchId,
    ) -> Result<CalibrationBatch, GaugeError> {
        let sql =
            format!("SELECT {BATCH_COLUMNS} FROM calibration_batches WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(batch_id)
            .fetch_optional(conn)
            .await?
            .ok_or(GaugeError::BatchNotFound(batch_id))?;
        row_to_batch(&row)
    }

    /// Move the batch and stamp `sent_at` / `closed_at` as appropriate
    pub async fn set_batch_state(
        conn: &mut PgConnection,
        batch_id: BatchId,
        state: BatchState,
    ) -> Result<(), GaugeError> {
        sqlx::query(
            r#"
            UPDATE calibration_batches
            SET status = $1,
                sent_at = CASE WHEN $1 = $3 THEN NOW() ELSE sent_at END,
                closed_at = CASE WHEN $1 = $4 THEN NOW() ELSE closed_at END,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(state.id())
        .bind(batch_id)
        .bind(BatchState::SentToCalibration.id())
        .bind(BatchState::Closed.id())
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn touch_batch(conn: &mut PgConnection, batch_id: BatchId) -> Result<(), GaugeError> {
        sqlx::query("UPDATE calibration_batches SET updated_at = NOW() WHERE id = $1")
            .bind(batch_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Memberships
    // ========================================================================

    pub async fn insert_membership(
        conn: &mut PgConnection,
        batch_id: BatchId,
        gauge_id: GaugeId,
        prior_status: GaugeStatus,
    ) -> Result<Membership, GaugeError> {
        let sql = format!(
            r#"
            WITH m AS (
                INSERT INTO calibration_memberships
                    (batch_id, gauge_id, state, certificate_verified, prior_status, added_at)
                VALUES ($1, $2, $3, FALSE, $4, NOW())
                RETURNING *
            )
            SELECT {MEMBERSHIP_COLUMNS} FROM m
            "#
        );
        let row = sqlx::query(&sql)
            .bind(batch_id)
            .bind(gauge_id)
            .bind(MembershipState::Pending.id())
            .bind(prior_status.id())
            .fetch_one(conn)
            .await?;
        row_to_membership(&row)
    }

    pub async fn delete_membership(
        conn: &mut PgConnection,
        membership_id: i64,
    ) -> Result<(), GaugeError> {
        sqlx::query("DELETE FROM calibration_memberships WHERE id = $1")
            .bind(membership_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// The gauge's membership that can still move, in a batch that is not
    /// closed. At most one exists.
    pub async fn find_open_membership(
        conn: &mut PgConnection,
        gauge_id: GaugeId,
    ) -> Result<Option<Membership>, GaugeError> {
        let sql = format!(
            r#"
            SELECT {MEMBERSHIP_COLUMNS}
            FROM calibration_memberships m
            JOIN calibration_batches b ON b.id = m.batch_id
            WHERE m.gauge_id = $1
              AND m.state NOT IN ($2, $3)
              AND b.status <> $4
            ORDER BY m.id DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query(&sql)
            .bind(gauge_id)
            .bind(MembershipState::Released.id())
            .bind(MembershipState::Failed.id())
            .bind(BatchState::Closed.id())
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(row_to_membership).transpose()
    }

    pub async fn lock_membership(
        conn: &mut PgConnection,
        batch_id: BatchId,
        gauge_id: GaugeId,
    ) -> Result<Option<Membership>, GaugeError> {
        let sql = format!(
            r#"
            SELECT {MEMBERSHIP_COLUMNS}
            FROM calibration_memberships m
            WHERE m.batch_id = $1 AND m.gauge_id = $2
            FOR UPDATE
            "#
        );
        let row = sqlx::query(&sql)
            .bind(batch_id)
            .bind(gauge_id)
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(row_to_membership).transpose()
    }

    pub async fn memberships(
        conn: &mut PgConnection,
        batch_id: BatchId,
    ) -> Result<Vec<Membership>, GaugeError> {
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM calibration_memberships m WHERE m.batch_id = $1 ORDER BY m.id"
        );
        let rows = sqlx::query(&sql).bind(batch_id).fetch_all(conn).await?;
        rows.iter().map(row_to_membership).collect()
    }

    /// Record a membership move; `received_at` / `released_at` and the
    /// verified flag follow the target state
    pub async fn set_membership_state(
        conn: &mut PgConnection,
        membership_id: i64,
        state: MembershipState,
    ) -> Result<(), GaugeError> {
        sqlx::query(
            r#"
            UPDATE calibration_memberships
            SET state = $1,
                received_at = CASE WHEN $1 IN ($3, $4) THEN NOW() ELSE received_at END,
                released_at = CASE WHEN $1 = $5 THEN NOW() ELSE released_at END,
                certificate_verified = certificate_verified OR $1 = $6
            WHERE id = $2
            "#,
        )
        .bind(state.id())
        .bind(membership_id)
        .bind(MembershipState::Received.id())
        .bind(MembershipState::Failed.id())
        .bind(MembershipState::Released.id())
        .bind(MembershipState::CertificatesVerified.id())
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Move every pending member gauge of a batch in one statement
    pub async fn set_member_gauges_status(
        conn: &mut PgConnection,
        batch_id: BatchId,
        status: GaugeStatus,
    ) -> Result<u64, GaugeError> {
        let result = sqlx::query(
            r#"
            UPDATE gauges
            SET status = $1, updated_at = NOW()
            WHERE id IN (
                SELECT gauge_id FROM calibration_memberships
                WHERE batch_id = $2 AND state = $3
            )
            "#,
        )
        .bind(status.id())
        .bind(batch_id)
        .bind(MembershipState::Pending.id())
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Certificates
    // ========================================================================

    pub async fn insert_certificate(
        conn: &mut PgConnection,
        gauge_id: GaugeId,
        batch_id: BatchId,
        document_ref: &str,
        uploaded_by: ActorId,
    ) -> Result<Certificate, GaugeError> {
        let row = sqlx::query(
            r#"
            INSERT INTO gauge_certificates (gauge_id, batch_id, document_ref, uploaded_by, uploaded_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, gauge_id, batch_id, document_ref, uploaded_by, uploaded_at
            "#,
        )
        .bind(gauge_id)
        .bind(batch_id)
        .bind(document_ref)
        .bind(uploaded_by)
        .fetch_one(conn)
        .await?;

        Ok(Certificate {
            id: row.try_get("id")?,
            gauge_id: row.try_get("gauge_id")?,
            batch_id: row.try_get("batch_id")?,
            document_ref: row.try_get("document_ref")?,
            uploaded_by: row.try_get("uploaded_by")?,
            uploaded_at: row.try_get("uploaded_at")?,
        })
    }

    pub async fn certificate_count(
        conn: &mut PgConnection,
        gauge_id: GaugeId,
        batch_id: BatchId,
    ) -> Result<i64, GaugeError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM gauge_certificates WHERE gauge_id = $1 AND batch_id = $2",
        )
        .bind(gauge_id)
        .bind(batch_id)
        .fetch_one(conn)
        .await?;
        Ok(count)
    }
}

fn row_to_batch(row: &PgRow) -> Result<CalibrationBatch, GaugeError> {
    Ok(CalibrationBatch {
        id: row.try_get("id")?,
        state: BatchState::try_from(row.try_get::<i16, _>("status")?)?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        sent_at: row.try_get("sent_at")?,
        closed_at: row.try_get("closed_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_membership(row: &PgRow) -> Result<Membership, GaugeError> {
    Ok(Membership {
        id: row.try_get("id")?,
        batch_id: row.try_get("batch_id")?,
        gauge_id: row.try_get("gauge_id")?,
        state: MembershipState::try_from(row.try_get::<i16, _>("state")?)?,
        certificate_verified: row.try_get("certificate_verified")?,
        prior_status: GaugeStatus::try_from(row.try_get::<i16, _>("prior_status")?)?,
        added_at: row.try_get("added_at")?,
        received_at: row.try_get("received_at")?,
        released_at: row.try_get("released_at")?,
    })
}
