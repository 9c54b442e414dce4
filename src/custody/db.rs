//! Custody persistence: checkout records, transfers and the movement log

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

use super::types::{CheckoutRecord, GaugeTransfer, MovementType, TransferId, TransferStatus};
use crate::core_types::{ActorId, GaugeId, HolderId};
use crate::error::GaugeError;

const TRANSFER_COLUMNS: &str = r#"
    transfer_id, gauge_id, from_holder_id, to_holder_id, status, reason,
    created_by, created_at, resolved_at
"#;

pub struct CustodyDb;

impl CustodyDb {
    pub async fn open_checkout(
        conn: &mut PgConnection,
        gauge_id: GaugeId,
    ) -> Result<Option<CheckoutRecord>, GaugeError> {
        let row = sqlx::query(
            r#"
            SELECT id, gauge_id, holder_id, checked_out_at, returned_at
            FROM checkout_records
            WHERE gauge_id = $1 AND returned_at IS NULL
            "#,
        )
        .bind(gauge_id)
        .fetch_optional(conn)
        .await?;
        row.as_ref().map(row_to_checkout).transpose()
    }

    pub async fn insert_checkout(
        conn: &mut PgConnection,
        gauge_id: GaugeId,
        holder_id: HolderId,
    ) -> Result<CheckoutRecord, GaugeError> {
        let row = sqlx::query(
            r#"
            INSERT INTO checkout_records (gauge_id, holder_id, checked_out_at)
            VALUES ($1, $2, NOW())
            RETURNING id, gauge_id, holder_id, checked_out_at, returned_at
            "#,
        )
        .bind(gauge_id)
        .bind(holder_id)
        .fetch_one(conn)
        .await?;
        row_to_checkout(&row)
    }

    /// Close an open record. `false` if it was already closed.
    pub async fn close_checkout(conn: &mut PgConnection, record_id: i64) -> Result<bool, GaugeError> {
        let result = sqlx::query(
            "UPDATE checkout_records SET returned_at = NOW() WHERE id = $1 AND returned_at IS NULL",
        )
        .bind(record_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_transfer(
        conn: &mut PgConnection,
        transfer: &GaugeTransfer,
    ) -> Result<(), GaugeError> {
        sqlx::query(
            r#"
            INSERT INTO gauge_transfers
                (transfer_id, gauge_id, from_holder_id, to_holder_id, status, reason,
                 created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(transfer.transfer_id.to_string())
        .bind(transfer.gauge_id)
        .bind(transfer.from_holder_id)
        .bind(transfer.to_holder_id)
        .bind(transfer.status.id())
        .bind(&transfer.reason)
        .bind(transfer.created_by)
        .bind(transfer.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn find_transfer(
        conn: &mut PgConnection,
        transfer_id: TransferId,
    ) -> Result<Option<GaugeTransfer>, GaugeError> {
        let sql = format!("SELECT {TRANSFER_COLUMNS} FROM gauge_transfers WHERE transfer_id = $1");
        let row = sqlx::query(&sql)
            .bind(transfer_id.to_string())
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(row_to_transfer).transpose()
    }

    pub async fn lock_transfer(
        conn: &mut PgConnection,
        transfer_id: TransferId,
    ) -> Result<GaugeTransfer, GaugeError> {
        let sql = format!(
            "SELECT {TRANSFER_COLUMNS} FROM gauge_transfers WHERE transfer_id = $1 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(transfer_id.to_string())
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| GaugeError::TransferNotFound(transfer_id.to_string()))?;
        row_to_transfer(&row)
    }

    /// CAS on the pending status; `false` if another unit of work resolved it
    pub async fn resolve_transfer(
        conn: &mut PgConnection,
        transfer_id: TransferId,
        status: TransferStatus,
    ) -> Result<bool, GaugeError> {
        let result = sqlx::query(
            r#"
            UPDATE gauge_transfers
            SET status = $1, resolved_at = NOW()
            WHERE transfer_id = $2 AND status = $3
            "#,
        )
        .bind(status.id())
        .bind(transfer_id.to_string())
        .bind(TransferStatus::Pending.id())
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn record_movement(
        conn: &mut PgConnection,
        gauge_id: GaugeId,
        movement_type: MovementType,
        from_holder_id: Option<HolderId>,
        to_holder_id: Option<HolderId>,
        actor_id: ActorId,
    ) -> Result<(), GaugeError> {
        sqlx::query(
            r#"
            INSERT INTO gauge_movements
                (gauge_id, movement_type, from_holder_id, to_holder_id, actor_id, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(gauge_id)
        .bind(movement_type.id())
        .bind(from_holder_id)
        .bind(to_holder_id)
        .bind(actor_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn movement_count(
        conn: &mut PgConnection,
        gauge_id: GaugeId,
    ) -> Result<i64, GaugeError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM gauge_movements WHERE gauge_id = $1")
                .bind(gauge_id)
                .fetch_one(conn)
                .await?;
        Ok(count)
    }
}

fn row_to_checkout(row: &PgRow) -> Result<CheckoutRecord, GaugeError> {
    Ok(CheckoutRecord {
        id: row.try_get("id")?,
        gauge_id: row.try_get("gauge_id")?,
        holder_id: row.try_get("holder_id")?,
        checked_out_at: row.try_get("checked_out_at")?,
        returned_at: row.try_get("returned_at")?,
    })
}

fn row_to_transfer(row: &PgRow) -> Result<GaugeTransfer, GaugeError> {
    let id_str: String = row.try_get("transfer_id")?;
    let transfer_id = id_str
        .parse::<TransferId>()
        .map_err(|e| GaugeError::DatabaseError(format!("Invalid transfer_id {}: {}", id_str, e)))?;
    let status_id: i16 = row.try_get("status")?;
    let status = TransferStatus::from_id(status_id).ok_or_else(|| {
        GaugeError::DatabaseError(format!("Invalid transfer status: {}", status_id))
    })?;

    Ok(GaugeTransfer {
        transfer_id,
        gauge_id: row.try_get("gauge_id")?,
        from_holder_id: row.try_get("from_holder_id")?,
        to_holder_id: row.try_get("to_holder_id")?,
        status,
        reason: row.try_get("reason")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}
