//! Repository layer for the `gauges` table
//!
//! Every function takes the connection of an open unit of work. Functions
//! named `lock*` take `FOR UPDATE` row locks that are held until that unit
//! of work commits or rolls back.

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

use super::models::{EquipmentType, Gauge, GaugeSpec, GaugeStatus, Suffix, ThreadSpec};
use crate::core_types::{ActorId, GaugeId, HolderId};
use crate::error::GaugeError;

const GAUGE_COLUMNS: &str = r#"
    id, business_id, equipment_type, category_id, status, companion_gauge_id,
    suffix, is_spare, is_sealed, thread_size, thread_class, thread_type,
    thread_form, storage_location, holder_id, is_deleted, created_by,
    created_at, updated_at
"#;

/// Insert payload
#[derive(Debug, Clone)]
pub struct NewGauge<'a> {
    pub business_id: String,
    pub spec: &'a GaugeSpec,
    pub suffix: Option<Suffix>,
    pub is_spare: bool,
    pub created_by: ActorId,
}

/// Gauge repository
pub struct GaugeRepository;

impl GaugeRepository {
    /// Draw the next value of the business ID sequence
    pub async fn next_business_seq(conn: &mut PgConnection) -> Result<i64, GaugeError> {
        let seq = sqlx::query_scalar::<_, i64>("SELECT nextval('gauge_business_seq')")
            .fetch_one(conn)
            .await?;
        Ok(seq)
    }

    pub async fn insert(
        conn: &mut PgConnection,
        new: &NewGauge<'_>,
    ) -> Result<Gauge, GaugeError> {
        let thread = new.spec.thread.as_ref();
        let sql = format!(
            r#"
            INSERT INTO gauges
                (business_id, equipment_type, category_id, status, companion_gauge_id,
                 suffix, is_spare, is_sealed, thread_size, thread_class, thread_type,
                 thread_form, storage_location, created_by, created_at, updated_at)
            VALUES
                ($1, $2, $3, $4, NULL, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW(), NOW())
            RETURNING {GAUGE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&new.business_id)
            .bind(new.spec.equipment_type.id())
            .bind(new.spec.category_id)
            .bind(GaugeStatus::Available.id())
            .bind(new.suffix.map(|s| s.as_str()))
            .bind(new.is_spare)
            .bind(new.spec.is_sealed)
            .bind(thread.map(|t| t.size.trim()))
            .bind(thread.map(|t| t.class.trim()))
            .bind(thread.map(|t| t.thread_type.trim()))
            .bind(thread.map(|t| t.form.trim()))
            .bind(new.spec.storage_location.as_deref())
            .bind(new.created_by)
            .fetch_one(conn)
            .await?;

        row_to_gauge(&row)
    }

    /// Read without locking
    pub async fn find(
        conn: &mut PgConnection,
        id: GaugeId,
    ) -> Result<Option<Gauge>, GaugeError> {
        let sql = format!("SELECT {GAUGE_COLUMNS} FROM gauges WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(conn).await?;

        row.as_ref().map(row_to_gauge).transpose()
    }

    /// Lock one gauge row (`SELECT ... FOR UPDATE`)
    pub async fn lock(conn: &mut PgConnection, id: GaugeId) -> Result<Gauge, GaugeError> {
        let sql = format!("SELECT {GAUGE_COLUMNS} FROM gauges WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or(GaugeError::GaugeNotFound(id))?;

        row_to_gauge(&row)
    }

    /// Lock several gauge rows, one at a time, in ascending ID order.
    ///
    /// Two operations touching the same rows always queue in the same
    /// order, so they cannot deadlock on each other. The result is in
    /// ascending ID order with duplicates removed.
    pub async fn lock_ordered(
        conn: &mut PgConnection,
        ids: &[GaugeId],
    ) -> Result<Vec<Gauge>, GaugeError> {
        let order = lock_order(ids);
        let mut locked = Vec::with_capacity(order.len());
        for id in order {
            locked.push(Self::lock(&mut *conn, id).await?);
        }
        Ok(locked)
    }

    /// Lock two gauges in canonical order, returned in argument order
    pub async fn lock_pair(
        conn: &mut PgConnection,
        a: GaugeId,
        b: GaugeId,
    ) -> Result<(Gauge, Gauge), GaugeError> {
        let locked = Self::lock_ordered(conn, &[a, b]).await?;
        let pick = |id: GaugeId| {
            locked
                .iter()
                .find(|g| g.id == id)
                .cloned()
                .ok_or(GaugeError::GaugeNotFound(id))
        };
        Ok((pick(a)?, pick(b)?))
    }

    /// Write one side of a companion link
    pub async fn set_companion(
        conn: &mut PgConnection,
        id: GaugeId,
        companion: Option<GaugeId>,
        is_spare: bool,
    ) -> Result<(), GaugeError> {
        sqlx::query(
            r#"
            UPDATE gauges
            SET companion_gauge_id = $1, is_spare = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(companion)
        .bind(is_spare)
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn set_status(
        conn: &mut PgConnection,
        id: GaugeId,
        status: GaugeStatus,
    ) -> Result<(), GaugeError> {
        sqlx::query("UPDATE gauges SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.id())
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Status and holder change together for custody moves
    pub async fn set_custody(
        conn: &mut PgConnection,
        id: GaugeId,
        status: GaugeStatus,
        holder: Option<HolderId>,
    ) -> Result<(), GaugeError> {
        sqlx::query(
            "UPDATE gauges SET status = $1, holder_id = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(status.id())
        .bind(holder)
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn set_storage_location(
        conn: &mut PgConnection,
        id: GaugeId,
        location: &str,
    ) -> Result<(), GaugeError> {
        sqlx::query("UPDATE gauges SET storage_location = $1, updated_at = NOW() WHERE id = $2")
            .bind(location)
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Soft delete; rows are never removed
    pub async fn mark_retired(conn: &mut PgConnection, id: GaugeId) -> Result<(), GaugeError> {
        sqlx::query(
            r#"
            UPDATE gauges
            SET status = $1, is_deleted = TRUE, is_spare = FALSE, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(GaugeStatus::Retired.id())
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }
}

/// Canonical lock order: ascending, deduplicated
pub fn lock_order(ids: &[GaugeId]) -> Vec<GaugeId> {
    let mut order = ids.to_vec();
    order.sort_unstable();
    order.dedup();
    order
}

/// Display ID for a new gauge: `<prefix>-<seq:06><suffix>`
pub fn business_id(equipment_type: EquipmentType, seq: i64, suffix: Option<Suffix>) -> String {
    match suffix {
        Some(s) => format!("{}-{:06}{}", equipment_type.business_prefix(), seq, s),
        None => format!("{}-{:06}", equipment_type.business_prefix(), seq),
    }
}

/// Convert database row to Gauge
pub fn row_to_gauge(row: &PgRow) -> Result<Gauge, GaugeError> {
    let type_id: i16 = row.try_get("equipment_type")?;
    let equipment_type = EquipmentType::from_id(type_id).ok_or_else(|| {
        GaugeError::DatabaseError(format!("Invalid equipment_type: {}", type_id))
    })?;

    let status_id: i16 = row.try_get("status")?;
    let status = GaugeStatus::from_id(status_id)
        .ok_or_else(|| GaugeError::DatabaseError(format!("Invalid status: {}", status_id)))?;

    let suffix = match row.try_get::<Option<String>, _>("suffix")? {
        Some(code) => Some(
            Suffix::from_code(&code)
                .ok_or_else(|| GaugeError::DatabaseError(format!("Invalid suffix: {}", code)))?,
        ),
        None => None,
    };

    let thread = match (
        row.try_get::<Option<String>, _>("thread_size")?,
        row.try_get::<Option<String>, _>("thread_class")?,
        row.try_get::<Option<String>, _>("thread_type")?,
        row.try_get::<Option<String>, _>("thread_form")?,
    ) {
        (Some(size), Some(class), Some(thread_type), Some(form)) => Some(ThreadSpec {
            size,
            class,
            thread_type,
            form,
        }),
        _ => None,
    };

    Ok(Gauge {
        id: row.try_get("id")?,
        business_id: row.try_get("business_id")?,
        equipment_type,
        category_id: row.try_get("category_id")?,
        status,
        companion_gauge_id: row.try_get("companion_gauge_id")?,
        suffix,
        is_spare: row.try_get("is_spare")?,
        is_sealed: row.try_get("is_sealed")?,
        thread,
        storage_location: row.try_get("storage_location")?,
        holder_id: row.try_get("holder_id")?,
        is_deleted: row.try_get("is_deleted")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_order_is_ascending_and_unique() {
        assert_eq!(lock_order(&[9, 3]), vec![3, 9]);
        assert_eq!(lock_order(&[3, 9]), vec![3, 9]);
        assert_eq!(lock_order(&[7, 2, 7, 5]), vec![2, 5, 7]);
    }

    #[test]
    fn test_business_id_format() {
        assert_eq!(
            business_id(EquipmentType::ThreadGauge, 123, Some(Suffix::Go)),
            "TG-000123A"
        );
        assert_eq!(
            business_id(EquipmentType::ThreadGauge, 123, Some(Suffix::NoGo)),
            "TG-000123B"
        );
        assert_eq!(business_id(EquipmentType::LargeEquipment, 7, None), "LE-000007");
    }
}
