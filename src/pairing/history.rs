//! Companion history
//!
//! Append-only; rows are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, Row};
use std::fmt;

use crate::core_types::{ActorId, GaugeId};
use crate::error::GaugeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum CompanionAction {
    Paired = 1,
    Unpaired = 2,
    Replaced = 3,
}

impl CompanionAction {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(CompanionAction::Paired),
            2 => Some(CompanionAction::Unpaired),
            3 => Some(CompanionAction::Replaced),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompanionAction::Paired => "paired",
            CompanionAction::Unpaired => "unpaired",
            CompanionAction::Replaced => "replaced",
        }
    }
}

impl fmt::Display for CompanionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One history row
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub gauge_id: GaugeId,
    /// Companion after the action; `None` for `unpaired`
    pub companion_gauge_id: Option<GaugeId>,
    pub action: CompanionAction,
    pub reason: Option<String>,
    pub actor_id: ActorId,
    pub created_at: DateTime<Utc>,
}

pub struct CompanionHistory;

impl CompanionHistory {
    pub async fn append(
        conn: &mut PgConnection,
        gauge_id: GaugeId,
        companion_gauge_id: Option<GaugeId>,
        action: CompanionAction,
        reason: Option<&str>,
        actor_id: ActorId,
    ) -> Result<(), GaugeError> {
        sqlx::query(
            r#"
            INSERT INTO companion_history
                (gauge_id, companion_gauge_id, action, reason, actor_id, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(gauge_id)
        .bind(companion_gauge_id)
        .bind(action.id())
        .bind(reason)
        .bind(actor_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Oldest first
    pub async fn for_gauge(
        conn: &mut PgConnection,
        gauge_id: GaugeId,
    ) -> Result<Vec<HistoryEntry>, GaugeError> {
        let rows = sqlx::query(
            r#"
            SELECT id, gauge_id, companion_gauge_id, action, reason, actor_id, created_at
            FROM companion_history
            WHERE gauge_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(gauge_id)
        .fetch_all(conn)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let action_id: i16 = row.try_get("action")?;
            let action = CompanionAction::from_id(action_id).ok_or_else(|| {
                GaugeError::DatabaseError(format!("Invalid companion action: {}", action_id))
            })?;
            entries.push(HistoryEntry {
                id: row.try_get("id")?,
                gauge_id: row.try_get("gauge_id")?,
                companion_gauge_id: row.try_get("companion_gauge_id")?,
                action,
                reason: row.try_get("reason")?,
                actor_id: row.try_get("actor_id")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(entries)
    }
}
