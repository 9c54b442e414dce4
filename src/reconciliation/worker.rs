//! Reconciliation Worker
//!
//! Background worker that periodically audits companion links.

use sqlx::Row;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{CompanionLink, Violation, detect_violations};
use crate::config::ReconciliationConfig;
use crate::db::Database;
use crate::error::GaugeError;
use crate::gauge::GaugeRepository;

/// Configuration for the reconciliation worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to sweep
    pub scan_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&ReconciliationConfig::default())
    }
}

impl From<&ReconciliationConfig> for WorkerConfig {
    fn from(config: &ReconciliationConfig) -> Self {
        Self {
            scan_interval: Duration::from_secs(config.scan_interval_secs.max(1)),
        }
    }
}

pub struct ReconciliationWorker {
    db: Database,
    config: WorkerConfig,
}

impl ReconciliationWorker {
    pub fn new(db: Database, config: WorkerConfig) -> Self {
        Self { db, config }
    }

    /// Run the sweep loop; never returns
    pub async fn run(&self) {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            "Starting reconciliation worker"
        );

        loop {
            if let Err(e) = self.sweep().await {
                error!(error = %e, "Reconciliation sweep failed");
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// One pass over every linked gauge. Returns what was found; each
    /// finding is also logged and recorded in `integrity_violations`
    /// (once per unresolved kind and gauge) with both gauge rows as they
    /// stood when it was found.
    pub async fn sweep(&self) -> Result<Vec<Violation>, GaugeError> {
        let mut conn = self.db.acquire().await?;

        // One statement, one snapshot: in-flight pair writes are invisible
        let rows = sqlx::query(
            r#"
            SELECT g.id, g.companion_gauge_id, g.is_spare,
                   t.id IS NOT NULL AS target_exists,
                   t.companion_gauge_id AS target_companion_id
            FROM gauges g
            LEFT JOIN gauges t ON t.id = g.companion_gauge_id
            WHERE g.companion_gauge_id IS NOT NULL
            ORDER BY g.id
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut links = Vec::with_capacity(rows.len());
        for row in &rows {
            let target_exists: bool = row.try_get("target_exists")?;
            let target_companion: Option<i64> = row.try_get("target_companion_id")?;
            links.push(CompanionLink {
                gauge_id: row.try_get("id")?,
                companion_gauge_id: row.try_get("companion_gauge_id")?,
                is_spare: row.try_get("is_spare")?,
                target_companion_id: target_exists.then_some(target_companion),
            });
        }

        let violations = detect_violations(&links);
        if violations.is_empty() {
            debug!(links = links.len(), "Companion links consistent");
            return Ok(violations);
        }

        let mut recorded = 0u64;
        for violation in &violations {
            let gauge = GaugeRepository::find(&mut conn, violation.gauge_id).await?;
            let companion =
                GaugeRepository::find(&mut conn, violation.link.companion_gauge_id).await?;
            let before_state = serde_json::json!({
                "link": violation.link,
                "gauge": gauge,
                "companion": companion,
            });
            error!(
                kind = %violation.kind,
                gauge_id = violation.gauge_id,
                before_state = %before_state,
                "Companion integrity violation"
            );

            let result = sqlx::query(
                r#"
                INSERT INTO integrity_violations (kind, gauge_id, before_state, detected_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (kind, gauge_id) WHERE resolved_at IS NULL DO NOTHING
                "#,
            )
            .bind(violation.kind.as_str())
            .bind(violation.gauge_id)
            .bind(&before_state)
            .execute(&mut *conn)
            .await?;
            recorded += result.rows_affected();
        }

        info!(
            found = violations.len(),
            newly_recorded = recorded,
            "Reconciliation sweep finished"
        );
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_from_settings() {
        let config = WorkerConfig::from(&ReconciliationConfig {
            enabled: true,
            scan_interval_secs: 60,
        });
        assert_eq!(config.scan_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_worker_config_default() {
        assert_eq!(WorkerConfig::default().scan_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = WorkerConfig::from(&ReconciliationConfig {
            enabled: true,
            scan_interval_secs: 0,
        });
        assert_eq!(config.scan_interval, Duration::from_secs(1));
    }
}
