//! Failed-attempt lockout
//!
//! The counter is incremented in the store by one upsert, never read and
//! written back by the application. Each call runs as its own autocommit
//! statement, so concurrent failures for one account queue on the row
//! lock and each sees the count left by the previous one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LockoutConfig;
use crate::core_types::AccountId;
use crate::db::Database;
use crate::error::GaugeError;

/// Result of one recorded failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptOutcome {
    /// Failures in the current window, including this one
    pub failure_count: i32,
    pub locked_until: Option<DateTime<Utc>>,
    /// This call is the one that set the lock
    pub newly_locked: bool,
}

/// Raw counter row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockoutStatus {
    pub account_id: AccountId,
    pub failure_count: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Lock is set by exactly the failure that brings the window's count to
/// the threshold
#[inline]
pub fn crosses_threshold(failure_count: i32, threshold: i32) -> bool {
    failure_count == threshold
}

const RECORD_FAILURE: &str = r#"
INSERT INTO attempt_counters AS c (account_id, failure_count, locked_until, updated_at)
VALUES (
    $1,
    1,
    CASE WHEN 1 = $2 THEN NOW() + make_interval(secs => $3) ELSE NULL END,
    NOW()
)
ON CONFLICT (account_id) DO UPDATE SET
    failure_count = CASE
        WHEN c.locked_until IS NOT NULL AND c.locked_until <= NOW() THEN 1
        ELSE c.failure_count + 1
    END,
    locked_until = CASE
        WHEN c.locked_until IS NOT NULL AND c.locked_until <= NOW() THEN
            CASE WHEN 1 = $2 THEN NOW() + make_interval(secs => $3) ELSE NULL END
        WHEN c.failure_count + 1 = $2 THEN NOW() + make_interval(secs => $3)
        ELSE c.locked_until
    END,
    updated_at = NOW()
RETURNING failure_count, locked_until
"#;

pub struct AttemptGuard {
    db: Database,
    threshold: i32,
    duration: Duration,
}

impl AttemptGuard {
    pub fn new(db: Database, config: &LockoutConfig) -> Self {
        Self {
            db,
            threshold: config.threshold.max(1),
            duration: Duration::from_secs(config.duration_secs),
        }
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    pub async fn record_failure(&self, account_id: AccountId) -> Result<AttemptOutcome, GaugeError> {
        let mut conn = self.db.acquire().await?;
        let row = sqlx::query(RECORD_FAILURE)
            .bind(account_id)
            .bind(self.threshold)
            .bind(self.duration.as_secs_f64())
            .fetch_one(&mut *conn)
            .await?;

        let failure_count: i32 = row.try_get("failure_count")?;
        let locked_until: Option<DateTime<Utc>> = row.try_get("locked_until")?;
        let newly_locked = crosses_threshold(failure_count, self.threshold);

        if newly_locked {
            warn!(
                account_id,
                failure_count,
                locked_until = ?locked_until,
                "Account locked after repeated failures"
            );
        } else {
            debug!(account_id, failure_count, "Failed attempt recorded");
        }

        Ok(AttemptOutcome {
            failure_count,
            locked_until,
            newly_locked,
        })
    }

    /// Clear the counter after a successful attempt
    pub async fn record_success(&self, account_id: AccountId) -> Result<(), GaugeError> {
        let mut conn = self.db.acquire().await?;
        sqlx::query("DELETE FROM attempt_counters WHERE account_id = $1")
            .bind(account_id)
            .execute(&mut *conn)
            .await?;
        debug!(account_id, "Attempt counter cleared");
        Ok(())
    }

    /// Expired locks read as unlocked; nothing is written
    pub async fn is_locked(&self, account_id: AccountId) -> Result<bool, GaugeError> {
        let mut conn = self.db.acquire().await?;
        let locked = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM attempt_counters
                WHERE account_id = $1 AND locked_until > NOW()
            )
            "#,
        )
        .bind(account_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(locked)
    }

    pub async fn lockout_status(
        &self,
        account_id: AccountId,
    ) -> Result<Option<LockoutStatus>, GaugeError> {
        let mut conn = self.db.acquire().await?;
        let row = sqlx::query(
            r#"
            SELECT account_id, failure_count, locked_until, updated_at
            FROM attempt_counters
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(Some(LockoutStatus {
                account_id: row.try_get("account_id")?,
                failure_count: row.try_get("failure_count")?,
                locked_until: row.try_get("locked_until")?,
                updated_at: row.try_get("updated_at")?,
            })),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_set_once_per_window() {
        let hits: Vec<i32> = (1..=12).filter(|n| crosses_threshold(*n, 5)).collect();
        assert_eq!(hits, vec![5]);
    }

    #[test]
    fn test_threshold_of_one_locks_first_failure() {
        assert!(crosses_threshold(1, 1));
        assert!(!crosses_threshold(2, 1));
    }
}
