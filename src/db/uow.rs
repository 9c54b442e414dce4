//! Unit of work
//!
//! A unit of work owns one pooled connection and one open transaction.
//! Validation reads and the writes they justify must go through the same
//! `UnitOfWork`; reading on the pool and writing in a transaction reopens
//! the check/act gap the row locks exist to close.
//!
//! Audit events staged on a unit of work are published only after a
//! successful commit, so the audit trail never shows work that rolled back
//! and no transaction is held open while the sink is busy.

use sqlx::{PgConnection, Postgres, Transaction};
use tracing::debug;

use super::TxBounds;
use crate::audit::{AuditEvent, AuditSink};
use crate::error::GaugeError;

pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
    staged: Vec<AuditEvent>,
}

impl UnitOfWork {
    pub(crate) async fn start(
        mut tx: Transaction<'static, Postgres>,
        bounds: &TxBounds,
    ) -> Result<Self, GaugeError> {
        // Must run before the first query takes the snapshot
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("SET LOCAL lock_timeout = {}", bounds.lock_timeout_ms))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            bounds.statement_timeout_ms
        ))
        .execute(&mut *tx)
        .await?;

        Ok(Self {
            tx,
            staged: Vec::new(),
        })
    }

    /// Connection bound to this transaction
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Queue an audit event for publication after commit
    pub fn stage_audit(&mut self, event: AuditEvent) {
        self.staged.push(event);
    }

    /// Commit, then hand staged audit events to the sink
    pub async fn commit(self, sink: &dyn AuditSink) -> Result<(), GaugeError> {
        let Self { tx, staged } = self;
        tx.commit().await?;

        debug!(events = staged.len(), "Unit of work committed");
        for event in staged {
            sink.record(event);
        }
        Ok(())
    }

    /// Roll back explicitly. Dropping a `UnitOfWork` also rolls back.
    pub async fn rollback(self) {
        if let Err(e) = self.tx.rollback().await {
            tracing::warn!(error = %e, "Rollback failed; connection will be discarded");
        }
    }
}
