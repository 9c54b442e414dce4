//! Checkout / return / transfer
//!
//! Lock order: gauge row first, then the transfer row. Status is re-read
//! from the locked gauge row; an open checkout record is also ruled out by
//! the `uq_checkout_open` partial index.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::db::CustodyDb;
use super::types::{CheckoutRecord, GaugeTransfer, MovementType, TransferId, TransferStatus};
use crate::audit::{AuditEvent, AuditSink};
use crate::core_types::{ActorId, GaugeId, HolderId};
use crate::db::{Database, UnitOfWork};
use crate::error::GaugeError;
use crate::gauge::{GaugeRepository, GaugeStatus};

pub struct CustodyService {
    db: Database,
    audit: Arc<dyn AuditSink>,
}

impl CustodyService {
    pub fn new(db: Database, audit: Arc<dyn AuditSink>) -> Self {
        Self { db, audit }
    }

    /// Check a gauge out to `holder_id`. Of any number of concurrent
    /// attempts on one gauge, exactly one succeeds; the rest get `Conflict`.
    pub async fn checkout(
        &self,
        gauge_id: GaugeId,
        holder_id: HolderId,
    ) -> Result<CheckoutRecord, GaugeError> {
        let mut uow = self.db.begin().await?;
        let record = self.checkout_in(&mut uow, gauge_id, holder_id).await?;
        uow.commit(self.audit.as_ref()).await?;

        info!(gauge_id, holder_id, checkout_id = record.id, "Gauge checked out");
        Ok(record)
    }

    pub async fn checkout_in(
        &self,
        uow: &mut UnitOfWork,
        gauge_id: GaugeId,
        holder_id: HolderId,
    ) -> Result<CheckoutRecord, GaugeError> {
        let gauge = GaugeRepository::lock(uow.conn(), gauge_id).await?;
        if gauge.is_retired() {
            return Err(GaugeError::GaugeUnavailable(gauge_id));
        }
        let next = gauge
            .status
            .transition(GaugeStatus::CheckedOut)
            .map_err(|_| GaugeError::GaugeUnavailable(gauge_id))?;
        if let Some(open) = CustodyDb::open_checkout(uow.conn(), gauge_id).await? {
            warn!(
                gauge_id,
                checkout_id = open.id,
                status = %gauge.status,
                "Open checkout record on a gauge that is not checked out"
            );
            return Err(GaugeError::GaugeUnavailable(gauge_id));
        }

        let record = CustodyDb::insert_checkout(uow.conn(), gauge_id, holder_id).await?;
        GaugeRepository::set_custody(uow.conn(), gauge_id, next, Some(holder_id)).await?;
        CustodyDb::record_movement(
            uow.conn(),
            gauge_id,
            MovementType::Checkout,
            gauge.holder_id,
            Some(holder_id),
            holder_id,
        )
        .await?;

        uow.stage_audit(
            AuditEvent::new("gauge", gauge_id, "checkout", holder_id)
                .before(&gauge)
                .after(&record),
        );
        Ok(record)
    }

    /// Close the open checkout. Only the holder on the record may return.
    pub async fn return_gauge(
        &self,
        gauge_id: GaugeId,
        holder_id: HolderId,
    ) -> Result<CheckoutRecord, GaugeError> {
        let mut uow = self.db.begin().await?;

        let gauge = GaugeRepository::lock(uow.conn(), gauge_id).await?;
        let record = CustodyDb::open_checkout(uow.conn(), gauge_id)
            .await?
            .ok_or(GaugeError::CheckoutNotFound(gauge_id))?;
        if record.holder_id != holder_id {
            return Err(GaugeError::HolderMismatch(gauge_id));
        }
        let next = gauge.status.transition(GaugeStatus::Available)?;

        if !CustodyDb::close_checkout(uow.conn(), record.id).await? {
            return Err(GaugeError::Conflict(format!(
                "checkout {} closed concurrently",
                record.id
            )));
        }
        GaugeRepository::set_custody(uow.conn(), gauge_id, next, None).await?;
        CustodyDb::record_movement(
            uow.conn(),
            gauge_id,
            MovementType::Return,
            Some(holder_id),
            None,
            holder_id,
        )
        .await?;

        let closed = CheckoutRecord {
            returned_at: Some(Utc::now()),
            ..record
        };
        uow.stage_audit(
            AuditEvent::new("gauge", gauge_id, "return", holder_id)
                .before(&gauge)
                .after(&closed),
        );
        uow.commit(self.audit.as_ref()).await?;

        info!(gauge_id, holder_id, checkout_id = closed.id, "Gauge returned");
        Ok(closed)
    }

    /// Start a holder-to-holder transfer. The gauge is held in
    /// `pending_transfer` with its current holder until confirmed or cancelled.
    pub async fn transfer(
        &self,
        gauge_id: GaugeId,
        to_holder_id: HolderId,
        reason: &str,
        actor_id: ActorId,
    ) -> Result<GaugeTransfer, GaugeError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(GaugeError::MissingField("reason"));
        }

        let mut uow = self.db.begin().await?;

        let gauge = GaugeRepository::lock(uow.conn(), gauge_id).await?;
        if gauge.is_retired() {
            return Err(GaugeError::GaugeUnavailable(gauge_id));
        }
        let next = gauge
            .status
            .transition(GaugeStatus::PendingTransfer)
            .map_err(|_| GaugeError::GaugeUnavailable(gauge_id))?;
        if gauge.holder_id == Some(to_holder_id) {
            return Err(GaugeError::InvalidInput(format!(
                "gauge {} is already held by {}",
                gauge_id, to_holder_id
            )));
        }

        let transfer = GaugeTransfer {
            transfer_id: TransferId::new(),
            gauge_id,
            from_holder_id: gauge.holder_id,
            to_holder_id,
            status: TransferStatus::Pending,
            reason: reason.to_string(),
            created_by: actor_id,
            created_at: Utc::now(),
            resolved_at: None,
        };
        CustodyDb::insert_transfer(uow.conn(), &transfer).await?;
        GaugeRepository::set_status(uow.conn(), gauge_id, next).await?;

        uow.stage_audit(
            AuditEvent::new("gauge_transfer", transfer.transfer_id, "create", actor_id)
                .before(&gauge)
                .after(&transfer),
        );
        uow.commit(self.audit.as_ref()).await?;

        info!(
            transfer_id = %transfer.transfer_id,
            gauge_id,
            from_holder_id = ?transfer.from_holder_id,
            to_holder_id,
            actor_id,
            "Transfer created"
        );
        Ok(transfer)
    }

    /// Hand the gauge to the transfer's target holder
    pub async fn confirm_transfer(
        &self,
        transfer_id: TransferId,
        actor_id: ActorId,
    ) -> Result<GaugeTransfer, GaugeError> {
        let result = self
            .resolve(transfer_id, TransferStatus::Confirmed, actor_id)
            .await?;
        info!(
            %transfer_id,
            gauge_id = result.gauge_id,
            to_holder_id = result.to_holder_id,
            actor_id,
            "Transfer confirmed"
        );
        Ok(result)
    }

    /// Abandon a pending transfer; the holder does not change
    pub async fn cancel_transfer(
        &self,
        transfer_id: TransferId,
        actor_id: ActorId,
    ) -> Result<GaugeTransfer, GaugeError> {
        let result = self
            .resolve(transfer_id, TransferStatus::Cancelled, actor_id)
            .await?;
        info!(%transfer_id, gauge_id = result.gauge_id, actor_id, "Transfer cancelled");
        Ok(result)
    }

    pub async fn open_checkout(
        &self,
        gauge_id: GaugeId,
    ) -> Result<Option<CheckoutRecord>, GaugeError> {
        let mut conn = self.db.acquire().await?;
        CustodyDb::open_checkout(&mut conn, gauge_id).await
    }

    pub async fn get_transfer(&self, transfer_id: TransferId) -> Result<GaugeTransfer, GaugeError> {
        let mut conn = self.db.acquire().await?;
        CustodyDb::find_transfer(&mut conn, transfer_id)
            .await?
            .ok_or_else(|| GaugeError::TransferNotFound(transfer_id.to_string()))
    }

    async fn resolve(
        &self,
        transfer_id: TransferId,
        outcome: TransferStatus,
        actor_id: ActorId,
    ) -> Result<GaugeTransfer, GaugeError> {
        let mut uow = self.db.begin().await?;

        let peek = CustodyDb::find_transfer(uow.conn(), transfer_id)
            .await?
            .ok_or_else(|| GaugeError::TransferNotFound(transfer_id.to_string()))?;
        let gauge = GaugeRepository::lock(uow.conn(), peek.gauge_id).await?;
        let transfer = CustodyDb::lock_transfer(uow.conn(), transfer_id).await?;

        let status = transfer.status.transition(outcome)?;
        let next = gauge.status.transition(GaugeStatus::Available)?;

        if !CustodyDb::resolve_transfer(uow.conn(), transfer_id, status).await? {
            return Err(GaugeError::Conflict(format!(
                "transfer {} resolved concurrently",
                transfer_id
            )));
        }
        match status {
            TransferStatus::Confirmed => {
                GaugeRepository::set_custody(
                    uow.conn(),
                    gauge.id,
                    next,
                    Some(transfer.to_holder_id),
                )
                .await?;
                CustodyDb::record_movement(
                    uow.conn(),
                    gauge.id,
                    MovementType::Transfer,
                    transfer.from_holder_id,
                    Some(transfer.to_holder_id),
                    actor_id,
                )
                .await?;
            }
            _ => {
                GaugeRepository::set_status(uow.conn(), gauge.id, next).await?;
            }
        }

        let resolved = GaugeTransfer {
            status,
            resolved_at: Some(Utc::now()),
            ..transfer.clone()
        };
        uow.stage_audit(
            AuditEvent::new("gauge_transfer", transfer_id, status_action(status), actor_id)
                .before(&transfer)
                .after(&resolved),
        );
        uow.commit(self.audit.as_ref()).await?;

        debug!(%transfer_id, status = %status, "Transfer resolved");
        Ok(resolved)
    }
}

fn status_action(status: TransferStatus) -> &'static str {
    match status {
        TransferStatus::Confirmed => "confirm",
        TransferStatus::Cancelled => "cancel",
        TransferStatus::Pending => "create",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_action() {
        assert_eq!(status_action(TransferStatus::Confirmed), "confirm");
        assert_eq!(status_action(TransferStatus::Cancelled), "cancel");
    }
}
