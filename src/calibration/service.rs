//! Calibration Batch Workflow
//!
//! Drives gauges through batch assembly, the lab round trip, certificate
//! verification and release. Every operation locks the batch row, then
//! the gauge row, then the membership row, and checks the move against
//! the transition tables before writing.

use std::sync::Arc;
use tracing::{debug, info};

use super::db::CalibrationDb;
use super::state::{BatchState, CalibrationResult, MembershipState, batch_complete};
use super::types::{BatchDetail, CalibrationBatch, Certificate, Membership};
use crate::audit::{AuditEvent, AuditSink};
use crate::core_types::{ActorId, BatchId, GaugeId};
use crate::db::{Database, UnitOfWork};
use crate::error::GaugeError;
use crate::gauge::{Gauge, GaugeRepository, GaugeStatus};

/// Every step on a membership also writes its batch row, so steps on one
/// batch serialize. A `Conflict` from a concurrent step on the same batch
/// is retryable.
pub struct CalibrationWorkflow {
    db: Database,
    audit: Arc<dyn AuditSink>,
}

/// Rows locked for a step on a gauge's open membership
struct Locked {
    batch: CalibrationBatch,
    gauge: Gauge,
    membership: Membership,
}

impl CalibrationWorkflow {
    pub fn new(db: Database, audit: Arc<dyn AuditSink>) -> Self {
        Self { db, audit }
    }

    pub async fn create_batch(&self, actor_id: ActorId) -> Result<BatchId, GaugeError> {
        let mut uow = self.db.begin().await?;
        let batch = CalibrationDb::insert_batch(uow.conn(), actor_id).await?;
        uow.stage_audit(AuditEvent::new("calibration_batch", batch.id, "create", actor_id).after(&batch));
        uow.commit(self.audit.as_ref()).await?;

        info!(batch_id = batch.id, actor_id, "Calibration batch created");
        Ok(batch.id)
    }

    // ========================================================================
    // Assembly
    // ========================================================================

    pub async fn add_gauge(
        &self,
        batch_id: BatchId,
        gauge_id: GaugeId,
        actor_id: ActorId,
    ) -> Result<Membership, GaugeError> {
        let mut uow = self.db.begin().await?;
        let membership = self.add_gauge_in(&mut uow, batch_id, gauge_id, actor_id).await?;
        uow.commit(self.audit.as_ref()).await?;

        info!(batch_id, gauge_id, actor_id, "Gauge added to calibration batch");
        Ok(membership)
    }

    pub async fn add_gauge_in(
        &self,
        uow: &mut UnitOfWork,
        batch_id: BatchId,
        gauge_id: GaugeId,
        actor_id: ActorId,
    ) -> Result<Membership, GaugeError> {
        let batch = CalibrationDb::lock_batch(uow.conn(), batch_id).await?;
        if batch.state != BatchState::PendingAssembly {
            return Err(GaugeError::InvalidStateTransition(format!(
                "batch {} is {}, not accepting gauges",
                batch_id, batch.state
            )));
        }

        let gauge = GaugeRepository::lock(uow.conn(), gauge_id).await?;
        if gauge.is_retired() {
            return Err(GaugeError::GaugeUnavailable(gauge_id));
        }
        if CalibrationDb::find_open_membership(uow.conn(), gauge_id)
            .await?
            .is_some()
        {
            return Err(GaugeError::AlreadyInBatch(gauge_id));
        }
        let next = gauge
            .status
            .transition(GaugeStatus::CalibrationPending)
            .map_err(|_| GaugeError::GaugeUnavailable(gauge_id))?;

        let membership =
            CalibrationDb::insert_membership(uow.conn(), batch_id, gauge_id, gauge.status).await?;
        GaugeRepository::set_status(uow.conn(), gauge_id, next).await?;
        CalibrationDb::touch_batch(uow.conn(), batch_id).await?;

        uow.stage_audit(
            AuditEvent::new("calibration_membership", membership.id, "add_gauge", actor_id)
                .before(&gauge)
                .after(&membership),
        );
        Ok(membership)
    }

    /// Take a gauge back out while the batch is still being assembled
    pub async fn remove_gauge(
        &self,
        batch_id: BatchId,
        gauge_id: GaugeId,
        actor_id: ActorId,
    ) -> Result<(), GaugeError> {
        let mut uow = self.db.begin().await?;

        let batch = CalibrationDb::lock_batch(uow.conn(), batch_id).await?;
        if batch.state != BatchState::PendingAssembly {
            return Err(GaugeError::InvalidStateTransition(format!(
                "batch {} is {}, members are fixed",
                batch_id, batch.state
            )));
        }
        let gauge = GaugeRepository::lock(uow.conn(), gauge_id).await?;
        let membership = CalibrationDb::lock_membership(uow.conn(), batch_id, gauge_id)
            .await?
            .ok_or(GaugeError::NotInBatch(gauge_id))?;

        let restored = gauge.status.transition(membership.prior_status)?;
        CalibrationDb::delete_membership(uow.conn(), membership.id).await?;
        GaugeRepository::set_status(uow.conn(), gauge_id, restored).await?;
        CalibrationDb::touch_batch(uow.conn(), batch_id).await?;

        uow.stage_audit(
            AuditEvent::new("calibration_membership", membership.id, "remove_gauge", actor_id)
                .before(&membership),
        );
        uow.commit(self.audit.as_ref()).await?;

        info!(batch_id, gauge_id, restored = %restored, actor_id, "Gauge removed from calibration batch");
        Ok(())
    }

    /// Ship the batch. All member gauges move to `in_calibration` in one
    /// statement; the batch accepts no further additions.
    pub async fn send_batch(&self, batch_id: BatchId, actor_id: ActorId) -> Result<(), GaugeError> {
        let mut uow = self.db.begin().await?;

        let batch = CalibrationDb::lock_batch(uow.conn(), batch_id).await?;
        let next = batch.state.transition(BatchState::SentToCalibration)?;

        let members = CalibrationDb::memberships(uow.conn(), batch_id).await?;
        if members.is_empty() {
            return Err(GaugeError::InvalidInput(format!(
                "batch {} has no gauges",
                batch_id
            )));
        }
        let ids: Vec<GaugeId> = members.iter().map(|m| m.gauge_id).collect();
        for gauge in GaugeRepository::lock_ordered(uow.conn(), &ids).await? {
            gauge.status.transition(GaugeStatus::InCalibration)?;
        }

        let moved =
            CalibrationDb::set_member_gauges_status(uow.conn(), batch_id, GaugeStatus::InCalibration)
                .await?;
        if moved != members.len() as u64 {
            return Err(GaugeError::Conflict(format!(
                "batch {} moved {} of {} gauges",
                batch_id,
                moved,
                members.len()
            )));
        }
        CalibrationDb::set_batch_state(uow.conn(), batch_id, next).await?;

        uow.stage_audit(
            AuditEvent::new("calibration_batch", batch_id, "send", actor_id)
                .before(&batch)
                .after(&next),
        );
        uow.commit(self.audit.as_ref()).await?;

        info!(batch_id, gauges = moved, actor_id, "Calibration batch sent");
        Ok(())
    }

    // ========================================================================
    // Lab round trip
    // ========================================================================

    /// Record the lab result. A failed gauge goes out of service and leaves
    /// the batch's open set.
    pub async fn receive_gauge(
        &self,
        gauge_id: GaugeId,
        result: CalibrationResult,
        actor_id: ActorId,
    ) -> Result<Membership, GaugeError> {
        let mut uow = self.db.begin().await?;
        let locked = lock_open(&mut uow, gauge_id).await?;
        if locked.batch.state != BatchState::SentToCalibration {
            return Err(GaugeError::InvalidStateTransition(format!(
                "batch {} is {}, gauges cannot be received",
                locked.batch.id, locked.batch.state
            )));
        }

        let next_membership = locked.membership.state.transition(result.membership_state())?;
        let next_gauge = match result {
            CalibrationResult::Pass => GaugeStatus::PendingCertificate,
            CalibrationResult::Fail => GaugeStatus::OutOfService,
        };
        locked.gauge.status.transition(next_gauge)?;

        let after = self
            .advance(&mut uow, &locked, next_membership, next_gauge, actor_id, "receive")
            .await?;
        uow.commit(self.audit.as_ref()).await?;

        info!(
            gauge_id,
            batch_id = locked.batch.id,
            result = ?result,
            actor_id,
            "Calibration result received"
        );
        Ok(after)
    }

    pub async fn attach_certificate(
        &self,
        gauge_id: GaugeId,
        document_ref: &str,
        actor_id: ActorId,
    ) -> Result<Certificate, GaugeError> {
        let document_ref = document_ref.trim();
        if document_ref.is_empty() {
            return Err(GaugeError::MissingField("document_ref"));
        }

        let mut uow = self.db.begin().await?;
        let locked = lock_open(&mut uow, gauge_id).await?;
        if locked.batch.state != BatchState::SentToCalibration {
            return Err(GaugeError::InvalidStateTransition(format!(
                "batch {} is {}, certificates not accepted",
                locked.batch.id, locked.batch.state
            )));
        }

        let certificate = CalibrationDb::insert_certificate(
            uow.conn(),
            gauge_id,
            locked.batch.id,
            document_ref,
            actor_id,
        )
        .await?;
        CalibrationDb::touch_batch(uow.conn(), locked.batch.id).await?;
        uow.stage_audit(
            AuditEvent::new("gauge_certificate", certificate.id, "attach", actor_id)
                .after(&certificate),
        );
        uow.commit(self.audit.as_ref()).await?;

        debug!(gauge_id, batch_id = locked.batch.id, "Certificate attached");
        Ok(certificate)
    }

    pub async fn verify_certificates(
        &self,
        gauge_id: GaugeId,
        actor_id: ActorId,
    ) -> Result<Membership, GaugeError> {
        let mut uow = self.db.begin().await?;
        let locked = lock_open(&mut uow, gauge_id).await?;

        let next_membership = locked
            .membership
            .state
            .transition(MembershipState::CertificatesVerified)?;
        let next_gauge = locked.gauge.status.transition(GaugeStatus::PendingRelease)?;
        if CalibrationDb::certificate_count(uow.conn(), gauge_id, locked.batch.id).await? == 0 {
            return Err(GaugeError::CertificateMissing(gauge_id));
        }

        let after = self
            .advance(&mut uow, &locked, next_membership, next_gauge, actor_id, "verify_certificates")
            .await?;
        uow.commit(self.audit.as_ref()).await?;

        info!(gauge_id, batch_id = locked.batch.id, actor_id, "Certificates verified");
        Ok(after)
    }

    pub async fn assign_location(
        &self,
        gauge_id: GaugeId,
        location: &str,
        actor_id: ActorId,
    ) -> Result<Gauge, GaugeError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(GaugeError::MissingField("storage_location"));
        }

        let mut uow = self.db.begin().await?;
        let gauge = GaugeRepository::lock(uow.conn(), gauge_id).await?;
        if gauge.is_retired() {
            return Err(GaugeError::GaugeUnavailable(gauge_id));
        }
        GaugeRepository::set_storage_location(uow.conn(), gauge_id, location).await?;
        let after = GaugeRepository::find(uow.conn(), gauge_id)
            .await?
            .ok_or(GaugeError::GaugeNotFound(gauge_id))?;
        uow.stage_audit(
            AuditEvent::new("gauge", gauge_id, "assign_location", actor_id)
                .before(&gauge)
                .after(&after),
        );
        uow.commit(self.audit.as_ref()).await?;

        debug!(gauge_id, location, "Storage location assigned");
        Ok(after)
    }

    /// Return a verified gauge to service. The batch closes once every
    /// membership is released or failed.
    ///
    /// Concurrent steps on gauges of the same batch may fail with a
    /// retryable `Conflict` even when each is valid on its own.
    pub async fn release(&self, gauge_id: GaugeId, actor_id: ActorId) -> Result<Membership, GaugeError> {
        let mut uow = self.db.begin().await?;
        let locked = lock_open(&mut uow, gauge_id).await?;

        let next_membership = locked.membership.state.transition(MembershipState::Released)?;
        let next_gauge = locked.gauge.status.transition(GaugeStatus::Available)?;
        let has_location = locked
            .gauge
            .storage_location
            .as_deref()
            .is_some_and(|l| !l.trim().is_empty());
        if !has_location {
            return Err(GaugeError::StorageLocationMissing(gauge_id));
        }

        let after = self
            .advance(&mut uow, &locked, next_membership, next_gauge, actor_id, "release")
            .await?;
        uow.commit(self.audit.as_ref()).await?;

        info!(gauge_id, batch_id = locked.batch.id, actor_id, "Gauge released from calibration");
        Ok(after)
    }

    pub async fn get_batch(&self, batch_id: BatchId) -> Result<BatchDetail, GaugeError> {
        let mut conn = self.db.acquire().await?;
        let batch = CalibrationDb::find_batch(&mut conn, batch_id)
            .await?
            .ok_or(GaugeError::BatchNotFound(batch_id))?;
        let memberships = CalibrationDb::memberships(&mut conn, batch_id).await?;
        Ok(BatchDetail { batch, memberships })
    }

    /// Write a validated membership + gauge move, then close the batch if
    /// nothing in it can move any more
    async fn advance(
        &self,
        uow: &mut UnitOfWork,
        locked: &Locked,
        membership_state: MembershipState,
        gauge_status: GaugeStatus,
        actor_id: ActorId,
        action: &'static str,
    ) -> Result<Membership, GaugeError> {
        let batch_id = locked.batch.id;
        CalibrationDb::set_membership_state(uow.conn(), locked.membership.id, membership_state)
            .await?;
        GaugeRepository::set_status(uow.conn(), locked.gauge.id, gauge_status).await?;
        CalibrationDb::touch_batch(uow.conn(), batch_id).await?;

        let members = CalibrationDb::memberships(uow.conn(), batch_id).await?;
        let states: Vec<MembershipState> = members.iter().map(|m| m.state).collect();
        if locked.batch.state == BatchState::SentToCalibration && batch_complete(&states) {
            let closed = locked.batch.state.transition(BatchState::Closed)?;
            CalibrationDb::set_batch_state(uow.conn(), batch_id, closed).await?;
            uow.stage_audit(
                AuditEvent::new("calibration_batch", batch_id, "close", actor_id)
                    .before(&locked.batch.state)
                    .after(&closed),
            );
            info!(batch_id, members = members.len(), "Calibration batch closed");
        }

        let after = members
            .into_iter()
            .find(|m| m.id == locked.membership.id)
            .ok_or(GaugeError::NotInBatch(locked.gauge.id))?;
        uow.stage_audit(
            AuditEvent::new("calibration_membership", after.id, action, actor_id)
                .before(&locked.membership)
                .after(&after),
        );
        Ok(after)
    }
}

/// Find the gauge's open membership, then lock batch, gauge and membership
/// in that order and confirm the membership is still open
async fn lock_open(uow: &mut UnitOfWork, gauge_id: GaugeId) -> Result<Locked, GaugeError> {
    let peek = CalibrationDb::find_open_membership(uow.conn(), gauge_id)
        .await?
        .ok_or(GaugeError::NotInBatch(gauge_id))?;

    let batch = CalibrationDb::lock_batch(uow.conn(), peek.batch_id).await?;
    let gauge = GaugeRepository::lock(uow.conn(), gauge_id).await?;
    let membership = CalibrationDb::lock_membership(uow.conn(), peek.batch_id, gauge_id)
        .await?
        .ok_or(GaugeError::NotInBatch(gauge_id))?;

    if batch.state.is_terminal() || membership.state.is_terminal() {
        return Err(GaugeError::Conflict(format!(
            "membership of gauge {} in batch {} changed concurrently",
            gauge_id, batch.id
        )));
    }
    Ok(Locked {
        batch,
        gauge,
        membership,
    })
}
