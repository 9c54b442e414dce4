//! Companion Pairing Orchestrator
//!
//! Owns the symmetric companion invariant:
//! `A.companion_gauge_id = B.id  <=>  B.companion_gauge_id = A.id`.
//!
//! Both pointer writes always happen inside one unit of work, after both
//! rows are locked in ascending ID order and every precondition has been
//! re-read from the locked rows.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use super::history::{CompanionAction, CompanionHistory, HistoryEntry};
use crate::audit::{AuditEvent, AuditSink};
use crate::core_types::{ActorId, GaugeId};
use crate::db::{Database, UnitOfWork};
use crate::error::GaugeError;
use crate::gauge::repository::business_id;
use crate::gauge::{
    CompanionPolicy, EquipmentType, Gauge, GaugeRepository, GaugeSpec, GaugeStatus, NewGauge,
    Suffix, ensure_companion_specs_match, validate_spec,
};

/// A linked GO / NO-GO pair
#[derive(Debug, Clone, Serialize)]
pub struct GaugeSet {
    pub go_gauge: Gauge,
    pub no_go_gauge: Gauge,
}

#[derive(Debug, Clone, Serialize)]
pub struct Unpaired {
    pub freed_gauge: Gauge,
    pub former_companion_id: GaugeId,
}

#[derive(Debug, Clone, Serialize)]
pub struct Replacement {
    pub gauge: Gauge,
    pub new_companion: Gauge,
    /// Former companion, now a spare (unless retired)
    pub displaced_gauge_id: GaugeId,
}

pub struct CompanionOrchestrator {
    db: Database,
    policy: CompanionPolicy,
    audit: Arc<dyn AuditSink>,
}

impl CompanionOrchestrator {
    pub fn new(db: Database, policy: CompanionPolicy, audit: Arc<dyn AuditSink>) -> Self {
        Self { db, policy, audit }
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Create a GO / NO-GO set in one unit of work
    pub async fn create_set(
        &self,
        go_spec: &GaugeSpec,
        no_go_spec: &GaugeSpec,
        actor_id: ActorId,
    ) -> Result<GaugeSet, GaugeError> {
        self.policy.ensure_pairable(go_spec)?;
        self.policy.ensure_pairable(no_go_spec)?;
        validate_spec(go_spec)?;
        validate_spec(no_go_spec)?;
        ensure_companion_specs_match(go_spec, no_go_spec)?;

        let mut uow = self.db.begin().await?;
        let set = self
            .create_set_in(&mut uow, go_spec, no_go_spec, actor_id)
            .await?;
        uow.commit(self.audit.as_ref()).await?;

        info!(
            go_id = set.go_gauge.id,
            no_go_id = set.no_go_gauge.id,
            business_id = %set.go_gauge.business_id,
            actor_id,
            "Gauge set created"
        );
        Ok(set)
    }

    /// [`create_set`](Self::create_set) inside a caller-owned unit of work.
    /// Specs are validated again here.
    pub async fn create_set_in(
        &self,
        uow: &mut UnitOfWork,
        go_spec: &GaugeSpec,
        no_go_spec: &GaugeSpec,
        actor_id: ActorId,
    ) -> Result<GaugeSet, GaugeError> {
        self.policy.ensure_pairable(go_spec)?;
        self.policy.ensure_pairable(no_go_spec)?;
        validate_spec(go_spec)?;
        validate_spec(no_go_spec)?;
        ensure_companion_specs_match(go_spec, no_go_spec)?;

        // One sequence value names both members; suffix comes from the role,
        // never from parsing the display string.
        let seq = GaugeRepository::next_business_seq(uow.conn()).await?;
        let (go_suffix, no_go_suffix, go_bid, no_go_bid) = set_identity(go_spec.equipment_type, seq);

        let go = GaugeRepository::insert(
            uow.conn(),
            &NewGauge {
                business_id: go_bid,
                spec: go_spec,
                suffix: go_suffix,
                is_spare: true,
                created_by: actor_id,
            },
        )
        .await?;
        let no_go = GaugeRepository::insert(
            uow.conn(),
            &NewGauge {
                business_id: no_go_bid,
                spec: no_go_spec,
                suffix: no_go_suffix,
                is_spare: true,
                created_by: actor_id,
            },
        )
        .await?;

        link(uow, &go, &no_go, actor_id, Some("created as set")).await?;

        let go_after = reload(uow, go.id).await?;
        let no_go_after = reload(uow, no_go.id).await?;
        uow.stage_audit(AuditEvent::new("gauge", go.id, "create_set", actor_id).after(&go_after));
        uow.stage_audit(
            AuditEvent::new("gauge", no_go.id, "create_set", actor_id).after(&no_go_after),
        );

        Ok(GaugeSet {
            go_gauge: go_after,
            no_go_gauge: no_go_after,
        })
    }

    /// Create a single unpaired gauge.
    ///
    /// Thread gauges that can be paired must say whether they are GO or
    /// NO-GO. Gauges excluded from companionship are created non-spare.
    pub async fn create_spare(
        &self,
        spec: &GaugeSpec,
        suffix: Option<Suffix>,
        actor_id: ActorId,
    ) -> Result<Gauge, GaugeError> {
        validate_spec(spec)?;
        let pairable = self.policy.ensure_pairable(spec).is_ok();
        match (spec.equipment_type, suffix) {
            (EquipmentType::ThreadGauge, None) if pairable => {
                return Err(GaugeError::MissingField("suffix"));
            }
            (EquipmentType::ThreadGauge, _) => {}
            (_, Some(_)) => {
                return Err(GaugeError::InvalidInput(format!(
                    "{} does not take a GO/NO-GO suffix",
                    spec.equipment_type
                )));
            }
            (_, None) => {}
        }

        let mut uow = self.db.begin().await?;
        let seq = GaugeRepository::next_business_seq(uow.conn()).await?;
        let gauge = GaugeRepository::insert(
            uow.conn(),
            &NewGauge {
                business_id: business_id(spec.equipment_type, seq, suffix),
                spec,
                suffix,
                is_spare: pairable,
                created_by: actor_id,
            },
        )
        .await?;
        uow.stage_audit(AuditEvent::new("gauge", gauge.id, "create", actor_id).after(&gauge));
        uow.commit(self.audit.as_ref()).await?;

        info!(
            gauge_id = gauge.id,
            business_id = %gauge.business_id,
            is_spare = gauge.is_spare,
            actor_id,
            "Gauge created"
        );
        Ok(gauge)
    }

    // ========================================================================
    // Pairing
    // ========================================================================

    /// Pair two spares
    pub async fn pair_spares(
        &self,
        go_id: GaugeId,
        no_go_id: GaugeId,
        actor_id: ActorId,
    ) -> Result<GaugeSet, GaugeError> {
        if go_id == no_go_id {
            return Err(GaugeError::InvalidInput(
                "a gauge cannot be its own companion".to_string(),
            ));
        }

        let mut uow = self.db.begin().await?;
        let set = self.pair_spares_in(&mut uow, go_id, no_go_id, actor_id).await?;
        uow.commit(self.audit.as_ref()).await?;

        info!(go_id, no_go_id, actor_id, "Spares paired");
        Ok(set)
    }

    pub async fn pair_spares_in(
        &self,
        uow: &mut UnitOfWork,
        go_id: GaugeId,
        no_go_id: GaugeId,
        actor_id: ActorId,
    ) -> Result<GaugeSet, GaugeError> {
        if go_id == no_go_id {
            return Err(GaugeError::InvalidInput(
                "a gauge cannot be its own companion".to_string(),
            ));
        }

        // Validate-then-act happens on the locked rows, not before the lock
        let (go, no_go) = GaugeRepository::lock_pair(uow.conn(), go_id, no_go_id).await?;
        self.ensure_can_pair(&go, &no_go)?;
        if go.equipment_type == EquipmentType::ThreadGauge {
            ensure_role(&go, Suffix::Go)?;
            ensure_role(&no_go, Suffix::NoGo)?;
        }

        link(uow, &go, &no_go, actor_id, Some("spares paired")).await?;

        let go_after = reload(uow, go_id).await?;
        let no_go_after = reload(uow, no_go_id).await?;
        uow.stage_audit(
            AuditEvent::new("gauge", go_id, "pair", actor_id)
                .before(&go)
                .after(&go_after),
        );
        uow.stage_audit(
            AuditEvent::new("gauge", no_go_id, "pair", actor_id)
                .before(&no_go)
                .after(&no_go_after),
        );

        Ok(GaugeSet {
            go_gauge: go_after,
            no_go_gauge: no_go_after,
        })
    }

    /// Break a pair; both members become spares unless retired
    pub async fn unpair(&self, gauge_id: GaugeId, actor_id: ActorId) -> Result<Unpaired, GaugeError> {
        let mut uow = self.db.begin().await?;
        let result = self
            .unpair_in(&mut uow, gauge_id, actor_id, Some("unpaired"))
            .await?;
        uow.commit(self.audit.as_ref()).await?;

        info!(
            gauge_id,
            former_companion_id = result.former_companion_id,
            actor_id,
            "Gauges unpaired"
        );
        Ok(result)
    }

    pub async fn unpair_in(
        &self,
        uow: &mut UnitOfWork,
        gauge_id: GaugeId,
        actor_id: ActorId,
        reason: Option<&str>,
    ) -> Result<Unpaired, GaugeError> {
        let (gauge, companion) = lock_linked_pair(uow, gauge_id).await?;

        detach(uow, &gauge, &companion, actor_id, reason).await?;

        let gauge_after = reload(uow, gauge.id).await?;
        let companion_after = reload(uow, companion.id).await?;
        uow.stage_audit(
            AuditEvent::new("gauge", gauge.id, "unpair", actor_id)
                .before(&gauge)
                .after(&gauge_after),
        );
        uow.stage_audit(
            AuditEvent::new("gauge", companion.id, "unpair", actor_id)
                .before(&companion)
                .after(&companion_after),
        );

        Ok(Unpaired {
            freed_gauge: gauge_after,
            former_companion_id: companion.id,
        })
    }

    /// Swap a gauge's companion for a spare; the displaced gauge becomes a spare
    pub async fn replace_companion(
        &self,
        gauge_id: GaugeId,
        new_companion_id: GaugeId,
        actor_id: ActorId,
    ) -> Result<Replacement, GaugeError> {
        let mut uow = self.db.begin().await?;
        let result = self
            .replace_companion_in(&mut uow, gauge_id, new_companion_id, actor_id)
            .await?;
        uow.commit(self.audit.as_ref()).await?;

        info!(
            gauge_id,
            new_companion_id,
            displaced_gauge_id = result.displaced_gauge_id,
            actor_id,
            "Companion replaced"
        );
        Ok(result)
    }

    pub async fn replace_companion_in(
        &self,
        uow: &mut UnitOfWork,
        gauge_id: GaugeId,
        new_companion_id: GaugeId,
        actor_id: ActorId,
    ) -> Result<Replacement, GaugeError> {
        if gauge_id == new_companion_id {
            return Err(GaugeError::InvalidInput(
                "a gauge cannot be its own companion".to_string(),
            ));
        }

        let peek = GaugeRepository::find(uow.conn(), gauge_id)
            .await?
            .ok_or(GaugeError::GaugeNotFound(gauge_id))?;
        let old_id = peek.companion_gauge_id.ok_or(GaugeError::NotPaired(gauge_id))?;
        if old_id == new_companion_id {
            return Err(GaugeError::AlreadyPaired(new_companion_id));
        }

        let locked =
            GaugeRepository::lock_ordered(uow.conn(), &[gauge_id, old_id, new_companion_id])
                .await?;
        let pick = |id: GaugeId| {
            locked
                .iter()
                .find(|g| g.id == id)
                .cloned()
                .ok_or(GaugeError::GaugeNotFound(id))
        };
        let gauge = pick(gauge_id)?;
        let old = pick(old_id)?;
        let new = pick(new_companion_id)?;

        ensure_still_linked(&gauge, &old)?;
        self.ensure_compatible(&gauge, &new)?;
        ensure_free(&new)?;
        if let Some(suffix) = gauge.suffix {
            ensure_role(&new, suffix.opposite())?;
        }

        // Old link down, new link up; same unit of work, no half-linked state
        GaugeRepository::set_companion(uow.conn(), old.id, None, !old.is_retired()).await?;
        GaugeRepository::set_companion(uow.conn(), gauge.id, Some(new.id), false).await?;
        GaugeRepository::set_companion(uow.conn(), new.id, Some(gauge.id), false).await?;

        CompanionHistory::append(
            uow.conn(),
            old.id,
            None,
            CompanionAction::Unpaired,
            Some("replaced by new companion"),
            actor_id,
        )
        .await?;
        CompanionHistory::append(
            uow.conn(),
            gauge.id,
            Some(new.id),
            CompanionAction::Replaced,
            Some("companion replaced"),
            actor_id,
        )
        .await?;
        CompanionHistory::append(
            uow.conn(),
            new.id,
            Some(gauge.id),
            CompanionAction::Paired,
            Some("companion replaced"),
            actor_id,
        )
        .await?;

        let gauge_after = reload(uow, gauge.id).await?;
        let new_after = reload(uow, new.id).await?;
        let old_after = reload(uow, old.id).await?;
        for (before, after) in [(&gauge, &gauge_after), (&new, &new_after), (&old, &old_after)] {
            uow.stage_audit(
                AuditEvent::new("gauge", before.id, "replace_companion", actor_id)
                    .before(before)
                    .after(after),
            );
        }

        Ok(Replacement {
            gauge: gauge_after,
            new_companion: new_after,
            displaced_gauge_id: old.id,
        })
    }

    // ========================================================================
    // Retirement
    // ========================================================================

    /// Soft-delete a gauge. A paired gauge is unpaired in the same unit of
    /// work; its companion becomes a spare, the retired gauge does not.
    pub async fn retire(&self, gauge_id: GaugeId, actor_id: ActorId) -> Result<Gauge, GaugeError> {
        let mut uow = self.db.begin().await?;

        let peek = GaugeRepository::find(uow.conn(), gauge_id)
            .await?
            .ok_or(GaugeError::GaugeNotFound(gauge_id))?;

        let (gauge, companion) = match peek.companion_gauge_id {
            Some(_) => {
                let (g, c) = lock_linked_pair(&mut uow, gauge_id).await?;
                (g, Some(c))
            }
            None => {
                let g = GaugeRepository::lock(uow.conn(), gauge_id).await?;
                if g.companion_gauge_id.is_some() {
                    return Err(GaugeError::Conflict(format!(
                        "gauge {} was paired concurrently",
                        gauge_id
                    )));
                }
                (g, None)
            }
        };

        if gauge.is_deleted || gauge.status.is_terminal() {
            return Err(GaugeError::InvalidStateTransition(format!(
                "gauge {} is already retired",
                gauge_id
            )));
        }
        if gauge.status.is_in_calibration_cycle() {
            return Err(GaugeError::InvalidStateTransition(format!(
                "gauge {} is {} and cannot be retired until calibration finishes",
                gauge_id, gauge.status
            )));
        }
        gauge.status.transition(GaugeStatus::Retired)?;

        GaugeRepository::mark_retired(uow.conn(), gauge.id).await?;
        if let Some(companion) = &companion {
            let retired = reload(&mut uow, gauge.id).await?;
            detach(&mut uow, &retired, companion, actor_id, Some("companion retired")).await?;
        }

        let after = reload(&mut uow, gauge.id).await?;
        uow.stage_audit(
            AuditEvent::new("gauge", gauge.id, "retire", actor_id)
                .before(&gauge)
                .after(&after),
        );
        if let Some(companion) = &companion {
            let companion_after = reload(&mut uow, companion.id).await?;
            uow.stage_audit(
                AuditEvent::new("gauge", companion.id, "unpair", actor_id)
                    .before(companion)
                    .after(&companion_after),
            );
        }
        uow.commit(self.audit.as_ref()).await?;

        info!(gauge_id, actor_id, "Gauge retired");
        Ok(after)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get_gauge(&self, gauge_id: GaugeId) -> Result<Gauge, GaugeError> {
        let mut conn = self.db.acquire().await?;
        GaugeRepository::find(&mut conn, gauge_id)
            .await?
            .ok_or(GaugeError::GaugeNotFound(gauge_id))
    }

    pub async fn companion_history(
        &self,
        gauge_id: GaugeId,
    ) -> Result<Vec<HistoryEntry>, GaugeError> {
        let mut conn = self.db.acquire().await?;
        CompanionHistory::for_gauge(&mut conn, gauge_id).await
    }

    // ========================================================================
    // Checks on locked rows
    // ========================================================================

    /// Exclusion first, then specification, then current state
    fn ensure_can_pair(&self, a: &Gauge, b: &Gauge) -> Result<(), GaugeError> {
        self.ensure_compatible(a, b)?;
        ensure_free(a)?;
        ensure_free(b)
    }

    fn ensure_compatible(&self, a: &Gauge, b: &Gauge) -> Result<(), GaugeError> {
        let spec_a = a.spec();
        let spec_b = b.spec();
        self.policy.ensure_pairable(&spec_a)?;
        self.policy.ensure_pairable(&spec_b)?;
        ensure_companion_specs_match(&spec_a, &spec_b)
    }
}

/// Unpaired, live spare
fn ensure_free(gauge: &Gauge) -> Result<(), GaugeError> {
    if gauge.is_paired() {
        return Err(GaugeError::AlreadyPaired(gauge.id));
    }
    if gauge.is_retired() || !gauge.is_spare {
        return Err(GaugeError::GaugeUnavailable(gauge.id));
    }
    Ok(())
}

/// Suffix and display IDs for both members of a new set
fn set_identity(
    equipment_type: EquipmentType,
    seq: i64,
) -> (Option<Suffix>, Option<Suffix>, String, String) {
    if equipment_type == EquipmentType::ThreadGauge {
        (
            Some(Suffix::Go),
            Some(Suffix::NoGo),
            business_id(equipment_type, seq, Some(Suffix::Go)),
            business_id(equipment_type, seq, Some(Suffix::NoGo)),
        )
    } else {
        let base = business_id(equipment_type, seq, None);
        (None, None, format!("{}-1", base), format!("{}-2", base))
    }
}

fn ensure_role(gauge: &Gauge, expected: Suffix) -> Result<(), GaugeError> {
    if gauge.suffix == Some(expected) {
        Ok(())
    } else {
        Err(GaugeError::SpecMismatch(format!(
            "gauge {} has suffix {}, expected {}",
            gauge.id,
            gauge.suffix.map(|s| s.as_str()).unwrap_or("none"),
            expected
        )))
    }
}

/// Both rows of an existing link, locked in canonical order and verified
/// to still point at each other.
async fn lock_linked_pair(
    uow: &mut UnitOfWork,
    gauge_id: GaugeId,
) -> Result<(Gauge, Gauge), GaugeError> {
    let peek = GaugeRepository::find(uow.conn(), gauge_id)
        .await?
        .ok_or(GaugeError::GaugeNotFound(gauge_id))?;
    let companion_id = peek.companion_gauge_id.ok_or(GaugeError::NotPaired(gauge_id))?;

    let (gauge, companion) = GaugeRepository::lock_pair(uow.conn(), gauge_id, companion_id).await?;
    ensure_still_linked(&gauge, &companion)?;
    Ok((gauge, companion))
}

/// `gauge` and `companion` are locked; the link seen before locking must
/// still hold and must be symmetric.
fn ensure_still_linked(gauge: &Gauge, companion: &Gauge) -> Result<(), GaugeError> {
    if gauge.companion_gauge_id != Some(companion.id) {
        return Err(GaugeError::Conflict(format!(
            "companion of gauge {} changed concurrently",
            gauge.id
        )));
    }
    if companion.companion_gauge_id != Some(gauge.id) {
        error!(
            gauge_id = gauge.id,
            companion_id = companion.id,
            companion_points_to = ?companion.companion_gauge_id,
            "Asymmetric companion link - refusing to modify"
        );
        return Err(GaugeError::IntegrityViolation(format!(
            "gauge {} points to {} but {} points to {:?}",
            gauge.id, companion.id, companion.id, companion.companion_gauge_id
        )));
    }
    Ok(())
}

/// Write both pointers and both `paired` history rows
async fn link(
    uow: &mut UnitOfWork,
    a: &Gauge,
    b: &Gauge,
    actor_id: ActorId,
    reason: Option<&str>,
) -> Result<(), GaugeError> {
    GaugeRepository::set_companion(uow.conn(), a.id, Some(b.id), false).await?;
    GaugeRepository::set_companion(uow.conn(), b.id, Some(a.id), false).await?;
    CompanionHistory::append(uow.conn(), a.id, Some(b.id), CompanionAction::Paired, reason, actor_id)
        .await?;
    CompanionHistory::append(uow.conn(), b.id, Some(a.id), CompanionAction::Paired, reason, actor_id)
        .await?;
    Ok(())
}

/// Clear both pointers and write both `unpaired` history rows.
/// Retired gauges stay non-spare.
async fn detach(
    uow: &mut UnitOfWork,
    a: &Gauge,
    b: &Gauge,
    actor_id: ActorId,
    reason: Option<&str>,
) -> Result<(), GaugeError> {
    GaugeRepository::set_companion(uow.conn(), a.id, None, !a.is_retired()).await?;
    GaugeRepository::set_companion(uow.conn(), b.id, None, !b.is_retired()).await?;
    CompanionHistory::append(uow.conn(), a.id, None, CompanionAction::Unpaired, reason, actor_id)
        .await?;
    CompanionHistory::append(uow.conn(), b.id, None, CompanionAction::Unpaired, reason, actor_id)
        .await?;
    Ok(())
}

async fn reload(uow: &mut UnitOfWork, id: GaugeId) -> Result<Gauge, GaugeError> {
    GaugeRepository::find(uow.conn(), id)
        .await?
        .ok_or(GaugeError::GaugeNotFound(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::gauge::ThreadSpec;

    fn thread_gauge(id: GaugeId, suffix: Option<Suffix>) -> Gauge {
        Gauge {
            id,
            business_id: format!("TG-{:06}", id),
            equipment_type: EquipmentType::ThreadGauge,
            category_id: 10,
            status: GaugeStatus::Available,
            companion_gauge_id: None,
            suffix,
            is_spare: true,
            is_sealed: false,
            thread: Some(ThreadSpec::new("1/4-20", "2B", "UNC", "plug")),
            storage_location: None,
            holder_id: None,
            is_deleted: false,
            created_by: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_set_identity_thread_gauge() {
        let (go, no_go, go_bid, no_go_bid) = set_identity(EquipmentType::ThreadGauge, 42);
        assert_eq!(go, Some(Suffix::Go));
        assert_eq!(no_go, Some(Suffix::NoGo));
        assert_eq!(go_bid, "TG-000042A");
        assert_eq!(no_go_bid, "TG-000042B");
    }

    #[test]
    fn test_set_identity_other_equipment() {
        let (go, no_go, a, b) = set_identity(EquipmentType::HandTool, 7);
        assert!(go.is_none() && no_go.is_none());
        assert_eq!(a, "HT-000007-1");
        assert_eq!(b, "HT-000007-2");
    }

    #[test]
    fn test_ensure_role() {
        let go = thread_gauge(1, Some(Suffix::Go));
        assert!(ensure_role(&go, Suffix::Go).is_ok());
        assert!(matches!(
            ensure_role(&go, Suffix::NoGo),
            Err(GaugeError::SpecMismatch(_))
        ));
        assert!(ensure_role(&thread_gauge(2, None), Suffix::Go).is_err());
    }

    #[test]
    fn test_still_linked_detects_concurrent_change() {
        let mut a = thread_gauge(1, Some(Suffix::Go));
        let mut b = thread_gauge(2, Some(Suffix::NoGo));
        a.companion_gauge_id = Some(3);
        b.companion_gauge_id = Some(1);
        assert!(matches!(
            ensure_still_linked(&a, &b),
            Err(GaugeError::Conflict(_))
        ));
    }

    #[test]
    fn test_still_linked_detects_asymmetry() {
        let mut a = thread_gauge(1, Some(Suffix::Go));
        let b = thread_gauge(2, Some(Suffix::NoGo));
        a.companion_gauge_id = Some(2);
        assert!(matches!(
            ensure_still_linked(&a, &b),
            Err(GaugeError::IntegrityViolation(_))
        ));
    }

    #[test]
    fn test_ensure_free() {
        let mut g = thread_gauge(1, Some(Suffix::Go));
        assert!(ensure_free(&g).is_ok());
        g.companion_gauge_id = Some(2);
        assert!(matches!(ensure_free(&g), Err(GaugeError::AlreadyPaired(1))));
        g.companion_gauge_id = None;
        g.is_deleted = true;
        assert!(matches!(ensure_free(&g), Err(GaugeError::GaugeUnavailable(1))));
    }

    #[test]
    fn test_still_linked_symmetric() {
        let mut a = thread_gauge(1, Some(Suffix::Go));
        let mut b = thread_gauge(2, Some(Suffix::NoGo));
        a.companion_gauge_id = Some(2);
        b.companion_gauge_id = Some(1);
        assert!(ensure_still_linked(&a, &b).is_ok());
    }
}
