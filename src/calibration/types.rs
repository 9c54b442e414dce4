//! Calibration records

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::{BatchState, MembershipState};
use crate::core_types::{ActorId, BatchId, GaugeId};
use crate::gauge::GaugeStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalibrationBatch {
    pub id: BatchId,
    pub state: BatchState,
    pub created_by: ActorId,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Membership {
    pub id: i64,
    pub batch_id: BatchId,
    pub gauge_id: GaugeId,
    pub state: MembershipState,
    pub certificate_verified: bool,
    /// Gauge status before it joined; restored if the gauge is removed
    pub prior_status: GaugeStatus,
    pub added_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Certificate {
    pub id: i64,
    pub gauge_id: GaugeId,
    pub batch_id: BatchId,
    pub document_ref: String,
    pub uploaded_by: ActorId,
    pub uploaded_at: DateTime<Utc>,
}

/// A batch with all of its memberships, oldest first
#[derive(Debug, Clone, Serialize)]
pub struct BatchDetail {
    pub batch: CalibrationBatch,
    pub memberships: Vec<Membership>,
}

impl BatchDetail {
    pub fn membership(&self, gauge_id: GaugeId) -> Option<&Membership> {
        self.memberships.iter().find(|m| m.gauge_id == gauge_id)
    }
}
