//! Calibration batch and membership states
//!
//! State IDs are stored as SMALLINT. Each enum has one transition table;
//! services never compare states to decide a move.

use serde::Serialize;
use std::fmt;

use crate::error::GaugeError;

/// Calibration batch lifecycle
///
/// Terminal state: CLOSED. A closed batch never reopens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum BatchState {
    /// Accepting and releasing members
    PendingAssembly = 0,

    /// Shipped; closed to additions
    SentToCalibration = 10,

    /// Terminal: every membership released or failed
    Closed = 20,
}

impl BatchState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Closed)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(BatchState::PendingAssembly),
            10 => Some(BatchState::SentToCalibration),
            20 => Some(BatchState::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::PendingAssembly => "PENDING_ASSEMBLY",
            BatchState::SentToCalibration => "SENT_TO_CALIBRATION",
            BatchState::Closed => "CLOSED",
        }
    }

    pub fn can_transition_to(&self, next: BatchState) -> bool {
        matches!(
            (self, next),
            (BatchState::PendingAssembly, BatchState::SentToCalibration)
                | (BatchState::SentToCalibration, BatchState::Closed)
        )
    }

    pub fn transition(self, next: BatchState) -> Result<BatchState, GaugeError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(GaugeError::InvalidStateTransition(format!(
                "batch {} -> {}",
                self, next
            )))
        }
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for BatchState {
    type Error = GaugeError;

    fn try_from(id: i16) -> Result<Self, Self::Error> {
        BatchState::from_id(id)
            .ok_or_else(|| GaugeError::DatabaseError(format!("Invalid batch state: {}", id)))
    }
}

/// One gauge's progress through a batch
///
/// Terminal states: RELEASED (30), FAILED (-10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum MembershipState {
    Pending = 0,
    Received = 10,
    CertificatesVerified = 20,
    /// Terminal: back in service
    Released = 30,
    /// Terminal: calibration failed, gauge out of service
    Failed = -10,
}

impl MembershipState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, MembershipState::Released | MembershipState::Failed)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(MembershipState::Pending),
            10 => Some(MembershipState::Received),
            20 => Some(MembershipState::CertificatesVerified),
            30 => Some(MembershipState::Released),
            -10 => Some(MembershipState::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipState::Pending => "PENDING",
            MembershipState::Received => "RECEIVED",
            MembershipState::CertificatesVerified => "CERTIFICATES_VERIFIED",
            MembershipState::Released => "RELEASED",
            MembershipState::Failed => "FAILED",
        }
    }

    pub fn can_transition_to(&self, next: MembershipState) -> bool {
        use MembershipState::*;
        matches!(
            (self, next),
            (Pending, Received)
                | (Pending, Failed)
                | (Received, CertificatesVerified)
                | (CertificatesVerified, Released)
        )
    }

    pub fn transition(self, next: MembershipState) -> Result<MembershipState, GaugeError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(GaugeError::InvalidStateTransition(format!(
                "membership {} -> {}",
                self, next
            )))
        }
    }
}

impl fmt::Display for MembershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for MembershipState {
    type Error = GaugeError;

    fn try_from(id: i16) -> Result<Self, Self::Error> {
        MembershipState::from_id(id)
            .ok_or_else(|| GaugeError::DatabaseError(format!("Invalid membership state: {}", id)))
    }
}

/// Outcome reported by the calibration lab for one gauge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationResult {
    Pass,
    Fail,
}

impl CalibrationResult {
    pub fn membership_state(&self) -> MembershipState {
        match self {
            CalibrationResult::Pass => MembershipState::Received,
            CalibrationResult::Fail => MembershipState::Failed,
        }
    }
}

/// A batch closes once no membership can move any further
pub fn batch_complete(states: &[MembershipState]) -> bool {
    !states.is_empty() && states.iter().all(MembershipState::is_terminal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_state_ids() {
        for s in [
            BatchState::PendingAssembly,
            BatchState::SentToCalibration,
            BatchState::Closed,
        ] {
            assert_eq!(BatchState::try_from(s.id()).unwrap(), s);
        }
        assert!(BatchState::try_from(99).is_err());
    }

    #[test]
    fn test_batch_never_reopens() {
        assert!(BatchState::PendingAssembly.can_transition_to(BatchState::SentToCalibration));
        assert!(BatchState::SentToCalibration.can_transition_to(BatchState::Closed));
        assert!(!BatchState::Closed.can_transition_to(BatchState::PendingAssembly));
        assert!(!BatchState::Closed.can_transition_to(BatchState::SentToCalibration));
        assert!(!BatchState::SentToCalibration.can_transition_to(BatchState::PendingAssembly));
    }

    #[test]
    fn test_membership_must_follow_order() {
        use MembershipState::*;
        // verify before receive
        assert!(Pending.transition(CertificatesVerified).is_err());
        // release before verify
        assert!(Received.transition(Released).is_err());
        assert!(Pending.transition(Released).is_err());
        // failed is final
        assert!(Failed.transition(Received).is_err());

        assert_eq!(Pending.transition(Received).unwrap(), Received);
        assert_eq!(Received.transition(CertificatesVerified).unwrap(), CertificatesVerified);
        assert_eq!(CertificatesVerified.transition(Released).unwrap(), Released);
    }

    #[test]
    fn test_transition_error_kind() {
        let err = MembershipState::Received
            .transition(MembershipState::Released)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
        assert!(err.to_string().contains("RECEIVED -> RELEASED"));
    }

    #[test]
    fn test_batch_complete() {
        use MembershipState::*;
        assert!(!batch_complete(&[]));
        assert!(batch_complete(&[Released, Failed]));
        assert!(!batch_complete(&[Released, CertificatesVerified]));
        assert!(!batch_complete(&[Pending]));
    }

    #[test]
    fn test_result_maps_to_membership() {
        assert_eq!(CalibrationResult::Pass.membership_state(), MembershipState::Received);
        assert_eq!(CalibrationResult::Fail.membership_state(), MembershipState::Failed);
    }
}
