//! Gauge data model
//!
//! Enum IDs are designed for PostgreSQL storage as SMALLINT.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{ActorId, CategoryId, GaugeId, HolderId};
use crate::error::GaugeError;

/// Equipment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum EquipmentType {
    ThreadGauge = 1,
    HandTool = 2,
    LargeEquipment = 3,
    CalibrationStandard = 4,
}

impl EquipmentType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(EquipmentType::ThreadGauge),
            2 => Some(EquipmentType::HandTool),
            3 => Some(EquipmentType::LargeEquipment),
            4 => Some(EquipmentType::CalibrationStandard),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentType::ThreadGauge => "thread_gauge",
            EquipmentType::HandTool => "hand_tool",
            EquipmentType::LargeEquipment => "large_equipment",
            EquipmentType::CalibrationStandard => "calibration_standard",
        }
    }

    /// Prefix of generated business IDs
    pub fn business_prefix(&self) -> &'static str {
        match self {
            EquipmentType::ThreadGauge => "TG",
            EquipmentType::HandTool => "HT",
            EquipmentType::LargeEquipment => "LE",
            EquipmentType::CalibrationStandard => "CS",
        }
    }
}

impl fmt::Display for EquipmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EquipmentType {
    type Err = GaugeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "thread_gauge" => Ok(EquipmentType::ThreadGauge),
            "hand_tool" => Ok(EquipmentType::HandTool),
            "large_equipment" => Ok(EquipmentType::LargeEquipment),
            "calibration_standard" => Ok(EquipmentType::CalibrationStandard),
            _ => Err(GaugeError::InvalidInput(format!("equipment type: {}", s))),
        }
    }
}

/// Gauge lifecycle status
///
/// Terminal: RETIRED (-20)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum GaugeStatus {
    Available = 0,
    CheckedOut = 10,
    PendingTransfer = 20,
    /// Assembled into a calibration batch that has not been sent
    CalibrationPending = 30,
    InCalibration = 31,
    /// Back from the lab, certificate not yet verified
    PendingCertificate = 32,
    /// Certificate verified, waiting for put-away
    PendingRelease = 33,
    /// Failed calibration; may be re-batched or retired
    OutOfService = -10,
    Retired = -20,
}

impl GaugeStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(GaugeStatus::Available),
            10 => Some(GaugeStatus::CheckedOut),
            20 => Some(GaugeStatus::PendingTransfer),
            30 => Some(GaugeStatus::CalibrationPending),
            31 => Some(GaugeStatus::InCalibration),
            32 => Some(GaugeStatus::PendingCertificate),
            33 => Some(GaugeStatus::PendingRelease),
            -10 => Some(GaugeStatus::OutOfService),
            -20 => Some(GaugeStatus::Retired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GaugeStatus::Available => "available",
            GaugeStatus::CheckedOut => "checked_out",
            GaugeStatus::PendingTransfer => "pending_transfer",
            GaugeStatus::CalibrationPending => "calibration_pending",
            GaugeStatus::InCalibration => "in_calibration",
            GaugeStatus::PendingCertificate => "pending_certificate",
            GaugeStatus::PendingRelease => "pending_release",
            GaugeStatus::OutOfService => "out_of_service",
            GaugeStatus::Retired => "retired",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, GaugeStatus::Retired)
    }

    /// Inside a calibration cycle (batched, at the lab, or awaiting release)
    #[inline]
    pub fn is_in_calibration_cycle(&self) -> bool {
        matches!(
            self,
            GaugeStatus::CalibrationPending
                | GaugeStatus::InCalibration
                | GaugeStatus::PendingCertificate
                | GaugeStatus::PendingRelease
        )
    }

    /// The single transition table for gauge status
    pub fn can_transition_to(&self, next: GaugeStatus) -> bool {
        use GaugeStatus::*;
        matches!(
            (self, next),
            (Available, CheckedOut)
                | (Available, PendingTransfer)
                | (Available, CalibrationPending)
                | (Available, Retired)
                | (CheckedOut, Available)
                | (PendingTransfer, Available)
                | (CalibrationPending, InCalibration)
                | (CalibrationPending, Available)
                | (CalibrationPending, OutOfService)
                | (InCalibration, PendingCertificate)
                | (InCalibration, OutOfService)
                | (PendingCertificate, PendingRelease)
                | (PendingRelease, Available)
                | (OutOfService, CalibrationPending)
                | (OutOfService, Retired)
        )
    }

    /// Checked transition; `Err` names both ends
    pub fn transition(self, next: GaugeStatus) -> Result<GaugeStatus, GaugeError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(GaugeError::InvalidStateTransition(format!(
                "gauge {} -> {}",
                self, next
            )))
        }
    }
}

impl fmt::Display for GaugeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for GaugeStatus {
    type Error = GaugeError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        GaugeStatus::from_id(value)
            .ok_or_else(|| GaugeError::DatabaseError(format!("Invalid status: {}", value)))
    }
}

/// GO / NO-GO designation of a thread gauge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suffix {
    /// GO member, stored as 'A'
    Go,
    /// NO-GO member, stored as 'B'
    NoGo,
}

impl Suffix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Suffix::Go => "A",
            Suffix::NoGo => "B",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(Suffix::Go),
            "B" => Some(Suffix::NoGo),
            _ => None,
        }
    }

    /// The role a companion must have
    pub fn opposite(&self) -> Suffix {
        match self {
            Suffix::Go => Suffix::NoGo,
            Suffix::NoGo => Suffix::Go,
        }
    }
}

impl fmt::Display for Suffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Thread specification; every field is required for thread gauges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSpec {
    pub size: String,
    pub class: String,
    pub thread_type: String,
    pub form: String,
}

impl ThreadSpec {
    pub fn new(
        size: impl Into<String>,
        class: impl Into<String>,
        thread_type: impl Into<String>,
        form: impl Into<String>,
    ) -> Self {
        Self {
            size: size.into(),
            class: class.into(),
            thread_type: thread_type.into(),
            form: form.into(),
        }
    }
}

/// What a caller supplies to create a gauge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeSpec {
    pub equipment_type: EquipmentType,
    pub category_id: CategoryId,
    #[serde(default)]
    pub thread: Option<ThreadSpec>,
    #[serde(default)]
    pub is_sealed: bool,
    #[serde(default)]
    pub storage_location: Option<String>,
}

impl GaugeSpec {
    pub fn thread_gauge(category_id: CategoryId, thread: ThreadSpec) -> Self {
        Self {
            equipment_type: EquipmentType::ThreadGauge,
            category_id,
            thread: Some(thread),
            is_sealed: false,
            storage_location: None,
        }
    }

    pub fn other(equipment_type: EquipmentType, category_id: CategoryId) -> Self {
        Self {
            equipment_type,
            category_id,
            thread: None,
            is_sealed: false,
            storage_location: None,
        }
    }
}

/// A gauge row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gauge {
    pub id: GaugeId,
    pub business_id: String,
    pub equipment_type: EquipmentType,
    pub category_id: CategoryId,
    pub status: GaugeStatus,
    pub companion_gauge_id: Option<GaugeId>,
    pub suffix: Option<Suffix>,
    pub is_spare: bool,
    pub is_sealed: bool,
    pub thread: Option<ThreadSpec>,
    pub storage_location: Option<String>,
    pub holder_id: Option<HolderId>,
    pub is_deleted: bool,
    pub created_by: ActorId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Gauge {
    /// Specification view used for compatibility checks
    pub fn spec(&self) -> GaugeSpec {
        GaugeSpec {
            equipment_type: self.equipment_type,
            category_id: self.category_id,
            thread: self.thread.clone(),
            is_sealed: self.is_sealed,
            storage_location: self.storage_location.clone(),
        }
    }

    #[inline]
    pub fn is_paired(&self) -> bool {
        self.companion_gauge_id.is_some()
    }

    #[inline]
    pub fn is_retired(&self) -> bool {
        self.is_deleted || self.status == GaugeStatus::Retired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_id_roundtrip() {
        let statuses = [
            GaugeStatus::Available,
            GaugeStatus::CheckedOut,
            GaugeStatus::PendingTransfer,
            GaugeStatus::CalibrationPending,
            GaugeStatus::InCalibration,
            GaugeStatus::PendingCertificate,
            GaugeStatus::PendingRelease,
            GaugeStatus::OutOfService,
            GaugeStatus::Retired,
        ];

        for status in statuses {
            assert_eq!(GaugeStatus::from_id(status.id()), Some(status));
        }
        assert!(GaugeStatus::from_id(999).is_none());
    }

    #[test]
    fn test_custody_transitions() {
        use GaugeStatus::*;
        assert!(Available.can_transition_to(CheckedOut));
        assert!(CheckedOut.can_transition_to(Available));
        assert!(Available.can_transition_to(PendingTransfer));
        assert!(PendingTransfer.can_transition_to(Available));

        assert!(!CheckedOut.can_transition_to(CheckedOut));
        assert!(!CheckedOut.can_transition_to(PendingTransfer));
        assert!(!PendingTransfer.can_transition_to(CheckedOut));
    }

    #[test]
    fn test_calibration_transitions() {
        use GaugeStatus::*;
        assert!(Available.can_transition_to(CalibrationPending));
        assert!(CalibrationPending.can_transition_to(InCalibration));
        assert!(InCalibration.can_transition_to(PendingCertificate));
        assert!(PendingCertificate.can_transition_to(PendingRelease));
        assert!(PendingRelease.can_transition_to(Available));
        assert!(InCalibration.can_transition_to(OutOfService));
        assert!(OutOfService.can_transition_to(CalibrationPending));

        assert!(!InCalibration.can_transition_to(Available));
        assert!(!PendingCertificate.can_transition_to(Available));
        assert!(!CheckedOut.can_transition_to(CalibrationPending));
    }

    #[test]
    fn test_retired_is_terminal() {
        use GaugeStatus::*;
        assert!(Retired.is_terminal());
        for next in [Available, CheckedOut, OutOfService, CalibrationPending] {
            assert!(!Retired.can_transition_to(next));
        }
        assert!(!CheckedOut.can_transition_to(Retired));
    }

    #[test]
    fn test_transition_error_names_states() {
        let err = GaugeStatus::CheckedOut
            .transition(GaugeStatus::PendingTransfer)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid state transition: gauge checked_out -> pending_transfer"
        );
    }

    #[test]
    fn test_suffix_codes() {
        assert_eq!(Suffix::Go.as_str(), "A");
        assert_eq!(Suffix::NoGo.as_str(), "B");
        assert_eq!(Suffix::from_code("A"), Some(Suffix::Go));
        assert_eq!(Suffix::from_code("b"), None);
        assert_eq!(Suffix::Go.opposite(), Suffix::NoGo);
    }

    #[test]
    fn test_equipment_type_parse() {
        assert_eq!(
            "Thread_Gauge".parse::<EquipmentType>().unwrap(),
            EquipmentType::ThreadGauge
        );
        assert!("caliper".parse::<EquipmentType>().is_err());
        assert_eq!(EquipmentType::HandTool.business_prefix(), "HT");
    }
}
