//! Custody types

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{ActorId, GaugeId, HolderId};
use crate::error::GaugeError;

/// Transfer ID - ULID, sortable by creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(ulid::Ulid);

impl TransferId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for TransferId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// Transfer lifecycle
///
/// Terminal states: CONFIRMED (10), CANCELLED (-10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum TransferStatus {
    Pending = 0,
    Confirmed = 10,
    Cancelled = -10,
}

impl TransferStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransferStatus::Pending),
            10 => Some(TransferStatus::Confirmed),
            -10 => Some(TransferStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Confirmed => "CONFIRMED",
            TransferStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn transition(self, next: TransferStatus) -> Result<TransferStatus, GaugeError> {
        match (self, next) {
            (TransferStatus::Pending, TransferStatus::Confirmed)
            | (TransferStatus::Pending, TransferStatus::Cancelled) => Ok(next),
            _ => Err(GaugeError::InvalidStateTransition(format!(
                "transfer {} -> {}",
                self, next
            ))),
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of custody movement recorded in `gauge_movements`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum MovementType {
    Checkout = 1,
    Return = 2,
    Transfer = 3,
}

impl MovementType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRecord {
    pub id: i64,
    pub gauge_id: GaugeId,
    pub holder_id: HolderId,
    pub checked_out_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GaugeTransfer {
    pub transfer_id: TransferId,
    pub gauge_id: GaugeId,
    pub from_holder_id: Option<HolderId>,
    pub to_holder_id: HolderId,
    pub status: TransferStatus,
    pub reason: String,
    pub created_by: ActorId,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_id_roundtrip() {
        let id = TransferId::new();
        let parsed: TransferId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-ulid".parse::<TransferId>().is_err());
    }

    #[test]
    fn test_transfer_id_serializes_as_string() {
        let id = TransferId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }

    #[test]
    fn test_transfer_status_transitions() {
        assert!(TransferStatus::Pending.transition(TransferStatus::Confirmed).is_ok());
        assert!(TransferStatus::Pending.transition(TransferStatus::Cancelled).is_ok());
        assert!(TransferStatus::Confirmed.transition(TransferStatus::Cancelled).is_err());
        assert!(TransferStatus::Cancelled.transition(TransferStatus::Confirmed).is_err());
        assert!(TransferStatus::Confirmed.transition(TransferStatus::Confirmed).is_err());
    }

    #[test]
    fn test_transfer_status_ids() {
        for s in [
            TransferStatus::Pending,
            TransferStatus::Confirmed,
            TransferStatus::Cancelled,
        ] {
            assert_eq!(TransferStatus::from_id(s.id()), Some(s));
        }
        assert!(TransferStatus::Pending.id() == 0);
    }
}
