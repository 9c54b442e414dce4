//! Companion integrity reconciliation
//!
//! Finds companion links that break the pairing invariants and reports
//! them. Nothing here repairs data.

pub mod worker;

use serde::Serialize;
use std::fmt;

use crate::core_types::GaugeId;

pub use worker::{ReconciliationWorker, WorkerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Target missing or pointing elsewhere
    AsymmetricCompanion,
    SelfCompanion,
    /// Flagged spare while linked
    SpareWithCompanion,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::AsymmetricCompanion => "asymmetric_companion",
            ViolationKind::SelfCompanion => "self_companion",
            ViolationKind::SpareWithCompanion => "spare_with_companion",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One linked gauge as seen by the sweep, joined with its target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanionLink {
    pub gauge_id: GaugeId,
    pub companion_gauge_id: GaugeId,
    pub is_spare: bool,
    /// `None` when the target row does not exist
    pub target_companion_id: Option<Option<GaugeId>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub gauge_id: GaugeId,
    pub link: CompanionLink,
}

pub fn detect_violations(links: &[CompanionLink]) -> Vec<Violation> {
    let mut found = Vec::new();
    for link in links {
        let mut report = |kind| {
            found.push(Violation {
                kind,
                gauge_id: link.gauge_id,
                link: link.clone(),
            })
        };

        if link.companion_gauge_id == link.gauge_id {
            report(ViolationKind::SelfCompanion);
        } else if link.target_companion_id != Some(Some(link.gauge_id)) {
            report(ViolationKind::AsymmetricCompanion);
        }
        if link.is_spare {
            report(ViolationKind::SpareWithCompanion);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(gauge_id: GaugeId, companion: GaugeId, target: Option<Option<GaugeId>>) -> CompanionLink {
        CompanionLink {
            gauge_id,
            companion_gauge_id: companion,
            is_spare: false,
            target_companion_id: target,
        }
    }

    #[test]
    fn test_symmetric_pair_is_clean() {
        let links = [link(1, 2, Some(Some(1))), link(2, 1, Some(Some(2)))];
        assert!(detect_violations(&links).is_empty());
    }

    #[test]
    fn test_asymmetric_target_points_elsewhere() {
        let found = detect_violations(&[link(1, 2, Some(Some(3)))]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ViolationKind::AsymmetricCompanion);
        assert_eq!(found[0].gauge_id, 1);
    }

    #[test]
    fn test_asymmetric_target_unlinked_or_missing() {
        assert_eq!(
            detect_violations(&[link(1, 2, Some(None))])[0].kind,
            ViolationKind::AsymmetricCompanion
        );
        assert_eq!(
            detect_violations(&[link(1, 99, None)])[0].kind,
            ViolationKind::AsymmetricCompanion
        );
    }

    #[test]
    fn test_self_companion() {
        let found = detect_violations(&[link(5, 5, Some(Some(5)))]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ViolationKind::SelfCompanion);
    }

    #[test]
    fn test_spare_with_companion() {
        let mut l = link(1, 2, Some(Some(1)));
        l.is_spare = true;
        let found = detect_violations(&[l]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ViolationKind::SpareWithCompanion);
    }
}
