//! Companion pairing
//!
//! GO / NO-GO companion links between thread gauges (and the paired sets of
//! other equipment types), plus their append-only history.

pub mod history;
pub mod service;

pub use history::{CompanionAction, CompanionHistory, HistoryEntry};
pub use service::{CompanionOrchestrator, GaugeSet, Replacement, Unpaired};
