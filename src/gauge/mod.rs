//! Gauge records
//!
//! Data model, specification rules and row access for the `gauges` table.
//! Gauges are mutated only through the pairing, calibration and custody
//! services.

pub mod models;
pub mod repository;
pub mod validation;

pub use models::{EquipmentType, Gauge, GaugeSpec, GaugeStatus, Suffix, ThreadSpec};
pub use repository::{GaugeRepository, NewGauge};
pub use validation::{CompanionPolicy, ensure_companion_specs_match, validate_spec};
